// Chart lookup tests: key resolution order and agent gap filling

mod common;

use pulseview::charts::{agent_key, find_chart_data, resolve_series};
use pulseview::models::{ChartData, ChartMap, Metric, Resource, ResourceType};

fn map(entries: &[(&str, ChartData)]) -> ChartMap {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn cpu(value: f64) -> ChartData {
    common::chart_data(&[(Metric::Cpu, 1_000, value)])
}

fn first_cpu(data: &ChartData) -> Option<f64> {
    data.get(&Metric::Cpu)
        .and_then(|s| s.first())
        .map(|p| p.value)
}

#[test]
fn test_direct_key_wins_over_composite() {
    let mut vm = common::resource("vm-100", ResourceType::Vm, "web");
    vm.cluster_id = Some("pve".into());
    let charts = map(&[("pve:web", cpu(2.0)), ("vm-100", cpu(1.0))]);
    let found = find_chart_data(&charts, &vm, &[]).unwrap();
    assert_eq!(first_cpu(found), Some(1.0));
}

#[test]
fn test_name_and_platform_id_are_direct_keys() {
    let mut vm = common::resource("vm-100", ResourceType::Vm, "web");
    vm.platform_id = Some("qemu/100".into());
    let charts = map(&[("qemu/100", cpu(3.0))]);
    assert_eq!(first_cpu(find_chart_data(&charts, &vm, &[]).unwrap()), Some(3.0));

    let charts = map(&[("web", cpu(4.0))]);
    assert_eq!(first_cpu(find_chart_data(&charts, &vm, &[]).unwrap()), Some(4.0));
}

#[test]
fn test_composite_key_uses_cluster() {
    let mut vm = common::resource("vm-100", ResourceType::Vm, "web");
    vm.cluster_id = Some("pve".into());
    let charts = map(&[("pve:vm-100", cpu(5.0))]);
    assert_eq!(first_cpu(find_chart_data(&charts, &vm, &[]).unwrap()), Some(5.0));

    vm.cluster_id = None;
    assert!(find_chart_data(&charts, &vm, &[]).is_none());
}

#[test]
fn test_hostname_suffix_match() {
    let mut node = common::resource("node/pve1", ResourceType::Node, "pve1");
    node.hostname = Some("pve1.lan".into());
    let charts = map(&[("other:pve1.lan", cpu(6.0)), ("other:pve2.lan", cpu(7.0))]);
    assert_eq!(first_cpu(find_chart_data(&charts, &node, &[]).unwrap()), Some(6.0));
}

#[test]
fn test_agent_fallback_by_declared_link_and_hostname() {
    let mut agent = common::resource("host:box", ResourceType::Host, "box");
    agent.hostname = Some("box".into());
    let mut linked = common::resource("docker/abc", ResourceType::DockerContainer, "app");
    linked.linked_agent_id = Some("host:box".into());
    let mut by_host = common::resource("truenas/1", ResourceType::Truenas, "nas");
    by_host.hostname = Some("BOX".into());
    let all = vec![agent.clone(), linked.clone(), by_host.clone()];

    assert_eq!(agent_key(&linked, &all), Some("host:box"));
    assert_eq!(agent_key(&by_host, &all), Some("host:box"));
    assert_eq!(agent_key(&agent, &all), None);

    let charts = map(&[("host:box", cpu(8.0))]);
    assert_eq!(first_cpu(find_chart_data(&charts, &linked, &all).unwrap()), Some(8.0));
}

#[test]
fn test_unknown_resource_has_no_data() {
    let vm = common::resource("vm-1", ResourceType::Vm, "lonely");
    let charts = map(&[("vm-2", cpu(1.0))]);
    assert!(find_chart_data(&charts, &vm, &[]).is_none());
    assert!(resolve_series(&charts, &vm, &[]).is_none());
}

#[test]
fn test_empty_series_filled_from_linked_agent() {
    let agent = common::resource("host:box", ResourceType::Host, "box");
    let mut container = common::resource("docker/abc", ResourceType::DockerContainer, "app");
    container.linked_agent_id = Some("host:box".into());
    let all: Vec<Resource> = vec![agent, container.clone()];

    let mut own = common::chart_data(&[(Metric::Memory, 1_000, 20.0)]);
    own.insert(Metric::Cpu, Vec::new());
    let agent_data = common::chart_data(&[
        (Metric::Cpu, 1_000, 9.0),
        (Metric::Memory, 1_000, 99.0),
        (Metric::Netin, 1_000, 512.0),
    ]);
    let charts = map(&[("docker/abc", own), ("host:box", agent_data)]);

    let series = resolve_series(&charts, &container, &all).unwrap();
    assert_eq!(first_cpu(&series), Some(9.0));
    // Own memory series is kept.
    assert_eq!(series[&Metric::Memory][0].value, 20.0);
    assert_eq!(series[&Metric::Netin][0].value, 512.0);
}
