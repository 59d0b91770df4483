// Shared test helpers
#![allow(dead_code)]

use pulseview::models::*;

/// Fleet sizes used by the windowing tests.
pub const SMALL: usize = 50;
pub const MEDIUM: usize = 250;
pub const LARGE: usize = 1_000;
pub const XLARGE: usize = 3_000;

pub fn resource(id: &str, resource_type: ResourceType, name: &str) -> Resource {
    let mut r = Resource::new(id, resource_type, name);
    r.sources = vec!["agent".to_string()];
    r.last_seen = 1_700_000_000_000;
    r
}

/// `count` VMs named vm-0.. with deterministic utilisation. Every other one is in cluster
/// "alpha" / "beta".
pub fn fleet(count: usize) -> Vec<Resource> {
    (0..count)
        .map(|i| {
            let mut r = Resource::new(format!("vm-{i}"), ResourceType::Vm, format!("vm-{i}"));
            r.cluster_id = Some(if i % 2 == 0 { "alpha" } else { "beta" }.to_string());
            r.cpu = Some((i % 100) as f64 / 100.0);
            r.memory = Some(((i * 7) % 100) as f64 / 100.0);
            r.disk = Some(((i * 13) % 100) as f64 / 100.0);
            r.network = Some(NetworkRate {
                rx: (i * 1_024) as f64,
                tx: 512.0,
            });
            r.disk_io = Some(DiskIoRate {
                read: (i * 10) as f64,
                write: 0.0,
            });
            r.sources = vec!["proxmox".to_string()];
            r.last_seen = 1_700_000_000_000;
            r
        })
        .collect()
}

pub fn snapshot(timestamp: i64, resources: Vec<Resource>) -> ResourceSnapshot {
    ResourceSnapshot {
        timestamp,
        resources,
    }
}

/// Chart data with one point per metric given.
pub fn chart_data(points: &[(Metric, i64, f64)]) -> ChartData {
    let mut data = ChartData::new();
    for (metric, ts, value) in points {
        data.entry(*metric)
            .or_default()
            .push(MetricPoint::new(*ts, *value));
    }
    data
}
