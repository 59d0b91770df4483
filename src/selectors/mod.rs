// Pure resource selectors: filter, sort, group, host/service split, I/O scale.
// All functions are total: empty input and missing optional fields never panic.

mod io_scale;

pub use io_scale::{IoScale, IoStats, compute_io_scale};

use crate::models::Resource;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ops::Deref;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Default,
    Name,
    Cpu,
    Memory,
    Disk,
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" | "" => Ok(SortKey::Default),
            "name" => Ok(SortKey::Name),
            "cpu" => Ok(SortKey::Cpu),
            "memory" => Ok(SortKey::Memory),
            "disk" => Ok(SortKey::Disk),
            other => Err(format!("unknown sort key {:?}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" | "" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            other => Err(format!("unknown sort direction {:?}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupingMode {
    #[default]
    Flat,
    Grouped,
}

impl FromStr for GroupingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flat" | "" => Ok(GroupingMode::Flat),
            "grouped" => Ok(GroupingMode::Grouped),
            other => Err(format!("unknown grouping mode {:?}", other)),
        }
    }
}

/// One group of a grouped view. `key` is the cluster id; `None` collects resources without one.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceGroup<R> {
    pub key: Option<String>,
    pub resources: Vec<R>,
}

/// Result of [`split_host_and_service_resources`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostServiceSplit<'a> {
    pub hosts: Vec<&'a Resource>,
    pub services: Vec<&'a Resource>,
}

/// Keep resources reported by an included source, drop those reported by an excluded one,
/// then apply every extra predicate. Empty include/exclude and no predicates is a no-op.
pub fn filter_resources<'a>(
    resources: &'a [Resource],
    include_sources: &[&str],
    exclude_sources: &[&str],
    predicates: &[&dyn Fn(&Resource) -> bool],
) -> Vec<&'a Resource> {
    resources
        .iter()
        .filter(|r| resource_matches(r, include_sources, exclude_sources, predicates))
        .collect()
}

/// Single-resource form of [`filter_resources`].
pub fn resource_matches(
    r: &Resource,
    include_sources: &[&str],
    exclude_sources: &[&str],
    predicates: &[&dyn Fn(&Resource) -> bool],
) -> bool {
    (include_sources.is_empty()
        || r.sources.iter().any(|s| include_sources.contains(&s.as_str())))
        && !r.sources.iter().any(|s| exclude_sources.contains(&s.as_str()))
        && predicates.iter().all(|p| p(r))
}

/// Stable sort; always returns as many resources as it was given.
pub fn sort_resources<R>(resources: &[R], key: SortKey, direction: SortDirection) -> Vec<R>
where
    R: Deref<Target = Resource> + Clone,
{
    let mut out = resources.to_vec();
    out.sort_by(|a, b| {
        let ord = compare_by_key(a, b, key);
        match direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    });
    out
}

fn compare_by_key(a: &Resource, b: &Resource, key: SortKey) -> Ordering {
    match key {
        SortKey::Default => a
            .resource_type
            .sort_rank()
            .cmp(&b.resource_type.sort_rank())
            .then_with(|| compare_names(a.label(), b.label())),
        SortKey::Name => compare_names(a.label(), b.label()),
        SortKey::Cpu => compare_ratio(a.cpu, b.cpu),
        SortKey::Memory => compare_ratio(a.memory, b.memory),
        SortKey::Disk => compare_ratio(a.disk, b.disk),
    }
}

/// Absent values sort before any reported value.
fn compare_ratio(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => x.total_cmp(&y),
    }
}

/// Case-insensitive comparison with digit runs compared numerically ("node2" < "node10").
pub fn compare_names(a: &str, b: &str) -> Ordering {
    let mut ai = a.chars().peekable();
    let mut bi = b.chars().peekable();
    loop {
        match (ai.peek().copied(), bi.peek().copied()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(ca), Some(cb)) if ca.is_ascii_digit() && cb.is_ascii_digit() => {
                let na = take_digits(&mut ai);
                let nb = take_digits(&mut bi);
                let ta = na.trim_start_matches('0');
                let tb = nb.trim_start_matches('0');
                let ord = ta.len().cmp(&tb.len()).then_with(|| ta.cmp(tb));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(ca), Some(cb)) => {
                let ord = ca.to_lowercase().cmp(cb.to_lowercase());
                if ord != Ordering::Equal {
                    return ord;
                }
                ai.next();
                bi.next();
            }
        }
    }
}

fn take_digits(it: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut s = String::new();
    while let Some(c) = it.peek().copied() {
        if !c.is_ascii_digit() {
            break;
        }
        s.push(c);
        it.next();
    }
    s
}

/// Flat: exactly one group holding everything. Grouped: one group per distinct cluster id,
/// sorted by key, with resources lacking a cluster id in a trailing keyless group.
pub fn group_resources<R>(resources: &[R], mode: GroupingMode) -> Vec<ResourceGroup<R>>
where
    R: Deref<Target = Resource> + Clone,
{
    match mode {
        GroupingMode::Flat => vec![ResourceGroup {
            key: None,
            resources: resources.to_vec(),
        }],
        GroupingMode::Grouped => {
            let mut by_key: BTreeMap<&str, Vec<R>> = BTreeMap::new();
            let mut ungrouped: Vec<R> = Vec::new();
            for r in resources {
                match r.cluster_id.as_deref() {
                    Some(k) if !k.is_empty() => by_key.entry(k).or_default().push(r.clone()),
                    _ => ungrouped.push(r.clone()),
                }
            }
            let mut out: Vec<ResourceGroup<R>> = by_key
                .into_iter()
                .map(|(k, resources)| ResourceGroup {
                    key: Some(k.to_string()),
                    resources,
                })
                .collect();
            if !ungrouped.is_empty() {
                out.push(ResourceGroup {
                    key: None,
                    resources: ungrouped,
                });
            }
            out
        }
    }
}

/// Every resource lands in exactly one side.
pub fn split_host_and_service_resources<'a>(resources: &[&'a Resource]) -> HostServiceSplit<'a> {
    let (services, hosts): (Vec<&'a Resource>, Vec<&'a Resource>) = resources
        .iter()
        .copied()
        .partition(|r| r.resource_type.is_service());
    HostServiceSplit { hosts, services }
}
