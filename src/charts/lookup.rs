// Series-key resolution for a resource, plus per-metric gap filling from a linked agent.

use crate::models::{ChartData, ChartMap, Resource};

/// Resolution order: direct key (id, name, platform id), cluster-qualified composite key,
/// hostname suffix of a composite key, then the linked host agent. `None` means "no data",
/// which callers render as an empty state.
pub fn find_chart_data<'m>(
    charts: &'m ChartMap,
    resource: &Resource,
    all: &[Resource],
) -> Option<&'m ChartData> {
    direct_match(charts, resource)
        .or_else(|| composite_match(charts, resource))
        .or_else(|| hostname_suffix_match(charts, resource))
        .or_else(|| agent_key(resource, all).and_then(|k| charts.get(k)))
}

fn direct_match<'m>(charts: &'m ChartMap, resource: &Resource) -> Option<&'m ChartData> {
    [
        Some(resource.id.as_str()),
        Some(resource.name.as_str()),
        resource.platform_id.as_deref(),
    ]
    .into_iter()
    .flatten()
    .filter(|k| !k.is_empty())
    .find_map(|k| charts.get(k))
}

fn composite_match<'m>(charts: &'m ChartMap, resource: &Resource) -> Option<&'m ChartData> {
    let cluster = resource.cluster_id.as_deref().filter(|c| !c.is_empty())?;
    [
        format!("{}:{}", cluster, resource.name),
        format!("{}:{}", cluster, resource.id),
    ]
    .iter()
    .find_map(|k| charts.get(k))
}

fn hostname_suffix_match<'m>(charts: &'m ChartMap, resource: &Resource) -> Option<&'m ChartData> {
    let host = resource
        .hostname
        .as_deref()
        .filter(|h| !h.is_empty())
        .unwrap_or(&resource.name);
    if host.is_empty() {
        return None;
    }
    let suffix = format!(":{}", host);
    // Smallest matching key keeps the choice stable across HashMap iteration orders.
    charts
        .iter()
        .filter(|(k, _)| k.ends_with(&suffix))
        .min_by(|a, b| a.0.cmp(b.0))
        .map(|(_, v)| v)
}

/// Host-agent resource for the same machine: the declared link first, then a hostname match.
pub fn agent_key<'a>(resource: &'a Resource, all: &'a [Resource]) -> Option<&'a str> {
    if let Some(link) = resource.linked_agent_id.as_deref().filter(|l| !l.is_empty()) {
        return Some(link);
    }
    let host = resource.hostname.as_deref().filter(|h| !h.is_empty())?;
    all.iter()
        .filter(|r| r.id != resource.id && r.is_host_agent())
        .find(|r| {
            r.hostname
                .as_deref()
                .is_some_and(|h| h.eq_ignore_ascii_case(host))
        })
        .map(|r| r.id.as_str())
}

/// Chart data for a resource with empty primary series filled from its linked agent.
pub fn resolve_series(charts: &ChartMap, resource: &Resource, all: &[Resource]) -> Option<ChartData> {
    let primary = find_chart_data(charts, resource, all);
    let fallback = agent_key(resource, all)
        .and_then(|k| charts.get(k))
        .filter(|f| primary.is_none_or(|p| !std::ptr::eq(*f, p)));

    match (primary, fallback) {
        (None, None) => None,
        (Some(p), None) => Some(p.clone()),
        (None, Some(f)) => Some(f.clone()),
        (Some(p), Some(f)) => {
            let mut out = p.clone();
            for (metric, series) in f {
                if series.is_empty() {
                    continue;
                }
                let slot = out.entry(*metric).or_default();
                if slot.is_empty() {
                    tracing::trace!(
                        resource = %resource.id,
                        metric = metric.as_str(),
                        "filling empty series from linked agent"
                    );
                    *slot = series.clone();
                }
            }
            Some(out)
        }
    }
}
