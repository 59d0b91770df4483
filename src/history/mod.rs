// Metric history: SQLite tiers, in-memory rings, and the query service on top of both.

mod buffer;
mod service;
mod store;

pub use buffer::MetricsBuffer;
pub use service::{
    HistoryError, HistoryQuery, HistoryResponse, HistoryService, HistorySource,
    build_history_points, resolve_range, step_secs,
};
pub use store::{MetricSample, MetricsStore, StoreStats, Tier, TierRetention};
pub(crate) use store::now_millis;

use crate::models::ResourceSnapshot;

/// Flatten a snapshot into store rows, one per reported metric per resource.
pub fn samples_from_snapshot(snapshot: &ResourceSnapshot) -> Vec<MetricSample> {
    snapshot
        .resources
        .iter()
        .flat_map(|r| {
            r.metric_values()
                .into_iter()
                .map(move |(metric, value)| MetricSample {
                    resource_type: r.resource_type.as_str().to_string(),
                    resource_id: r.id.clone(),
                    metric,
                    value,
                    timestamp: snapshot.timestamp,
                })
        })
        .collect()
}
