// History API semantics: range parsing, step bucketing, and the store -> memory -> live fallback.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};

use super::buffer::MetricsBuffer;
use super::store::{MetricsStore, now_millis};
use crate::charts::ChartSource;
use crate::models::{
    ChartData, ChartMap, Metric, MetricPoint, Resource, ResourceType, TimeRange,
    chart_data_has_points, parse_duration,
};
use crate::state::ResourceRegistry;

const DEFAULT_RANGE: TimeRange = TimeRange::OneDay;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    #[serde(default)]
    pub resource_type: String,
    #[serde(default)]
    pub resource_id: String,
    pub metric: Option<String>,
    pub range: Option<String>,
    pub max_points: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HistorySource {
    Store,
    Memory,
    Live,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub resource_type: String,
    pub resource_id: String,
    pub range: String,
    pub start: i64,
    pub end: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_secs: Option<i64>,
    pub source: HistorySource,
    pub metrics: ChartData,
}

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("unknown metric: {0}")]
    UnknownMetric(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Range label and span. Missing or blank means 24h; unknown labels are tried as free-form
/// durations ("90m") before falling back to 24h.
pub fn resolve_range(raw: Option<&str>) -> (String, Duration) {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return (DEFAULT_RANGE.as_str().to_string(), DEFAULT_RANGE.duration());
    };
    if let Ok(r) = raw.parse::<TimeRange>() {
        return (r.as_str().to_string(), r.duration());
    }
    if let Some(d) = parse_duration(raw) {
        return (raw.to_string(), d);
    }
    tracing::debug!(range = %raw, "unparseable history range, using default");
    (DEFAULT_RANGE.as_str().to_string(), DEFAULT_RANGE.duration())
}

/// Smallest step the tier behind a span of this length can honour.
fn min_step_secs(span: Duration) -> i64 {
    match span.as_secs() {
        s if s <= 2 * 3600 => 5,
        s if s <= 24 * 3600 => 60,
        s if s <= 7 * 24 * 3600 => 3600,
        _ => 86_400,
    }
}

/// Bucket width for `max_points`, or `None` when bucketing would not reduce anything.
pub fn step_secs(span: Duration, max_points: Option<u32>) -> Option<i64> {
    let max_points = i64::from(max_points.filter(|&n| n > 0)?);
    let secs = span.as_secs() as i64;
    let step = (secs + max_points - 1) / max_points;
    if step <= 1 || step < min_step_secs(span) {
        return None;
    }
    Some(step)
}

/// Average points into `step_secs` buckets anchored at `start_ms`. Each output point sits at
/// its bucket centre and carries the bucket's min and max.
pub fn build_history_points(points: &[MetricPoint], start_ms: i64, step_secs: i64) -> Vec<MetricPoint> {
    let step_ms = step_secs * 1000;
    if step_ms <= 0 {
        return points.to_vec();
    }
    let mut buckets: BTreeMap<i64, (f64, usize, f64, f64)> = BTreeMap::new();
    for p in points {
        let idx = (p.timestamp - start_ms).div_euclid(step_ms);
        let lo = p.min.unwrap_or(p.value);
        let hi = p.max.unwrap_or(p.value);
        let b = buckets
            .entry(idx)
            .or_insert((0.0, 0, f64::INFINITY, f64::NEG_INFINITY));
        b.0 += p.value;
        b.1 += 1;
        b.2 = b.2.min(lo);
        b.3 = b.3.max(hi);
    }
    buckets
        .into_iter()
        .map(|(idx, (sum, n, min, max))| MetricPoint {
            timestamp: start_ms + idx * step_ms + step_ms / 2,
            value: sum / n as f64,
            min: Some(min),
            max: Some(max),
        })
        .collect()
}

pub struct HistoryService {
    store: Option<Arc<MetricsStore>>,
    buffer: Arc<MetricsBuffer>,
    registry: Arc<ResourceRegistry>,
    in_memory_threshold: Duration,
}

impl HistoryService {
    pub fn new(
        store: Option<Arc<MetricsStore>>,
        buffer: Arc<MetricsBuffer>,
        registry: Arc<ResourceRegistry>,
        in_memory_threshold: Duration,
    ) -> Self {
        Self {
            store,
            buffer,
            registry,
            in_memory_threshold,
        }
    }

    pub fn store(&self) -> Option<&Arc<MetricsStore>> {
        self.store.as_ref()
    }

    pub async fn history(&self, query: &HistoryQuery) -> Result<HistoryResponse, HistoryError> {
        self.history_at(query, now_millis()?).await
    }

    pub async fn history_at(
        &self,
        query: &HistoryQuery,
        now_ms: i64,
    ) -> Result<HistoryResponse, HistoryError> {
        let resource_id = query.resource_id.trim();
        if resource_id.is_empty() {
            return Err(HistoryError::MissingParameter("resourceId"));
        }
        let resource_type = query.resource_type.trim();
        if resource_type.is_empty() {
            return Err(HistoryError::MissingParameter("resourceType"));
        }
        let store_type = ResourceType::from_api(resource_type).as_str();
        let metric = match query.metric.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
            Some(m) => Some(Metric::parse(m).ok_or_else(|| HistoryError::UnknownMetric(m.to_string()))?),
            None => None,
        };
        let (range, span) = resolve_range(query.range.as_deref());
        let start = now_ms - span.as_millis() as i64;

        let (source, mut metrics) = 'found: {
            if let Some(data) = self.from_store(store_type, resource_id, metric, start, now_ms).await {
                break 'found (HistorySource::Store, data);
            }
            let data = self.from_buffer(resource_id, metric, start);
            if chart_data_has_points(&data) {
                break 'found (HistorySource::Memory, data);
            }
            (HistorySource::Live, self.live(resource_id, metric, now_ms))
        };

        let step = step_secs(span, query.max_points);
        if let Some(step) = step {
            for series in metrics.values_mut() {
                *series = build_history_points(series, start, step);
            }
        }
        tracing::debug!(
            resource_type = store_type,
            resource_id = %resource_id,
            range = %range,
            source = ?source,
            "history served"
        );

        Ok(HistoryResponse {
            resource_type: store_type.to_string(),
            resource_id: resource_id.to_string(),
            range,
            start,
            end: now_ms,
            step_secs: step,
            source,
            metrics,
        })
    }

    async fn from_store(
        &self,
        resource_type: &str,
        resource_id: &str,
        metric: Option<Metric>,
        start: i64,
        end: i64,
    ) -> Option<ChartData> {
        let store = self.store.as_ref()?;
        let result = match metric {
            Some(m) => store
                .query(resource_type, resource_id, m, start, end)
                .await
                .map(|points| ChartData::from([(m, points)])),
            None => store.query_all(resource_type, resource_id, start, end).await,
        };
        match result {
            Ok(data) if chart_data_has_points(&data) => Some(data),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, resource_id = %resource_id, operation = "history_store_query", "metrics store query failed");
                None
            }
        }
    }

    fn from_buffer(&self, resource_id: &str, metric: Option<Metric>, start: i64) -> ChartData {
        match metric {
            Some(m) => ChartData::from([(m, self.buffer.series(resource_id, m, start))]),
            None => self.buffer.all(resource_id, start),
        }
    }

    /// Single point per metric from the current snapshot.
    fn live(&self, resource_id: &str, metric: Option<Metric>, now_ms: i64) -> ChartData {
        let snapshot = self.registry.snapshot();
        let Some(resource) = snapshot.resources.iter().find(|r| r.id == resource_id) else {
            return ChartData::new();
        };
        let ts = if snapshot.timestamp > 0 { snapshot.timestamp } else { now_ms };
        resource
            .metric_values()
            .into_iter()
            .filter(|(m, _)| metric.is_none_or(|want| want == *m))
            .map(|(m, v)| (m, vec![MetricPoint::new(ts, v)]))
            .collect()
    }

    /// Chart map for every current resource, keyed by resource id. Long ranges read the store
    /// first, short ones the buffer; each falls back to the other. Resources without data are
    /// left out.
    pub async fn charts(&self, range: TimeRange) -> anyhow::Result<ChartMap> {
        let now = now_millis()?;
        let start = now - range.duration().as_millis() as i64;
        let store_first = self.store.is_some() && range.duration() > self.in_memory_threshold;
        let snapshot = self.registry.snapshot();

        let series = join_all(
            snapshot
                .resources
                .iter()
                .map(|r| self.resource_chart(r, start, now, store_first)),
        )
        .await;

        let map: ChartMap = snapshot
            .resources
            .iter()
            .zip(series)
            .filter(|(_, data)| chart_data_has_points(data))
            .map(|(r, data)| (r.id.clone(), data))
            .collect();
        tracing::debug!(range = %range, series = map.len(), store_first, "chart map built");
        Ok(map)
    }

    async fn resource_chart(&self, r: &Resource, start: i64, end: i64, store_first: bool) -> ChartData {
        let store_type = r.resource_type.as_str();
        if store_first {
            if let Some(data) = self.from_store(store_type, &r.id, None, start, end).await {
                return data;
            }
            return self.buffer.all(&r.id, start);
        }
        let data = self.buffer.all(&r.id, start);
        if chart_data_has_points(&data) {
            return data;
        }
        self.from_store(store_type, &r.id, None, start, end)
            .await
            .unwrap_or_default()
    }
}

impl ChartSource for HistoryService {
    async fn fetch(&self, range: TimeRange) -> anyhow::Result<ChartMap> {
        self.charts(range).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_is_dropped_below_tier_minimum() {
        // 1h / 1000 points = 4s, below the 5s raw minimum
        assert_eq!(step_secs(Duration::from_secs(3600), Some(1000)), None);
        assert_eq!(step_secs(Duration::from_secs(3600), Some(60)), Some(60));
        assert_eq!(step_secs(Duration::from_secs(3600), None), None);
        assert_eq!(step_secs(Duration::from_secs(3600), Some(0)), None);
    }

    #[test]
    fn step_rounds_up() {
        // 24h / 100 = 864s
        assert_eq!(step_secs(Duration::from_secs(86_400), Some(100)), Some(864));
        // 7d / 7 = 1 day, above the hourly minimum
        assert_eq!(step_secs(Duration::from_secs(7 * 86_400), Some(7)), Some(86_400));
        // 30d needs at least one day per bucket
        assert_eq!(step_secs(Duration::from_secs(30 * 86_400), Some(100)), None);
    }

    #[test]
    fn buckets_carry_average_min_max_at_centre() {
        let points = vec![
            MetricPoint::new(0, 1.0),
            MetricPoint::new(10_000, 3.0),
            MetricPoint::new(60_000, 5.0),
        ];
        let out = build_history_points(&points, 0, 60);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].timestamp, 30_000);
        assert_eq!(out[0].value, 2.0);
        assert_eq!(out[0].min, Some(1.0));
        assert_eq!(out[0].max, Some(3.0));
        assert_eq!(out[1].timestamp, 90_000);
    }

    #[test]
    fn range_resolution_falls_back_to_a_day() {
        assert_eq!(resolve_range(None).0, "24h");
        assert_eq!(resolve_range(Some("1d")).0, "24h");
        assert_eq!(resolve_range(Some("90m")).1, Duration::from_secs(5400));
        assert_eq!(resolve_range(Some("bogus")).1, Duration::from_secs(86_400));
    }
}
