// In-memory recent history: one bounded ring per (resource, metric).

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use crate::models::{ChartData, Metric, MetricPoint, ResourceSnapshot};

pub struct MetricsBuffer {
    series: RwLock<HashMap<String, HashMap<Metric, VecDeque<MetricPoint>>>>,
    max_age_ms: i64,
    max_points: usize,
}

impl MetricsBuffer {
    pub fn new(max_age: Duration, max_points: usize) -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
            max_age_ms: max_age.as_millis() as i64,
            max_points: max_points.max(1),
        }
    }

    /// Append one point; points older than the newest minus `max_age` are dropped.
    pub fn record(&self, resource_id: &str, metric: Metric, point: MetricPoint) {
        let mut series = self.series.write().unwrap_or_else(PoisonError::into_inner);
        let ring = series
            .entry(resource_id.to_string())
            .or_default()
            .entry(metric)
            .or_default();
        if ring.back().is_some_and(|last| last.timestamp > point.timestamp) {
            tracing::trace!(resource = %resource_id, metric = metric.as_str(), "out-of-order point dropped");
            return;
        }
        ring.push_back(point);
        let floor = point.timestamp - self.max_age_ms;
        while ring.front().is_some_and(|p| p.timestamp < floor) || ring.len() > self.max_points {
            ring.pop_front();
        }
    }

    /// Record every reported metric of every resource, then forget resources that vanished.
    pub fn record_snapshot(&self, snapshot: &ResourceSnapshot) {
        for r in &snapshot.resources {
            for (metric, value) in r.metric_values() {
                self.record(&r.id, metric, MetricPoint::new(snapshot.timestamp, value));
            }
        }
        let live: HashSet<&str> = snapshot.resources.iter().map(|r| r.id.as_str()).collect();
        let mut series = self.series.write().unwrap_or_else(PoisonError::into_inner);
        series.retain(|id, _| live.contains(id.as_str()));
    }

    pub fn series(&self, resource_id: &str, metric: Metric, since_ms: i64) -> Vec<MetricPoint> {
        let series = self.series.read().unwrap_or_else(PoisonError::into_inner);
        series
            .get(resource_id)
            .and_then(|m| m.get(&metric))
            .map(|ring| ring.iter().filter(|p| p.timestamp >= since_ms).copied().collect())
            .unwrap_or_default()
    }

    /// All metrics for a resource since `since_ms`; metrics without points in the window are omitted.
    pub fn all(&self, resource_id: &str, since_ms: i64) -> ChartData {
        let series = self.series.read().unwrap_or_else(PoisonError::into_inner);
        let Some(metrics) = series.get(resource_id) else {
            return ChartData::new();
        };
        metrics
            .iter()
            .filter_map(|(metric, ring)| {
                let points: Vec<MetricPoint> = ring
                    .iter()
                    .filter(|p| p.timestamp >= since_ms)
                    .copied()
                    .collect();
                (!points.is_empty()).then_some((*metric, points))
            })
            .collect()
    }

    pub fn resource_count(&self) -> usize {
        self.series
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_is_bounded_by_point_count() {
        let buf = MetricsBuffer::new(Duration::from_secs(3600), 3);
        for i in 0..10 {
            buf.record("r1", Metric::Cpu, MetricPoint::new(i * 1000, i as f64));
        }
        let s = buf.series("r1", Metric::Cpu, 0);
        assert_eq!(s.len(), 3);
        assert_eq!(s[0].value, 7.0);
    }

    #[test]
    fn ring_is_bounded_by_age() {
        let buf = MetricsBuffer::new(Duration::from_secs(10), 1000);
        buf.record("r1", Metric::Cpu, MetricPoint::new(0, 1.0));
        buf.record("r1", Metric::Cpu, MetricPoint::new(5_000, 2.0));
        buf.record("r1", Metric::Cpu, MetricPoint::new(20_000, 3.0));
        let s = buf.series("r1", Metric::Cpu, 0);
        assert_eq!(s.len(), 1);
        assert_eq!(s[0].value, 3.0);
    }

    #[test]
    fn out_of_order_points_are_ignored() {
        let buf = MetricsBuffer::new(Duration::from_secs(60), 100);
        buf.record("r1", Metric::Memory, MetricPoint::new(2_000, 1.0));
        buf.record("r1", Metric::Memory, MetricPoint::new(1_000, 2.0));
        assert_eq!(buf.series("r1", Metric::Memory, 0).len(), 1);
    }
}
