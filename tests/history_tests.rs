// Metrics store and history service tests: tiers, rollup, retention, fallback chain

mod common;

use std::sync::Arc;
use std::time::Duration;

use pulseview::history::{
    HistoryError, HistoryQuery, HistoryService, HistorySource, MetricSample, MetricsBuffer,
    MetricsStore, Tier, TierRetention, samples_from_snapshot,
};
use pulseview::models::{Metric, NetworkRate, ResourceType, TimeRange};
use pulseview::state::ResourceRegistry;
use tempfile::TempDir;

/// Unix seconds aligned to an hour boundary.
const T0: i64 = 1_699_999_200;

async fn open_store(dir: &TempDir) -> Arc<MetricsStore> {
    let path = dir.path().join("metrics.db");
    let store = MetricsStore::connect(path.to_str().unwrap(), 2, TierRetention::default())
        .await
        .unwrap();
    store.init().await.unwrap();
    Arc::new(store)
}

fn sample(id: &str, metric: Metric, value: f64, ts_secs: i64) -> MetricSample {
    MetricSample {
        resource_type: "vm".to_string(),
        resource_id: id.to_string(),
        metric,
        value,
        timestamp: ts_secs * 1000,
    }
}

fn query(resource_type: &str, resource_id: &str) -> HistoryQuery {
    HistoryQuery {
        resource_type: resource_type.to_string(),
        resource_id: resource_id.to_string(),
        ..HistoryQuery::default()
    }
}

#[tokio::test]
async fn test_store_init_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    // Second init is no-op (IF NOT EXISTS)
    store.init().await.unwrap();
}

#[tokio::test]
async fn test_store_write_and_query_raw() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    store
        .write_batch(&[
            sample("vm-1", Metric::Cpu, 10.0, T0),
            sample("vm-1", Metric::Cpu, 20.0, T0 + 10),
            sample("vm-1", Metric::Memory, 50.0, T0),
            sample("vm-2", Metric::Cpu, 99.0, T0),
        ])
        .await
        .unwrap();

    let points = store
        .query("vm", "vm-1", Metric::Cpu, (T0 - 600) * 1000, (T0 + 600) * 1000)
        .await
        .unwrap();
    let values: Vec<f64> = points.iter().map(|p| p.value).collect();
    assert_eq!(values, [10.0, 20.0]);
    assert_eq!(points[0].timestamp, T0 * 1000);

    let all = store
        .query_all("vm", "vm-1", (T0 - 600) * 1000, (T0 + 600) * 1000)
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[&Metric::Memory][0].value, 50.0);
}

#[tokio::test]
async fn test_tier_selection_follows_retention() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    assert_eq!(store.select_tier(Duration::from_secs(3600)), Tier::Raw);
    assert_eq!(store.select_tier(Duration::from_secs(2 * 3600)), Tier::Raw);
    assert_eq!(store.select_tier(Duration::from_secs(12 * 3600)), Tier::Minute);
    assert_eq!(store.select_tier(Duration::from_secs(3 * 86_400)), Tier::Hourly);
    assert_eq!(store.select_tier(Duration::from_secs(30 * 86_400)), Tier::Daily);
}

#[tokio::test]
async fn test_rollup_folds_raw_into_minute_buckets() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    let samples: Vec<MetricSample> = (0..12)
        .map(|i| sample("vm-1", Metric::Cpu, i as f64, T0 + i * 10))
        .collect();
    store.write_batch(&samples).await.unwrap();

    let written = store.run_rollup_at(T0 + 3600).await.unwrap();
    assert_eq!(written, 2);

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.raw_count, 12);
    assert_eq!(stats.minute_count, 2);
    assert_eq!(stats.total_writes, 12);
    assert_eq!(stats.last_rollup, Some((T0 + 3600) * 1000));

    // A 6h span reads the minute tier.
    let points = store
        .query("vm", "vm-1", Metric::Cpu, (T0 - 3 * 3600) * 1000, (T0 + 3 * 3600) * 1000)
        .await
        .unwrap();
    assert_eq!(points.len(), 2);
    assert_eq!(points[0].timestamp, T0 * 1000);
    assert_eq!(points[0].value, 2.5);
    assert_eq!(points[0].min, Some(0.0));
    assert_eq!(points[0].max, Some(5.0));
    assert_eq!(points[1].value, 8.5);
    assert_eq!(points[1].max, Some(11.0));

    // Checkpoint already covers these buckets.
    assert_eq!(store.run_rollup_at(T0 + 3600).await.unwrap(), 0);
    assert_eq!(store.stats().await.unwrap().minute_count, 2);
}

#[tokio::test]
async fn test_rollup_keeps_raw_window_queryable() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    let now = T0 + 3600;
    let samples: Vec<MetricSample> = (0..60)
        .map(|i| sample("vm-1", Metric::Cpu, i as f64, T0 + i * 60))
        .collect();
    store.write_batch(&samples).await.unwrap();

    let hour = |store: Arc<MetricsStore>| async move {
        store
            .query("vm", "vm-1", Metric::Cpu, (now - 3600) * 1000, now * 1000)
            .await
            .unwrap()
            .len()
    };
    assert_eq!(hour(store.clone()).await, 60);

    assert_eq!(store.run_rollup_at(now).await.unwrap(), 55);
    assert_eq!(hour(store.clone()).await, 60);

    // The next pass only writes buckets past the checkpoint.
    assert_eq!(store.run_rollup_at(now + 300).await.unwrap(), 5);
    assert_eq!(store.run_rollup_at(now + 300).await.unwrap(), 0);
    let stats = store.stats().await.unwrap();
    assert_eq!(stats.raw_count, 60);
    assert_eq!(stats.minute_count, 60);
}

#[tokio::test]
async fn test_rollup_checkpoint_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    let samples: Vec<MetricSample> = (0..12)
        .map(|i| sample("vm-1", Metric::Cpu, i as f64, T0 + i * 10))
        .collect();
    store.write_batch(&samples).await.unwrap();
    assert_eq!(store.run_rollup_at(T0 + 3600).await.unwrap(), 2);
    drop(store);

    let store = open_store(&dir).await;
    assert_eq!(store.run_rollup_at(T0 + 3600).await.unwrap(), 0);
    assert_eq!(store.stats().await.unwrap().minute_count, 2);
}

#[tokio::test]
async fn test_query_falls_back_to_coarser_tier() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    let samples: Vec<MetricSample> = (0..12)
        .map(|i| sample("vm-1", Metric::Cpu, i as f64, T0 + i * 10))
        .collect();
    store.write_batch(&samples).await.unwrap();
    store.run_rollup_at(T0 + 3600).await.unwrap();
    // Raw retention is 2h: the raw rows go, the minute buckets stay.
    store.run_retention_at(T0 + 3 * 3600).await.unwrap();
    let stats = store.stats().await.unwrap();
    assert_eq!(stats.raw_count, 0);
    assert_eq!(stats.minute_count, 2);

    let (start, end) = ((T0 - 1800) * 1000, (T0 + 1800) * 1000);
    assert_eq!(store.select_tier(Duration::from_secs(3600)), Tier::Raw);
    let points = store.query("vm", "vm-1", Metric::Cpu, start, end).await.unwrap();
    let values: Vec<f64> = points.iter().map(|p| p.value).collect();
    assert_eq!(values, [2.5, 8.5]);

    let all = store.query_all("vm", "vm-1", start, end).await.unwrap();
    assert_eq!(all[&Metric::Cpu].len(), 2);
}

#[tokio::test]
async fn test_tier_fallback_order() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    let hour = Duration::from_secs(3600);
    assert_eq!(
        store.tier_fallbacks(hour),
        [Tier::Raw, Tier::Minute, Tier::Hourly]
    );
    assert_eq!(
        store.tier_fallbacks(hour * 12),
        [Tier::Minute, Tier::Raw, Tier::Hourly]
    );
    assert_eq!(
        store.tier_fallbacks(hour * 72),
        [Tier::Hourly, Tier::Minute, Tier::Raw]
    );
    assert_eq!(
        store.tier_fallbacks(hour * 24 * 30),
        [Tier::Daily, Tier::Hourly, Tier::Minute, Tier::Raw]
    );
}

#[tokio::test]
async fn test_rollup_leaves_recent_raw_rows() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    store
        .write_batch(&[sample("vm-1", Metric::Cpu, 1.0, T0 + 3500)])
        .await
        .unwrap();
    assert_eq!(store.run_rollup_at(T0 + 3600).await.unwrap(), 0);
    assert_eq!(store.stats().await.unwrap().raw_count, 1);
}

#[tokio::test]
async fn test_retention_prunes_old_rows() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    store
        .write_batch(&[
            sample("vm-1", Metric::Cpu, 1.0, T0),
            sample("vm-1", Metric::Cpu, 2.0, T0 + 3 * 3600 - 60),
        ])
        .await
        .unwrap();

    let deleted = store.run_retention_at(T0 + 3 * 3600).await.unwrap();
    assert_eq!(deleted, 1);
    let stats = store.stats().await.unwrap();
    assert_eq!(stats.raw_count, 1);
    assert!(stats.last_retention.is_some());

    store.vacuum().await.unwrap();
}

#[tokio::test]
async fn test_stats_report_path_and_counters() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    let stats = store.stats().await.unwrap();
    assert!(stats.db_path.ends_with("metrics.db"));
    assert_eq!(stats.total_writes, 0);
    assert_eq!(stats.last_rollup, None);
    let json = serde_json::to_value(&stats).unwrap();
    assert!(json.get("rawCount").is_some());
}

#[test]
fn test_samples_from_snapshot_use_chart_units() {
    let mut vm = common::resource("vm-1", ResourceType::Vm, "vm-1");
    vm.cpu = Some(0.25);
    vm.network = Some(NetworkRate { rx: 10.0, tx: 20.0 });
    let samples = samples_from_snapshot(&common::snapshot(5_000, vec![vm]));
    assert_eq!(samples.len(), 3);
    let cpu = samples.iter().find(|s| s.metric == Metric::Cpu).unwrap();
    assert_eq!(cpu.value, 25.0);
    assert_eq!(cpu.resource_type, "vm");
    assert!(samples.iter().all(|s| s.timestamp == 5_000));
}

// --- History service: validation and store -> memory -> live fallback ---

fn service(store: Option<Arc<MetricsStore>>) -> (HistoryService, Arc<MetricsBuffer>, Arc<ResourceRegistry>) {
    let buffer = Arc::new(MetricsBuffer::new(Duration::from_secs(7200), 1_440));
    let registry = Arc::new(ResourceRegistry::new(4));
    let svc = HistoryService::new(store, buffer.clone(), registry.clone(), Duration::from_secs(7200));
    (svc, buffer, registry)
}

#[tokio::test]
async fn test_history_requires_resource_id_and_type() {
    let (svc, _, _) = service(None);
    let err = svc.history_at(&query("vm", ""), T0 * 1000).await.unwrap_err();
    assert!(matches!(err, HistoryError::MissingParameter("resourceId")));
    let err = svc.history_at(&query("", "vm-1"), T0 * 1000).await.unwrap_err();
    assert!(matches!(err, HistoryError::MissingParameter("resourceType")));
}

#[tokio::test]
async fn test_history_rejects_unknown_metric() {
    let (svc, _, _) = service(None);
    let q = HistoryQuery {
        metric: Some("temperature".into()),
        ..query("vm", "vm-1")
    };
    let err = svc.history_at(&q, T0 * 1000).await.unwrap_err();
    assert!(matches!(err, HistoryError::UnknownMetric(ref m) if m == "temperature"));
}

#[tokio::test]
async fn test_history_served_from_store_with_docker_alias() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    store
        .write_batch(&[MetricSample {
            resource_type: "dockerContainer".into(),
            resource_id: "docker/abc".into(),
            metric: Metric::Memory,
            value: 42.0,
            timestamp: (T0 - 60) * 1000,
        }])
        .await
        .unwrap();
    let (svc, _, _) = service(Some(store));

    let q = HistoryQuery {
        range: Some("1h".into()),
        ..query("docker", "docker/abc")
    };
    let resp = svc.history_at(&q, T0 * 1000).await.unwrap();
    assert_eq!(resp.source, HistorySource::Store);
    assert_eq!(resp.resource_type, "dockerContainer");
    assert_eq!(resp.range, "1h");
    assert_eq!(resp.start, (T0 - 3600) * 1000);
    assert_eq!(resp.metrics[&Metric::Memory][0].value, 42.0);
}

#[tokio::test]
async fn test_history_falls_back_to_memory_then_live() {
    let (svc, buffer, registry) = service(None);
    let mut vm = common::resource("vm-1", ResourceType::Vm, "vm-1");
    vm.cpu = Some(0.5);

    // Nothing buffered yet: a single live point from the current snapshot.
    registry.publish(common::snapshot(T0 * 1000, vec![vm.clone()]));
    let resp = svc.history_at(&query("vm", "vm-1"), T0 * 1000).await.unwrap();
    assert_eq!(resp.source, HistorySource::Live);
    assert_eq!(resp.metrics[&Metric::Cpu].len(), 1);
    assert_eq!(resp.metrics[&Metric::Cpu][0].value, 50.0);

    for i in 0..5 {
        buffer.record_snapshot(&common::snapshot((T0 + i * 10) * 1000, vec![vm.clone()]));
    }
    let resp = svc
        .history_at(&query("vm", "vm-1"), (T0 + 60) * 1000)
        .await
        .unwrap();
    assert_eq!(resp.source, HistorySource::Memory);
    assert_eq!(resp.metrics[&Metric::Cpu].len(), 5);
    assert_eq!(resp.range, "24h");
}

#[tokio::test]
async fn test_history_unknown_resource_is_empty_live() {
    let (svc, _, _) = service(None);
    let resp = svc.history_at(&query("vm", "ghost"), T0 * 1000).await.unwrap();
    assert_eq!(resp.source, HistorySource::Live);
    assert!(resp.metrics.is_empty());
}

#[tokio::test]
async fn test_history_buckets_by_max_points() {
    let (svc, buffer, _) = service(None);
    let now = T0 * 1000;
    for i in 0..360 {
        let ts = now - 3_600_000 + i * 10_000;
        buffer.record("vm-1", Metric::Cpu, pulseview::models::MetricPoint::new(ts, i as f64));
    }
    let q = HistoryQuery {
        range: Some("1h".into()),
        max_points: Some(60),
        metric: Some("cpu".into()),
        ..query("vm", "vm-1")
    };
    let resp = svc.history_at(&q, now).await.unwrap();
    assert_eq!(resp.step_secs, Some(60));
    let series = &resp.metrics[&Metric::Cpu];
    assert_eq!(series.len(), 60);
    // First bucket holds values 0..=5, centred 30s in.
    assert_eq!(series[0].timestamp, now - 3_600_000 + 30_000);
    assert_eq!(series[0].value, 2.5);
    assert_eq!(series[0].min, Some(0.0));
    assert_eq!(series[0].max, Some(5.0));
}

#[tokio::test]
async fn test_charts_map_covers_buffered_resources() {
    let (svc, buffer, registry) = service(None);
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64;
    let mut a = common::resource("vm-a", ResourceType::Vm, "a");
    a.cpu = Some(0.1);
    let b = common::resource("vm-b", ResourceType::Vm, "b");
    let snap = common::snapshot(now - 1_000, vec![a, b]);
    buffer.record_snapshot(&snap);
    registry.publish(snap);

    let map = svc.charts(TimeRange::OneHour).await.unwrap();
    assert_eq!(map.len(), 1);
    assert!(map["vm-a"].contains_key(&Metric::Cpu));
}
