// Integration tests: HTTP and WebSocket endpoints

mod common;

use axum_test::TestServer;
use pulseview::charts::ChartCache;
use pulseview::config::AppConfig;
use pulseview::history::{HistoryService, MetricsBuffer, MetricsStore, TierRetention};
use pulseview::models::{Resource, ResourceSnapshot, ResourceType};
use pulseview::routes;
use pulseview::state::ResourceRegistry;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::time::Duration;

const TEST_CONFIG: &str = r#"
[server]
port = 8081
host = "0.0.0.0"

[database]
path = "data/test.db"
max_pool_size = 2
flush_rate = 5

[collection]
sample_interval_ms = 1000
stats_log_interval_secs = 60

[publishing]
broadcast_capacity = 10
"#;

fn test_app_config() -> AppConfig {
    AppConfig::load_from_str(TEST_CONFIG).unwrap()
}

fn test_app_with_store(store: Option<Arc<MetricsStore>>) -> (axum::Router, Arc<ResourceRegistry>) {
    let config = test_app_config();
    let registry = Arc::new(ResourceRegistry::new(config.publishing.broadcast_capacity));
    let buffer = Arc::new(MetricsBuffer::new(Duration::from_secs(600), 100));
    let history = Arc::new(HistoryService::new(
        store,
        buffer,
        registry.clone(),
        Duration::from_secs(config.charts.in_memory_threshold_secs),
    ));
    let chart_cache = Arc::new(ChartCache::new(
        history.clone(),
        config.charts.default_range,
        Duration::from_secs(config.charts.cache_ttl_secs),
    ));
    let app = routes::app(
        registry.clone(),
        history,
        chart_cache,
        Arc::new(AtomicUsize::new(0)),
        config,
    );
    (app, registry)
}

fn test_app() -> (axum::Router, Arc<ResourceRegistry>) {
    test_app_with_store(None)
}

fn mixed_resources() -> Vec<Resource> {
    let mut node = common::resource("node/pve1", ResourceType::Node, "pve1");
    node.cpu = Some(0.4);
    let mut vm = common::resource("vm/100", ResourceType::Vm, "web");
    vm.cpu = Some(0.9);
    vm.sources = vec!["proxmox".to_string()];
    let mut pbs = common::resource("pbs/backup", ResourceType::Pbs, "backup");
    pbs.cpu = Some(0.1);
    vec![node, vm, pbs]
}

#[tokio::test]
async fn test_root_endpoint() {
    let (app, _) = test_app();
    let server = TestServer::new(app);
    let response = server.get("/").await;
    response.assert_status_ok();
    response.assert_text("pulseview: resource monitor");
}

#[tokio::test]
async fn test_version_endpoint() {
    let (app, _) = test_app();
    let server = TestServer::new(app);
    let response = server.get("/version").await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert_eq!(json.get("name").and_then(|v| v.as_str()), Some("pulseview"));
    assert!(json.get("version").and_then(|v| v.as_str()).is_some());
}

#[tokio::test]
async fn test_resources_sorted_and_filtered() {
    let (app, registry) = test_app();
    registry.publish(common::snapshot(1, mixed_resources()));
    let server = TestServer::new(app);

    let response = server
        .get("/api/resources")
        .add_query_param("sort", "cpu")
        .add_query_param("dir", "desc")
        .await;
    response.assert_status_ok();
    let resources: Vec<Resource> = response.json();
    let ids: Vec<&str> = resources.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["vm/100", "node/pve1", "pbs/backup"]);

    let response = server
        .get("/api/resources")
        .add_query_param("source", "proxmox")
        .await;
    let resources: Vec<Resource> = response.json();
    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0].id, "vm/100");

    let response = server
        .get("/api/resources")
        .add_query_param("exclude", "proxmox")
        .await;
    let resources: Vec<Resource> = response.json();
    assert_eq!(resources.len(), 2);
}

#[tokio::test]
async fn test_resources_rejects_unknown_sort() {
    let (app, _) = test_app();
    let server = TestServer::new(app);
    let response = server
        .get("/api/resources")
        .add_query_param("sort", "bogus")
        .await;
    response.assert_status_bad_request();
    let json: serde_json::Value = response.json();
    assert!(json["error"].as_str().unwrap().contains("sort"));
}

#[tokio::test]
async fn test_split_endpoint() {
    let (app, registry) = test_app();
    registry.publish(common::snapshot(1, mixed_resources()));
    let server = TestServer::new(app);
    let json: serde_json::Value = server.get("/api/resources/split").await.json();
    assert_eq!(json["hosts"].as_array().unwrap().len(), 2);
    let services = json["services"].as_array().unwrap();
    assert_eq!(services.len(), 1);
    assert_eq!(services[0]["id"], "pbs/backup");
}

#[tokio::test]
async fn test_io_scale_endpoint() {
    let (app, registry) = test_app();
    registry.publish(common::snapshot(1, common::fleet(10)));
    let server = TestServer::new(app);
    let json: serde_json::Value = server.get("/api/resources/io-scale").await.json();
    assert_eq!(json["network"]["count"], 10);
    assert_eq!(json["diskIo"]["count"], 10);
    assert_eq!(json["diskIo"]["max"].as_f64(), Some(90.0));
}

#[tokio::test]
async fn test_table_grouped_and_flat() {
    let (app, registry) = test_app();
    registry.publish(common::snapshot(1, common::fleet(20)));
    let server = TestServer::new(app);

    let grouped: serde_json::Value = server
        .get("/api/table")
        .add_query_param("grouping", "grouped")
        .await
        .json();
    assert_eq!(grouped["totalRows"], 22);
    assert_eq!(grouped["windowed"], false);
    let rows = grouped["rows"].as_array().unwrap();
    assert_eq!(rows[0]["kind"], "groupHeader");
    assert_eq!(rows[0]["count"], 10);

    let flat: serde_json::Value = server.get("/api/table").await.json();
    assert_eq!(flat["totalRows"], 20);
    let rows = flat["rows"].as_array().unwrap();
    assert!(rows.iter().all(|r| r["kind"] == "resource"));
}

#[tokio::test]
async fn test_table_windowed_for_large_fleet() {
    let (app, registry) = test_app();
    registry.publish(common::snapshot(1, common::fleet(common::XLARGE)));
    let server = TestServer::new(app);
    let json: serde_json::Value = server
        .get("/api/table")
        .add_query_param("offset", "1500")
        .await
        .json();
    assert_eq!(json["windowed"], true);
    assert_eq!(json["totalRows"], common::XLARGE);
    let mounted = json["rows"].as_array().unwrap().len();
    assert!(mounted > 0 && mounted <= 140, "mounted {mounted} rows");
    assert!(json["paddingTop"].as_u64().unwrap() > 0);
    assert!(json["paddingBottom"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_table_rejects_unknown_grouping() {
    let (app, _) = test_app();
    let server = TestServer::new(app);
    server
        .get("/api/table")
        .add_query_param("grouping", "tree")
        .await
        .assert_status_bad_request();
}

#[tokio::test]
async fn test_charts_unknown_range_reads_as_one_hour() {
    let (app, _) = test_app();
    let server = TestServer::new(app);
    let response = server.get("/api/charts").add_query_param("range", "2w").await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert_eq!(json["range"], "1h");
    assert!(json["charts"].as_object().unwrap().is_empty());
}

#[tokio::test]
async fn test_history_requires_resource_id() {
    let (app, _) = test_app();
    let server = TestServer::new(app);
    let response = server
        .get("/api/metrics-store/history")
        .add_query_param("resourceType", "vm")
        .await;
    response.assert_status_bad_request();
    let json: serde_json::Value = response.json();
    assert!(json["error"].as_str().unwrap().contains("resourceId"));
}

#[tokio::test]
async fn test_store_stats_unavailable_without_store() {
    let (app, _) = test_app();
    let server = TestServer::new(app);
    server
        .get("/api/metrics-store/stats")
        .await
        .assert_status_service_unavailable();
}

#[tokio::test]
async fn test_store_stats_with_store() {
    let dir = tempfile::TempDir::new().unwrap();
    let db_path = dir.path().join("metrics.db");
    let store = MetricsStore::connect(db_path.to_str().unwrap(), 2, TierRetention::default())
        .await
        .unwrap();
    store.init().await.unwrap();
    let (app, _) = test_app_with_store(Some(Arc::new(store)));
    let server = TestServer::new(app);
    let response = server.get("/api/metrics-store/stats").await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert_eq!(json["rawCount"], 0);
}

// --- WebSocket tests (require http_transport + ws feature) ---
// Receive until we get valid JSON (server may send Ping first).

async fn receive_first_json_text<T: serde::de::DeserializeOwned>(
    ws: &mut axum_test::TestWebSocket,
) -> T {
    let deadline = tokio::time::Instant::now() + tokio::time::Duration::from_secs(3);
    loop {
        let text = ws.receive_text().await;
        if let Ok(v) = serde_json::from_str::<T>(&text) {
            return v;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for JSON"
        );
    }
}

#[tokio::test]
async fn test_ws_state_sends_current_then_published_snapshot() {
    let (app, registry) = test_app();
    registry.publish(common::snapshot(10, mixed_resources()));
    let server = TestServer::builder().http_transport().build(app);
    let mut ws = server
        .get_websocket("/ws/state")
        .await
        .into_websocket()
        .await;

    let current: ResourceSnapshot = receive_first_json_text(&mut ws).await;
    assert_eq!(current.timestamp, 10);
    assert_eq!(current.resources.len(), 3);

    let publisher = registry.clone();
    tokio::spawn(async move {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        publisher.publish(common::snapshot(42, common::fleet(2)));
    });
    let received: ResourceSnapshot = receive_first_json_text(&mut ws).await;
    assert_eq!(received.timestamp, 42);
    assert_eq!(received.resources[1].id, "vm-1");
}
