// HTTP + WebSocket routes

mod http;
mod ws;

use axum::{Router, routing::get};
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use tower_http::cors::{Any, CorsLayer};

use crate::charts::ChartCache;
use crate::config::AppConfig;
use crate::history::HistoryService;
use crate::state::ResourceRegistry;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) registry: Arc<ResourceRegistry>,
    pub(crate) history: Arc<HistoryService>,
    pub(crate) chart_cache: Arc<ChartCache<HistoryService>>,
    pub(crate) ws_state_connections: Arc<AtomicUsize>,
    pub(crate) config: AppConfig,
}

pub fn app(
    registry: Arc<ResourceRegistry>,
    history: Arc<HistoryService>,
    chart_cache: Arc<ChartCache<HistoryService>>,
    ws_state_connections: Arc<AtomicUsize>,
    config: AppConfig,
) -> Router {
    let state = AppState {
        registry,
        history,
        chart_cache,
        ws_state_connections,
        config,
    };
    Router::new()
        .route("/", get(|| async { "pulseview: resource monitor" })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route("/api/resources", get(http::resources_handler))
        .route("/api/resources/split", get(http::split_handler))
        .route("/api/resources/io-scale", get(http::io_scale_handler))
        .route("/api/table", get(http::table_handler))
        .route("/api/charts", get(http::charts_handler))
        .route("/api/metrics-store/history", get(http::history_handler))
        .route("/api/metrics-store/stats", get(http::store_stats_handler))
        .route("/ws/state", get(ws::ws_state)) // WS /ws/state
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
