// GET handlers: version, resources, table, charts, metrics store

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;

use super::AppState;
use crate::history::{HistoryError, HistoryQuery};
use crate::models::{Resource, TimeRange};
use crate::selectors::{
    GroupingMode, SortDirection, SortKey, compute_io_scale, filter_resources, sort_resources,
    split_host_and_service_resources,
};
use crate::table::{TableFilter, TableView, render_table};

const NAME: &str = env!("CARGO_PKG_NAME");
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Handler failures, rendered as `{"error": "..."}` with a matching status.
#[derive(Debug, thiserror::Error)]
pub(super) enum ApiError {
    #[error("invalid parameter '{param}': {error}")]
    InvalidParam { param: &'static str, error: String },
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error("metrics store is disabled")]
    StoreUnavailable,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidParam { .. } => StatusCode::BAD_REQUEST,
            Self::History(HistoryError::Internal(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::History(_) => StatusCode::BAD_REQUEST,
            Self::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

fn parse_param<T>(param: &'static str, raw: Option<&str>) -> Result<T, ApiError>
where
    T: std::str::FromStr<Err = String> + Default,
{
    match raw {
        Some(s) => s.parse().map_err(|error| ApiError::InvalidParam { param, error }),
        None => Ok(T::default()),
    }
}

/// Comma-separated list; blanks dropped.
fn split_list(raw: Option<&str>) -> Vec<&str> {
    raw.map(|s| s.split(',').map(str::trim).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default()
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct ResourcesParams {
    source: Option<String>,
    exclude: Option<String>,
    sort: Option<String>,
    dir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct TableParams {
    grouping: Option<String>,
    sort: Option<String>,
    dir: Option<String>,
    expanded: Option<String>,
    offset: Option<usize>,
    search: Option<String>,
    source: Option<String>,
    exclude: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct ChartsParams {
    range: Option<String>,
}

/// GET /version: returns service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    Json(json!({
        "name": NAME,
        "version": VERSION,
    }))
}

/// GET /api/resources: current snapshot, source-filtered and sorted.
pub(super) async fn resources_handler(
    State(state): State<AppState>,
    Query(params): Query<ResourcesParams>,
) -> Result<Json<Vec<Resource>>, ApiError> {
    let key: SortKey = parse_param("sort", params.sort.as_deref())?;
    let direction: SortDirection = parse_param("dir", params.dir.as_deref())?;
    let snapshot = state.registry.snapshot();
    let include = split_list(params.source.as_deref());
    let exclude = split_list(params.exclude.as_deref());
    let filtered = filter_resources(&snapshot.resources, &include, &exclude, &[]);
    let sorted = sort_resources(&filtered, key, direction);
    Ok(Json(sorted.into_iter().cloned().collect()))
}

/// GET /api/resources/split: `{hosts, services}` partition of the current snapshot.
pub(super) async fn split_handler(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.registry.snapshot();
    let refs: Vec<&Resource> = snapshot.resources.iter().collect();
    let split = split_host_and_service_resources(&refs);
    Json(json!({
        "hosts": split.hosts,
        "services": split.services,
    }))
}

/// GET /api/resources/io-scale
pub(super) async fn io_scale_handler(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.registry.snapshot();
    let refs: Vec<&Resource> = snapshot.resources.iter().collect();
    Json(compute_io_scale(&refs))
}

/// GET /api/table: windowed table rows for one scroll position, overlays on mounted rows.
pub(super) async fn table_handler(
    State(state): State<AppState>,
    Query(params): Query<TableParams>,
) -> Result<impl IntoResponse, ApiError> {
    let mode: GroupingMode = parse_param("grouping", params.grouping.as_deref())?;
    let key: SortKey = parse_param("sort", params.sort.as_deref())?;
    let direction: SortDirection = parse_param("dir", params.dir.as_deref())?;

    let snapshot = state.registry.snapshot();
    let charts = if snapshot.resources.is_empty() {
        None
    } else {
        Some(state.chart_cache.load(state.config.charts.default_range).await)
    };

    let mut view = TableView::new(state.config.table);
    view.set_resources(snapshot.resources.clone());
    view.set_filter(TableFilter {
        include_sources: split_list(params.source.as_deref())
            .into_iter()
            .map(String::from)
            .collect(),
        exclude_sources: split_list(params.exclude.as_deref())
            .into_iter()
            .map(String::from)
            .collect(),
        search: params.search,
    });
    view.set_sort(key, direction);
    view.set_grouping_mode(mode);
    view.set_expanded_resource(params.expanded.filter(|id| !id.is_empty()));
    view.set_scroll_offset(params.offset.unwrap_or(0));

    Ok(Json(render_table(&mut view, charts.as_deref())))
}

/// GET /api/charts?range=: chart map for every current resource. Unknown ranges read as 1h.
pub(super) async fn charts_handler(
    State(state): State<AppState>,
    Query(params): Query<ChartsParams>,
) -> impl IntoResponse {
    let range = params
        .range
        .as_deref()
        .and_then(|s| s.parse::<TimeRange>().ok())
        .unwrap_or(TimeRange::OneHour);
    let charts = state.chart_cache.load(range).await;
    Json(json!({
        "range": range,
        "charts": &*charts,
    }))
}

/// GET /api/metrics-store/history
pub(super) async fn history_handler(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let response = state.history.history(&query).await?;
    Ok(Json(response))
}

/// GET /api/metrics-store/stats
pub(super) async fn store_stats_handler(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let store = state.history.store().ok_or(ApiError::StoreUnavailable)?;
    let stats = store.stats().await?;
    Ok(Json(stats))
}
