//! HTMX web UI and JSON API.

use askama::Template;
use axum::{
    extract::{Form, Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use hikewatch_core::{ExportRecord, MetricKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::config::Role;
use crate::state::{AppState, ReadingView, StateError, StatusView};

/// Main index page template.
#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    role: String,
    primary: bool,
}

/// Status partial template.
#[derive(Template)]
#[template(path = "partials/status.html")]
struct StatusTemplate {
    state: String,
    active: bool,
    peer_reachable: bool,
    record_count: usize,
    primary: bool,
    readings: Vec<ReadingView>,
    message: String,
}

impl StatusTemplate {
    fn new(status: StatusView, message: String) -> Self {
        Self {
            state: status.state.to_string(),
            active: status.state.is_active(),
            peer_reachable: status.peer_reachable,
            record_count: status.record_count,
            primary: status.role == Role::Primary,
            readings: status.readings,
            message,
        }
    }
}

/// Creates the web router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/status", get(api_status))
        .route("/latest/:metric", get(api_latest))
        .route("/start", post(api_start))
        .route("/stop", post(api_stop))
        .route("/records", get(api_records).post(api_add_record))
        .route("/records/snapshot", post(api_snapshot))
        .route("/export", post(api_export))
        .layer(CorsLayer::permissive());

    Router::new()
        // Main page
        .route("/", get(index))
        // Partials for HTMX
        .route("/status", get(status))
        .route("/start", post(start))
        .route("/stop", post(stop))
        .route("/record", post(record_snapshot))
        .route("/export", post(export))
        // Export file contents
        .route("/export.csv", get(export_csv))
        .nest("/api", api)
        // State
        .with_state(state)
}

fn render_html<T: Template>(template: T) -> Response {
    match template.render() {
        Ok(html) => Html(html).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to render page: {}", e),
        )
            .into_response(),
    }
}

fn status_partial(state: &AppState, message: String) -> Response {
    render_html(StatusTemplate::new(state.status(), message))
}

/// GET / - Main page
async fn index(State(state): State<Arc<AppState>>) -> Response {
    let role = state.role();
    render_html(IndexTemplate {
        role: role.to_string(),
        primary: role == Role::Primary,
    })
}

/// GET /status - Status partial
async fn status(State(state): State<Arc<AppState>>) -> Response {
    status_partial(&state, String::new())
}

/// POST /start - Request start
async fn start(State(state): State<Arc<AppState>>) -> Response {
    state.start_monitoring();
    status_partial(&state, String::new())
}

/// POST /stop - Request stop
async fn stop(State(state): State<Arc<AppState>>) -> Response {
    state.stop_monitoring();
    status_partial(&state, String::new())
}

/// POST /record - Record the current readings
async fn record_snapshot(State(state): State<Arc<AppState>>) -> Response {
    let message = match state.snapshot_record() {
        Ok(_) => "Recorded current readings".to_string(),
        Err(e) => e.to_string(),
    };
    status_partial(&state, message)
}

/// POST /export - Write the export file
async fn export(State(state): State<Arc<AppState>>) -> Response {
    let message = match state.export() {
        Ok(Some(path)) => format!("Exported to {}", path.display()),
        Ok(None) => "No data to export".to_string(),
        Err(e) => e.to_string(),
    };
    status_partial(&state, message)
}

/// GET /export.csv - Export contents as a download
async fn export_csv(State(state): State<Arc<AppState>>) -> Response {
    match state.export_text() {
        Ok(Some(text)) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            text,
        )
            .into_response(),
        Ok(None) => (StatusCode::NO_CONTENT, "").into_response(),
        Err(e) => api_error(e).into_response(),
    }
}

/// JSON error body.
#[derive(Debug, Serialize)]
struct ApiError {
    error: String,
}

fn api_error(e: StateError) -> (StatusCode, Json<ApiError>) {
    let status = match e {
        StateError::InvalidValue { .. } => StatusCode::BAD_REQUEST,
        StateError::PrimaryOnly(_) => StatusCode::NOT_FOUND,
        StateError::MissingReading(_) => StatusCode::CONFLICT,
    };
    (
        status,
        Json(ApiError {
            error: e.to_string(),
        }),
    )
}

/// GET /api/status
async fn api_status(State(state): State<Arc<AppState>>) -> Json<StatusView> {
    Json(state.status())
}

/// GET /api/latest/:metric
async fn api_latest(
    State(state): State<Arc<AppState>>,
    Path(metric): Path<String>,
) -> Result<Json<ReadingView>, (StatusCode, Json<ApiError>)> {
    let kind: MetricKind = metric.parse().map_err(|e: hikewatch_core::Error| {
        (
            StatusCode::BAD_REQUEST,
            Json(ApiError {
                error: e.to_string(),
            }),
        )
    })?;
    Ok(Json(ReadingView::new(kind, state.latest(kind))))
}

/// POST /api/start
async fn api_start(State(state): State<Arc<AppState>>) -> StatusCode {
    state.start_monitoring();
    StatusCode::ACCEPTED
}

/// POST /api/stop
async fn api_stop(State(state): State<Arc<AppState>>) -> StatusCode {
    state.stop_monitoring();
    StatusCode::ACCEPTED
}

/// GET /api/records
async fn api_records(State(state): State<Arc<AppState>>) -> Json<Vec<ExportRecord>> {
    Json(state.record_list())
}

/// Record values for manual entry.
#[derive(Debug, Deserialize)]
struct RecordForm {
    heart_rate: f64,
    oxygen_saturation: f64,
    heart_rate_variability: f64,
    altitude: f64,
}

/// Response carrying the record count.
#[derive(Debug, Serialize)]
struct RecordCount {
    count: usize,
}

/// POST /api/records - Add a record from a form body
async fn api_add_record(
    State(state): State<Arc<AppState>>,
    Form(form): Form<RecordForm>,
) -> Result<Json<RecordCount>, (StatusCode, Json<ApiError>)> {
    let count = state
        .add_record(
            form.heart_rate,
            form.oxygen_saturation,
            form.heart_rate_variability,
            form.altitude,
        )
        .map_err(api_error)?;
    Ok(Json(RecordCount { count }))
}

/// POST /api/records/snapshot
async fn api_snapshot(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ExportRecord>, (StatusCode, Json<ApiError>)> {
    state.snapshot_record().map(Json).map_err(api_error)
}

/// Export outcome.
#[derive(Debug, Serialize)]
struct ExportResponse {
    path: Option<String>,
}

/// POST /api/export
async fn api_export(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ExportResponse>, (StatusCode, Json<ApiError>)> {
    let path = state.export().map_err(api_error)?;
    Ok(Json(ExportResponse {
        path: path.map(|p| p.to_string_lossy().to_string()),
    }))
}
