//! HTTP API over the live dashboard state.
//!
//! Routes:
//!   GET    /api/health          → health check
//!   GET    /api/status          → connection state, session, generation
//!   GET    /api/detections      → normalized detections of the last batch
//!   GET    /api/grid            → field grid
//!   GET    /api/stats           → grid statistics
//!   GET    /api/economics       → economic estimate
//!   GET    /api/spray-path      → current spray path (404 until generated)
//!   POST   /api/spray-path      → generate the spray path
//!   DELETE /api/spray-path      → clear it
//!   POST   /api/report          → aggregate a mission report
//!   POST   /api/report/export   → aggregate and write it to REPORT_DIR
//!   GET    /reports/*           → exported report files

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{error, info};

use cropscan_common::detection::Detection;
use cropscan_common::protocol::HealthResponse;
use cropscan_processing::economics::EconomicImpact;
use cropscan_processing::export::ReportExporter;
use cropscan_processing::grid::Grid;
use cropscan_processing::path::SprayPath;
use cropscan_processing::report::{MissionMetadata, MissionReport};
use cropscan_processing::stats::GridStats;

use crate::state::{ConnectionStatus, ReportRequest, SharedDashboard};

/// Shared state for route handlers.
#[derive(Clone)]
pub struct AppState {
    pub dashboard: SharedDashboard,
    pub exporter: Arc<dyn ReportExporter + Send + Sync>,
    pub report_dir: PathBuf,
}

// ── errors ───────────────────────────────────────────────────────────────

/// Error body returned by every failing route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            AppError::Internal(msg) => {
                error!("Internal error: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg)
            }
        };
        let body = ApiError {
            code: code.to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(format!("{err:#}"))
    }
}

// ── views ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub connection: ConnectionStatus,
    pub session_id: Option<String>,
    pub generation: u64,
    pub detection_count: usize,
    pub mission: MissionMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EconomicsView {
    pub currency: String,
    #[serde(flatten)]
    pub impact: EconomicImpact,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportResponse {
    pub path: String,
    pub file_name: String,
}

// ── server ───────────────────────────────────────────────────────────────

pub fn router(state: AppState) -> Router {
    let reports = ServeDir::new(&state.report_dir);
    Router::new()
        .route("/api/health", get(health))
        .route("/api/status", get(status))
        .route("/api/detections", get(detections))
        .route("/api/grid", get(grid))
        .route("/api/stats", get(stats))
        .route("/api/economics", get(economics))
        .route(
            "/api/spray-path",
            get(get_spray_path).post(generate_spray_path).delete(clear_spray_path),
        )
        .route("/api/report", post(build_report))
        .route("/api/report/export", post(export_report))
        .nest_service("/reports", reports)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until `cancel` fires.
pub async fn run(state: AppState, listen_addr: &str, cancel: CancellationToken) -> anyhow::Result<()> {
    let app = router(state);
    let listener = TcpListener::bind(listen_addr).await?;
    info!("Dashboard HTTP server listening on {listen_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;

    info!("Dashboard HTTP server stopped");
    Ok(())
}

// ── route handlers ───────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let d = state.dashboard.read().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        message: Some(format!("generation {}", d.generation())),
    })
}

async fn status(State(state): State<AppState>) -> Json<StatusView> {
    let d = state.dashboard.read().await;
    Json(StatusView {
        connection: d.status().clone(),
        session_id: d.session_id().map(str::to_string),
        generation: d.generation(),
        detection_count: d.detections().len(),
        mission: d.metadata().clone(),
    })
}

async fn detections(State(state): State<AppState>) -> Json<Vec<Detection>> {
    let d = state.dashboard.read().await;
    Json(d.detections().to_vec())
}

async fn grid(State(state): State<AppState>) -> Json<Grid> {
    let d = state.dashboard.read().await;
    Json(d.output().grid.clone())
}

async fn stats(State(state): State<AppState>) -> Json<GridStats> {
    let d = state.dashboard.read().await;
    Json(d.output().stats)
}

async fn economics(State(state): State<AppState>) -> Json<EconomicsView> {
    let d = state.dashboard.read().await;
    Json(EconomicsView {
        currency: d.currency().to_string(),
        impact: d.output().economics,
    })
}

async fn get_spray_path(State(state): State<AppState>) -> Result<Json<SprayPath>, AppError> {
    let d = state.dashboard.read().await;
    d.spray_path()
        .cloned()
        .map(Json)
        .ok_or_else(|| AppError::NotFound("no spray path generated".into()))
}

async fn generate_spray_path(State(state): State<AppState>) -> Json<SprayPath> {
    let mut d = state.dashboard.write().await;
    Json(d.generate_spray_path().clone())
}

async fn clear_spray_path(State(state): State<AppState>) -> StatusCode {
    state.dashboard.write().await.clear_spray_path();
    StatusCode::NO_CONTENT
}

/// An empty body means "no optional inputs".
fn parse_request(body: &Bytes) -> Result<ReportRequest, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ReportRequest::default());
    }
    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("invalid report request: {e}")))
}

async fn build_report(State(state): State<AppState>, body: Bytes) -> Result<Json<MissionReport>, AppError> {
    let request = parse_request(&body)?;
    let report = state.dashboard.read().await.build_report(&request, Utc::now());
    Ok(Json(report))
}

async fn export_report(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<ExportResponse>), AppError> {
    let request = parse_request(&body)?;
    let report = state.dashboard.read().await.build_report(&request, Utc::now());

    let exporter = state.exporter.clone();
    let path = tokio::task::spawn_blocking(move || exporter.export(&report))
        .await
        .map_err(|e| AppError::Internal(format!("export task failed: {e}")))??;

    let file_name = path
        .file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();
    Ok((
        StatusCode::CREATED,
        Json(ExportResponse {
            path: path.display().to_string(),
            file_name,
        }),
    ))
}
