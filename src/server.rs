//! JSON HTTP API over the coverage engine.
//!
//! Thin transport layer: every handler validates/decodes its request,
//! delegates to the engine modules, and maps [`StoreError`] kinds onto
//! HTTP statuses.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/samples` | Submit one observation |
//! | `GET`  | `/samples?prefix=` | Raw sample rows, optionally by prefix |
//! | `DELETE` | `/samples/{key}` | Remove one sample row |
//! | `GET`  | `/coverage` | All aggregates with history |
//! | `GET`  | `/coverage/recent?days=` | Recently active cell keys |
//! | `GET`  | `/coverage/{cell}` | One aggregate |
//! | `DELETE` | `/coverage/{cell}` | Drop an aggregate and its history |
//! | `POST` | `/coverage/{cell}/repair` | Rebuild an aggregate from history |
//! | `POST` | `/maintenance/evict` | Age-based eviction |
//! | `POST` | `/maintenance/purge` | Time-window sample deletion |
//! | `GET`  | `/repeaters` | All repeater rows |
//! | `GET`  | `/repeaters/{id}` | Location rows for one id |
//! | `PUT`  | `/repeaters` | Create or refresh a sighting |
//! | `DELETE` | `/repeaters/{id}?lat=&lon=` | Remove one location row |
//! | `GET`  | `/config` | Map center and distance limit for the frontend |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "time must be positive epoch millis" } }
//! ```
//!
//! Codes: `bad_request` (400), `not_found` (404), `conflict` (409),
//! `internal` (500).

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::error;

use crate::config::Config;
use crate::coverage;
use crate::db;
use crate::error::StoreError;
use crate::ingest;
use crate::maintenance;
use crate::repeaters;
use crate::samples;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    pool: SqlitePool,
}

pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let pool = db::connect(config).await?;

    let state = AppState {
        config: Arc::new(config.clone()),
        pool,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/samples", post(handle_submit_sample).get(handle_list_samples))
        .route("/samples/{key}", axum::routing::delete(handle_delete_sample))
        .route("/coverage", get(handle_list_coverage))
        .route("/coverage/recent", get(handle_recent_cells))
        .route(
            "/coverage/{cell}",
            get(handle_get_coverage).delete(handle_delete_coverage),
        )
        .route("/coverage/{cell}/repair", post(handle_repair))
        .route("/maintenance/evict", post(handle_evict))
        .route("/maintenance/purge", post(handle_purge))
        .route("/repeaters", get(handle_list_repeaters).put(handle_put_repeater))
        .route(
            "/repeaters/{id}",
            get(handle_get_repeater).delete(handle_delete_repeater),
        )
        .route("/config", get(handle_config))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    println!("coverage server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        let (status, code) = match &err {
            StoreError::Validation(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            StoreError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            StoreError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            StoreError::Transient(_) => {
                error!(error = %err, "store failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };
        AppError {
            status,
            code: code.to_string(),
            message: err.to_string(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /config ============

#[derive(Serialize)]
struct FrontendConfig {
    #[serde(rename = "centerPos")]
    center_pos: [f64; 2],
    #[serde(rename = "maxDistanceMiles")]
    max_distance_miles: Option<f64>,
}

async fn handle_config(State(state): State<AppState>) -> Json<FrontendConfig> {
    Json(FrontendConfig {
        center_pos: [state.config.geo.center_lat, state.config.geo.center_lon],
        max_distance_miles: state.config.geo.max_distance_miles,
    })
}

// ============ POST /samples ============

#[derive(Deserialize)]
struct SubmitRequest {
    lat: f64,
    lon: f64,
    #[serde(default)]
    path: Vec<String>,
    #[serde(default)]
    time: Option<i64>,
}

async fn handle_submit_sample(
    State(state): State<AppState>,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<ingest::SubmitReceipt>, AppError> {
    let receipt = ingest::submit(
        &state.pool,
        &state.config.geo,
        req.lat,
        req.lon,
        &req.path,
        req.time,
    )
    .await?;
    Ok(Json(receipt))
}

// ============ GET /samples ============

#[derive(Deserialize)]
struct SamplesQuery {
    #[serde(default)]
    prefix: Option<String>,
}

async fn handle_list_samples(
    State(state): State<AppState>,
    Query(q): Query<SamplesQuery>,
) -> Result<Json<Vec<crate::models::Sample>>, AppError> {
    let rows = samples::list_by_prefix(&state.pool, q.prefix.as_deref()).await?;
    Ok(Json(rows))
}

async fn handle_delete_sample(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<StatusCode, AppError> {
    samples::delete_by_key(&state.pool, &key).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============ Coverage ============

async fn handle_list_coverage(
    State(state): State<AppState>,
) -> Result<Json<Vec<crate::models::CoverageAggregate>>, AppError> {
    Ok(Json(coverage::get_all(&state.pool).await?))
}

#[derive(Deserialize)]
struct RecentQuery {
    #[serde(default)]
    days: Option<i64>,
}

async fn handle_recent_cells(
    State(state): State<AppState>,
    Query(q): Query<RecentQuery>,
) -> Result<Json<Vec<String>>, AppError> {
    let days = q.days.unwrap_or(state.config.retention.look_back_days);
    let keys =
        coverage::recent_cell_keys(&state.pool, days, state.config.geo.cell_precision).await?;
    Ok(Json(keys))
}

async fn handle_get_coverage(
    State(state): State<AppState>,
    Path(cell): Path<String>,
) -> Result<Json<crate::models::CoverageAggregate>, AppError> {
    Ok(Json(coverage::get(&state.pool, &cell).await?))
}

async fn handle_delete_coverage(
    State(state): State<AppState>,
    Path(cell): Path<String>,
) -> Result<StatusCode, AppError> {
    coverage::delete(&state.pool, &cell).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_repair(
    State(state): State<AppState>,
    Path(cell): Path<String>,
) -> Result<Json<crate::models::CoverageAggregate>, AppError> {
    Ok(Json(coverage::repair(&state.pool, &cell).await?))
}

// ============ Maintenance ============

#[derive(Deserialize)]
struct EvictRequest {
    #[serde(default)]
    samples_max_age_days: Option<i64>,
    #[serde(default)]
    repeaters_max_age_days: Option<i64>,
}

async fn handle_evict(
    State(state): State<AppState>,
    Json(req): Json<EvictRequest>,
) -> Result<Json<maintenance::EvictionReport>, AppError> {
    let report = maintenance::evict(
        &state.pool,
        req.samples_max_age_days
            .unwrap_or(state.config.retention.sample_max_age_days),
        req.repeaters_max_age_days
            .unwrap_or(state.config.retention.repeater_max_age_days),
    )
    .await?;
    Ok(Json(report))
}

#[derive(Deserialize)]
struct PurgeRequest {
    start: i64,
    end: i64,
}

#[derive(Serialize)]
struct PurgeResponse {
    deleted: u64,
}

async fn handle_purge(
    State(state): State<AppState>,
    Json(req): Json<PurgeRequest>,
) -> Result<Json<PurgeResponse>, AppError> {
    let deleted = maintenance::purge_window(&state.pool, req.start, req.end).await?;
    Ok(Json(PurgeResponse { deleted }))
}

// ============ Repeaters ============

async fn handle_list_repeaters(
    State(state): State<AppState>,
) -> Result<Json<Vec<crate::models::Repeater>>, AppError> {
    Ok(Json(repeaters::list(&state.pool).await?))
}

async fn handle_get_repeater(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<crate::models::Repeater>>, AppError> {
    let rows = repeaters::get_by_id(&state.pool, &id).await?;
    if rows.is_empty() {
        return Err(StoreError::not_found(format!("repeater {}", id)).into());
    }
    Ok(Json(rows))
}

#[derive(Deserialize)]
struct PutRepeaterRequest {
    id: String,
    lat: f64,
    lon: f64,
    name: String,
    #[serde(default)]
    elev: Option<f64>,
    #[serde(default)]
    time: Option<i64>,
}

async fn handle_put_repeater(
    State(state): State<AppState>,
    Json(req): Json<PutRepeaterRequest>,
) -> Result<Json<crate::models::Repeater>, AppError> {
    let time = req.time.unwrap_or_else(crate::geo::now_ms);
    repeaters::upsert(
        &state.pool,
        &req.id,
        req.lat,
        req.lon,
        &req.name,
        req.elev,
        time,
    )
    .await?;
    let row = repeaters::get_by_location(&state.pool, &req.id, req.lat, req.lon).await?;
    Ok(Json(row))
}

#[derive(Deserialize)]
struct LocationQuery {
    lat: f64,
    lon: f64,
}

async fn handle_delete_repeater(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<LocationQuery>,
) -> Result<StatusCode, AppError> {
    repeaters::delete_by_location(&state.pool, &id, q.lat, q.lon).await?;
    Ok(StatusCode::NO_CONTENT)
}
