use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::config::DrillConfig;
use crate::db::Db;
use crate::error::DrillError;
use crate::matrix::OptimalFactorMatrix;
use crate::models::DrillItem;
use crate::session::{DrillSession, PendingCounts, Presentation, SessionReport};
use crate::srs::format_interval;

/// Matrix plus the one active session. A single learner drills at a time.
pub struct Drill {
    pub matrix: OptimalFactorMatrix,
    pub session: Option<DrillSession>,
}

#[derive(Clone)]
pub struct ApiState {
    pub db: Db,
    pub config: Arc<DrillConfig>,
    pub drill: Arc<Mutex<Drill>>,
}

impl ApiState {
    pub fn new(db: Db, config: DrillConfig, matrix: OptimalFactorMatrix) -> Self {
        Self {
            db,
            config: Arc::new(config),
            drill: Arc::new(Mutex::new(Drill {
                matrix,
                session: None,
            })),
        }
    }
}

pub fn app_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/items", get(list_items).post(add_item))
        .route("/api/session", post(start_session))
        .route("/api/session/next", get(next_item))
        .route("/api/session/rate", post(rate_item))
        .route("/api/session/quit", post(quit_session))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub enum ApiError {
    NoSession,
    Drill(DrillError),
    Internal(anyhow::Error),
}

impl From<DrillError> for ApiError {
    fn from(err: DrillError) -> Self {
        ApiError::Drill(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NoSession => (StatusCode::NOT_FOUND, "no active session".to_string()).into_response(),
            ApiError::Drill(e @ (DrillError::NoItemInFlight | DrillError::SessionEnded)) => {
                (StatusCode::CONFLICT, e.to_string()).into_response()
            }
            ApiError::Drill(e) => (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()).into_response(),
            ApiError::Internal(e) => {
                log::error!("request failed: {:#}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
            }
        }
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Deserialize, Default)]
struct AddItemRequest {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct AddItemResponse {
    pub id: String,
}

async fn add_item(
    State(state): State<ApiState>,
    Json(payload): Json<AddItemRequest>,
) -> ApiResult<AddItemResponse> {
    let id = payload.id.unwrap_or_else(|| Uuid::new_v4().to_string());
    state.db.add_item(&id).await?;
    Ok(Json(AddItemResponse { id }))
}

async fn list_items(State(state): State<ApiState>) -> ApiResult<Vec<DrillItem>> {
    Ok(Json(state.db.load_items().await?))
}

#[derive(Deserialize, Default)]
struct StartRequest {
    #[serde(default)]
    cram: bool,
}

#[derive(Serialize, Deserialize)]
pub struct StartResponse {
    pub pending: PendingCounts,
    pub skipped_leeches: usize,
    pub skipped_invalid: usize,
}

async fn start_session(
    State(state): State<ApiState>,
    Json(payload): Json<StartRequest>,
) -> ApiResult<StartResponse> {
    let items = state.db.load_items().await?;
    let mut drill = state.drill.lock().await;

    // Starting over ends whatever was running.
    if let Some(previous) = drill.session.take() {
        previous.finish(Utc::now());
        state.db.save_matrix(&drill.matrix).await?;
    }

    let now = Utc::now();
    let session = DrillSession::new((*state.config).clone(), items, now, payload.cram)?;
    let report = session.report(now);
    drill.session = Some(session);
    Ok(Json(StartResponse {
        pending: report.pending,
        skipped_leeches: report.skipped_leeches,
        skipped_invalid: report.skipped_invalid,
    }))
}

#[derive(Serialize, Deserialize)]
pub struct NextResponse {
    pub presentation: Option<Presentation>,
    /// Set once the session has ended.
    pub report: Option<SessionReport>,
}

async fn next_item(State(state): State<ApiState>) -> ApiResult<NextResponse> {
    let mut drill = state.drill.lock().await;
    let now = Utc::now();
    let session = drill.session.as_mut().ok_or(ApiError::NoSession)?;

    if let Some(presentation) = session.next_item(now) {
        return Ok(Json(NextResponse {
            presentation: Some(presentation),
            report: None,
        }));
    }

    let report = drill
        .session
        .take()
        .map(|session| session.finish(now));
    state.db.save_matrix(&drill.matrix).await?;
    Ok(Json(NextResponse {
        presentation: None,
        report,
    }))
}

#[derive(Deserialize)]
struct RateRequest {
    quality: i32,
}

#[derive(Serialize, Deserialize)]
pub struct RateResponse {
    pub item: DrillItem,
    pub failed: bool,
    pub next_review: String,
}

async fn rate_item(
    State(state): State<ApiState>,
    Json(payload): Json<RateRequest>,
) -> ApiResult<RateResponse> {
    let mut drill = state.drill.lock().await;
    let Drill { matrix, session } = &mut *drill;
    let session = session.as_mut().ok_or(ApiError::NoSession)?;

    // Store first so a failed write leaves the rating uncommitted.
    let now = Utc::now();
    let scored = session.score(payload.quality, now, matrix)?;
    state.db.save_item(scored.item()).await?;
    let rated = session.commit(scored, now, matrix)?;

    Ok(Json(RateResponse {
        next_review: format_interval(rated.item.state.last_interval),
        failed: rated.failed,
        item: rated.item,
    }))
}

async fn quit_session(State(state): State<ApiState>) -> ApiResult<SessionReport> {
    let mut drill = state.drill.lock().await;
    let session = drill.session.take().ok_or(ApiError::NoSession)?;
    let report = session.finish(Utc::now());
    state.db.save_matrix(&drill.matrix).await?;
    Ok(Json(report))
}
