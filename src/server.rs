//! HTTP surface: the two pre-check-in endpoints plus a health probe.
//!
//! Authentication/authorization happens upstream; by the time a request
//! reaches these handlers the caller is already an authorized user.

use crate::db::{self, Operator, Pool};
use crate::listing::{parse_listing, FetchError, ListingSource};
use crate::model::{BatchItemError, BatchItemResult, RawParticipantCandidate};
use crate::pipeline::{BatchProcessor, ProcessError};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

/// Shared application context passed to all handlers.
#[derive(Clone)]
pub struct AppContext {
    pub pool: Pool,
    pub listing: Arc<dyn ListingSource>,
    pub processor: Arc<BatchProcessor>,
    /// Display-only description of where the listing came from.
    pub listing_source: String,
}

pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/pre-checkin", get(get_pre_checkin))
        .route("/pre-checkin/process", post(process_pre_checkin))
        .with_state(ctx)
}

pub async fn run(bind_addr: &str, ctx: AppContext) -> anyhow::Result<()> {
    let addr: SocketAddr = bind_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "http server listening");
    axum::serve(listener, router(ctx)).await?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// A parsed candidate decorated for display with whatever the operator
/// table already knows about the call sign.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PreCheckinRow {
    #[serde(flatten)]
    candidate: RawParticipantCandidate,
    has_operator_record: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    operator_info: Option<Operator>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PreCheckinResponse {
    participants: Vec<PreCheckinRow>,
    fetched_at: DateTime<Utc>,
    source: String,
}

async fn get_pre_checkin(
    State(ctx): State<AppContext>,
) -> Result<Json<PreCheckinResponse>, ApiError> {
    let raw = ctx.listing.fetch().await?;
    let candidates = parse_listing(&raw);

    let mut participants = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let operator_info = db::find_operator_by_call(&ctx.pool, &candidate.call_sign)
            .await
            .map_err(ApiError::Internal)?;
        participants.push(PreCheckinRow {
            has_operator_record: operator_info.is_some(),
            operator_info,
            candidate,
        });
    }

    Ok(Json(PreCheckinResponse {
        participants,
        fetched_at: Utc::now(),
        source: ctx.listing_source.clone(),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProcessRequest {
    participants: Vec<RawParticipantCandidate>,
    session_id: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProcessResponse {
    success: bool,
    processed: usize,
    error_count: usize,
    results: Vec<BatchItemResult>,
    errors: Vec<BatchItemError>,
}

async fn process_pre_checkin(
    State(ctx): State<AppContext>,
    Json(req): Json<ProcessRequest>,
) -> Result<Json<ProcessResponse>, ApiError> {
    let outcome = ctx
        .processor
        .process_batch(req.participants, req.session_id)
        .await?;
    Ok(Json(ProcessResponse {
        success: true,
        processed: outcome.results.len(),
        error_count: outcome.errors.len(),
        results: outcome.results,
        errors: outcome.errors,
    }))
}

#[derive(Debug)]
enum ApiError {
    BadRequest(String),
    Upstream(String),
    Internal(anyhow::Error),
}

impl From<FetchError> for ApiError {
    fn from(err: FetchError) -> Self {
        ApiError::Upstream(err.to_string())
    }
}

impl From<ProcessError> for ApiError {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::Validation(msg) => ApiError::BadRequest(msg),
            ProcessError::Internal(err) => ApiError::Internal(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::Internal(err) => {
                error!(?err, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".into())
            }
        };
        (status, Json(json!({ "success": false, "error": message }))).into_response()
    }
}
