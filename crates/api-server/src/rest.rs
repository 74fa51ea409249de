//! REST API handlers for personalization, lead intelligence batches and
//! operational endpoints.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use leadflow_core::error::LeadflowError;
use leadflow_core::stores::EventStore;
use leadflow_core::types::{
    ChurnBatch, EventPayload, EventType, Interaction, LtvEstimate, PropensityResult,
};
use leadflow_intelligence::{ChurnPredictor, LeadScorer, LtvEstimator};
use leadflow_personalization::{MaestroHandle, PersonalizationResolver, Resolution};

/// Maximum identifier length (brand ID, lead ID, cursor).
const MAX_FIELD_LEN: usize = 256;

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<PersonalizationResolver>,
    pub churn: Arc<ChurnPredictor>,
    pub ltv: Arc<LtvEstimator>,
    pub scorer: LeadScorer,
    pub events: Arc<dyn EventStore>,
    pub maestro: MaestroHandle,
    pub node_id: String,
    pub start_time: Instant,
}

type ApiResult<T> = Result<T, (StatusCode, Json<ErrorResponse>)>;

fn bad_request(message: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    metrics::counter!("api.validation_errors").increment(1);
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: "invalid_request".to_string(),
            message: message.into(),
        }),
    )
}

/// Map an engine error: caller mistakes are 400, everything else 500.
fn engine_error(e: LeadflowError, operation: &'static str) -> (StatusCode, Json<ErrorResponse>) {
    if e.is_validation() {
        warn!(error = %e, operation, "Request rejected");
        return bad_request(e.to_string());
    }
    error!(error = %e, operation, "Request failed");
    metrics::counter!("api.errors").increment(1);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: format!("{operation}_failed"),
            message: "Internal processing error".to_string(),
        }),
    )
}

/// Validate a required identifier at the API boundary.
fn require_id<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str, String> {
    match value.map(str::trim) {
        None | Some("") => Err(format!("'{field}' is required")),
        Some(v) if v.len() > MAX_FIELD_LEN => Err(format!("'{field}' exceeds maximum length")),
        Some(v) => Ok(v),
    }
}

// ─── Personalization ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
    #[serde(default)]
    pub brand_id: Option<String>,
    #[serde(default)]
    pub lead_id: Option<String>,
}

/// POST /v1/personalization/resolve — Content variations for a lead.
pub async fn handle_resolve(
    State(state): State<AppState>,
    payload: Result<Json<ResolveRequest>, JsonRejection>,
) -> ApiResult<Json<Resolution>> {
    let Json(request) = payload.map_err(|e| bad_request(e.body_text()))?;
    let brand_id = require_id(request.brand_id.as_deref(), "brandId").map_err(bad_request)?;
    let lead_id = require_id(request.lead_id.as_deref(), "leadId").map_err(bad_request)?;

    state
        .resolver
        .resolve(brand_id, lead_id)
        .await
        .map(Json)
        .map_err(|e| engine_error(e, "resolve"))
}

// ─── Interactions ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionRequest {
    #[serde(default)]
    pub brand_id: Option<String>,
    #[serde(default)]
    pub lead_id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub platform: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub payload: Option<EventPayload>,
    #[serde(default)]
    pub content_ref: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InteractionAccepted {
    pub recorded: bool,
    pub queued: bool,
}

/// POST /v1/interactions — Record an interaction and hand it to the Maestro.
///
/// The event is appended before returning; lead-state updates happen in the
/// background.
pub async fn handle_interaction(
    State(state): State<AppState>,
    payload: Result<Json<InteractionRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<InteractionAccepted>)> {
    let Json(request) = payload.map_err(|e| bad_request(e.body_text()))?;
    let brand_id = require_id(request.brand_id.as_deref(), "brandId").map_err(bad_request)?;
    let lead_id = require_id(request.lead_id.as_deref(), "leadId").map_err(bad_request)?;
    if request.platform.trim().is_empty() {
        return Err(bad_request("'platform' is required"));
    }

    let interaction = Interaction {
        brand_id: brand_id.to_string(),
        lead_id: lead_id.to_string(),
        event_type: request.event_type,
        platform: request.platform,
        timestamp: request.timestamp.unwrap_or_else(Utc::now),
        payload: request.payload,
        content_ref: request.content_ref,
        tags: request.tags,
    };

    state
        .events
        .append_event(brand_id, lead_id, interaction.to_event())
        .await
        .map_err(|e| engine_error(e, "record_interaction"))?;

    let queued = state.maestro.dispatch(interaction);
    Ok((
        StatusCode::ACCEPTED,
        Json(InteractionAccepted {
            recorded: true,
            queued,
        }),
    ))
}

// ─── Lead Intelligence ──────────────────────────────────────────────────

/// POST /v1/brands/:brand_id/leads/:lead_id/propensity — Recompute and persist.
pub async fn handle_refresh_propensity(
    State(state): State<AppState>,
    Path((brand_id, lead_id)): Path<(String, String)>,
) -> ApiResult<Json<PropensityResult>> {
    let brand_id = require_id(Some(brand_id.as_str()), "brandId").map_err(bad_request)?;
    let lead_id = require_id(Some(lead_id.as_str()), "leadId").map_err(bad_request)?;

    match state.scorer.refresh(brand_id, lead_id).await {
        Ok(Some(result)) => Ok(Json(result)),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "lead_not_found".to_string(),
                message: format!("lead '{lead_id}' not found"),
            }),
        )),
        Err(e) => Err(engine_error(e, "propensity")),
    }
}

#[derive(Debug, Deserialize)]
pub struct ChurnQuery {
    #[serde(default)]
    pub cursor: Option<String>,
}

/// POST /v1/brands/:brand_id/churn/predict — One page of churn predictions.
pub async fn handle_predict_churn(
    State(state): State<AppState>,
    Path(brand_id): Path<String>,
    Query(query): Query<ChurnQuery>,
) -> ApiResult<Json<ChurnBatch>> {
    let brand_id = require_id(Some(brand_id.as_str()), "brandId").map_err(bad_request)?;
    if query.cursor.as_ref().is_some_and(|c| c.len() > MAX_FIELD_LEN) {
        return Err(bad_request("'cursor' exceeds maximum length"));
    }

    state
        .churn
        .predict_batch(brand_id, query.cursor.as_deref())
        .await
        .map(Json)
        .map_err(|e| engine_error(e, "churn"))
}

/// POST /v1/brands/:brand_id/ltv/estimate — Cohort LTV projection.
pub async fn handle_estimate_ltv(
    State(state): State<AppState>,
    Path(brand_id): Path<String>,
) -> ApiResult<Json<LtvEstimate>> {
    let brand_id = require_id(Some(brand_id.as_str()), "brandId").map_err(bad_request)?;

    state
        .ltv
        .estimate_batch(brand_id)
        .await
        .map(Json)
        .map_err(|e| engine_error(e, "ltv"))
}

// ─── Operational ────────────────────────────────────────────────────────

/// GET /health — Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /ready — Readiness probe.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    if state.maestro.is_closed() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    }
}

/// GET /live — Liveness probe.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
}
