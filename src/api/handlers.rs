//! Route handlers. Each one parses its input, calls the orchestrator and
//! wraps the result in `ApiResponse`; errors map through `CoreError`.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::response::ApiResponse;
use super::state::AppState;
use crate::audit::AuditEvent;
use crate::case::{Case, CaseStatus, NewCase};
use crate::core_types::{Actor, CaseId, OfferId, UserId};
use crate::error::CoreError;
use crate::offer::{Offer, SweepReport};
use crate::payment::{Payment, WebhookOutcome};

type ApiResult<T> = Result<Json<ApiResponse<T>>, CoreError>;

fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::success(data)))
}

fn parse_id<T: FromStr>(raw: &str, what: &str) -> Result<T, CoreError> {
    raw.parse()
        .map_err(|_| CoreError::validation(format!("Invalid {} id: {}", what, raw)))
}

// ============================================================================
// Request / response bodies
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub provider_id: u64,
}

#[derive(Debug, Deserialize)]
pub struct SolutionRequest {
    pub note: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitOfferRequest {
    pub proposed_fee: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub order_id: String,
    pub payment_id: String,
    pub signature: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub git_hash: &'static str,
    pub timestamp_ms: i64,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

// ============================================================================
// System
// ============================================================================

pub async fn health() -> Json<ApiResponse<HealthResponse>> {
    Json(ApiResponse::success(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        git_hash: env!("GIT_HASH"),
        timestamp_ms: Utc::now().timestamp_millis(),
    }))
}

// ============================================================================
// Cases
// ============================================================================

pub async fn create_case(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Json(input): Json<NewCase>,
) -> Result<(StatusCode, Json<ApiResponse<Case>>), CoreError> {
    let case = state.orchestrator.create_case(&actor, input).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(case))))
}

pub async fn get_case(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> ApiResult<Case> {
    let case_id: CaseId = parse_id(&id, "case")?;
    ok(state.orchestrator.get_case(case_id, &actor).await?)
}

pub async fn publish(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> ApiResult<Case> {
    let case_id: CaseId = parse_id(&id, "case")?;
    ok(state.orchestrator.publish(case_id, &actor).await?)
}

pub async fn update_status(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(req): Json<StatusRequest>,
) -> ApiResult<Case> {
    let case_id: CaseId = parse_id(&id, "case")?;
    let status: CaseStatus = req.status.parse().map_err(CoreError::Validation)?;
    ok(state.orchestrator.update_status(case_id, status, &actor).await?)
}

pub async fn assign_direct(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(req): Json<AssignRequest>,
) -> ApiResult<Case> {
    let case_id: CaseId = parse_id(&id, "case")?;
    ok(state
        .orchestrator
        .assign_direct(case_id, UserId(req.provider_id), &actor)
        .await?)
}

pub async fn decline_assignment(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> ApiResult<Case> {
    let case_id: CaseId = parse_id(&id, "case")?;
    ok(state.orchestrator.decline_assignment(case_id, &actor).await?)
}

pub async fn record_solution_update(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(req): Json<SolutionRequest>,
) -> ApiResult<Case> {
    let case_id: CaseId = parse_id(&id, "case")?;
    ok(state
        .orchestrator
        .record_solution_update(case_id, &req.note, &actor)
        .await?)
}

pub async fn soft_delete(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> ApiResult<Case> {
    let case_id: CaseId = parse_id(&id, "case")?;
    ok(state.orchestrator.soft_delete(case_id, &actor).await?)
}

pub async fn timeline(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> ApiResult<Vec<AuditEvent>> {
    let case_id: CaseId = parse_id(&id, "case")?;
    ok(state.orchestrator.timeline(case_id, &actor).await?)
}

// ============================================================================
// Offers
// ============================================================================

pub async fn list_offers(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> ApiResult<Vec<Offer>> {
    let case_id: CaseId = parse_id(&id, "case")?;
    ok(state.orchestrator.list_offers(case_id, &actor).await?)
}

pub async fn submit_offer(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(req): Json<SubmitOfferRequest>,
) -> ApiResult<Offer> {
    let case_id: CaseId = parse_id(&id, "case")?;
    ok(state
        .orchestrator
        .submit_offer(case_id, req.proposed_fee, &actor)
        .await?)
}

pub async fn accept_offer(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> ApiResult<Offer> {
    let offer_id: OfferId = parse_id(&id, "offer")?;
    ok(state.orchestrator.accept_offer(offer_id, &actor).await?)
}

pub async fn withdraw_offer(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> ApiResult<Offer> {
    let offer_id: OfferId = parse_id(&id, "offer")?;
    ok(state.orchestrator.withdraw_offer(offer_id, &actor).await?)
}

pub async fn sweep_offers(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<SweepReport> {
    ok(state
        .orchestrator
        .sweep_expired_offers(&actor, Utc::now())
        .await?)
}

// ============================================================================
// Payments
// ============================================================================

pub async fn create_order(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> ApiResult<Payment> {
    let case_id: CaseId = parse_id(&id, "case")?;
    ok(state.orchestrator.create_order(case_id, &actor).await?)
}

pub async fn verify_payment(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<VerifyRequest>,
) -> ApiResult<Payment> {
    ok(state
        .orchestrator
        .verify_payment(&req.order_id, &req.payment_id, &req.signature, &actor)
        .await?)
}

/// Gateway callback. Always answers 200 so the gateway never retries on
/// our internal failures; the outcome is only logged.
pub async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<ApiResponse<WebhookAck>>) {
    let signature = headers
        .get(state.webhook_header.as_str())
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let outcome = state.orchestrator.handle_webhook(&body, signature).await;
    if !matches!(outcome, WebhookOutcome::Applied | WebhookOutcome::Duplicate) {
        tracing::info!(outcome = ?outcome, "Webhook not applied");
    }
    (
        StatusCode::OK,
        Json(ApiResponse::success(WebhookAck { received: true })),
    )
}
