use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use taskmarket_core::{DisputeResolution, KycStatus, MarketError, Milestone, User, WithdrawalRequest};
use uuid::Uuid;

use crate::auth::Admin;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct VerificationRequest {
    pub kyc_status: KycStatus,
    #[serde(default)]
    pub dojah_verified: Option<bool>,
}

pub async fn set_verification(
    State(state): State<AppState>,
    _admin: Admin,
    Path(user_id): Path<Uuid>,
    Json(req): Json<VerificationRequest>,
) -> ApiResult<Json<User>> {
    Ok(Json(state.market.set_verification(
        user_id,
        req.kyc_status,
        req.dojah_verified,
    )?))
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub resolution: DisputeResolution,
}

pub async fn resolve_dispute(
    State(state): State<AppState>,
    _admin: Admin,
    Path(milestone_id): Path<Uuid>,
    Json(req): Json<ResolveRequest>,
) -> ApiResult<Json<Milestone>> {
    Ok(Json(
        state.market.resolve_dispute(milestone_id, req.resolution)?,
    ))
}

pub async fn refund_milestone(
    State(state): State<AppState>,
    _admin: Admin,
    Path(milestone_id): Path<Uuid>,
) -> ApiResult<Json<Milestone>> {
    Ok(Json(state.market.refund_milestone(milestone_id)?))
}

pub async fn mark_processing(
    State(state): State<AppState>,
    _admin: Admin,
    Path(withdrawal_id): Path<Uuid>,
) -> ApiResult<Json<WithdrawalRequest>> {
    Ok(Json(
        state.market.mark_withdrawal_processing(withdrawal_id)?,
    ))
}

pub async fn complete_withdrawal(
    State(state): State<AppState>,
    _admin: Admin,
    Path(withdrawal_id): Path<Uuid>,
) -> ApiResult<Json<WithdrawalRequest>> {
    Ok(Json(state.market.complete_withdrawal(withdrawal_id)?))
}

#[derive(Debug, Deserialize)]
pub struct FailRequest {
    pub reason: String,
}

pub async fn fail_withdrawal(
    State(state): State<AppState>,
    _admin: Admin,
    Path(withdrawal_id): Path<Uuid>,
    Json(req): Json<FailRequest>,
) -> ApiResult<Json<WithdrawalRequest>> {
    Ok(Json(
        state.market.fail_withdrawal(withdrawal_id, &req.reason)?,
    ))
}

/// Sweep for an external scheduler; only enabled when `auto_release_days` is
/// configured.
pub async fn auto_release(State(state): State<AppState>, _admin: Admin) -> ApiResult<Json<Value>> {
    let Some(after) = state.config.auto_release_after() else {
        return Err(MarketError::Forbidden("auto-release is not enabled".to_string()).into());
    };
    let released = state.market.auto_release_due(Utc::now(), after)?;
    Ok(Json(json!({
        "released": released.len(),
        "milestones": released,
    })))
}
