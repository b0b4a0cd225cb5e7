use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use taskmarket_core::{EscrowView, MarketError, Milestone, MilestoneInput, MilestoneStatus};
use uuid::Uuid;

use super::Precondition;
use crate::auth::CurrentUser;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct FundRequest {
    pub milestones: Vec<MilestoneInput>,
}

/// Creates the pending escrow; the returned reference and `total_charge` are
/// what the client pays through the payment provider.
pub async fn initialize(
    State(state): State<AppState>,
    CurrentUser(client_id): CurrentUser,
    Path(task_id): Path<Uuid>,
    Json(req): Json<FundRequest>,
) -> ApiResult<(StatusCode, Json<EscrowView>)> {
    let view = state
        .market
        .initialize_funding(client_id, task_id, req.milestones)?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn get_escrow(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<EscrowView>> {
    let view = state.market.escrow_for_task(task_id)?;
    if user_id != view.escrow.client_id && user_id != view.escrow.freelancer_id {
        return Err(MarketError::Forbidden("not a party to this escrow".to_string()).into());
    }
    Ok(Json(view))
}

pub async fn complete(
    State(state): State<AppState>,
    CurrentUser(freelancer_id): CurrentUser,
    Path(milestone_id): Path<Uuid>,
    Precondition(expected): Precondition,
) -> ApiResult<Json<Milestone>> {
    Ok(Json(state.market.complete_milestone(
        freelancer_id,
        milestone_id,
        expected,
    )?))
}

/// Client sign-off: approves and releases in one step.
pub async fn approve(
    State(state): State<AppState>,
    CurrentUser(client_id): CurrentUser,
    Path(milestone_id): Path<Uuid>,
    Precondition(expected): Precondition,
) -> ApiResult<Json<Milestone>> {
    Ok(Json(state.market.approve_and_release(
        client_id,
        milestone_id,
        expected,
    )?))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DisputeRequest {
    pub reason: String,
    #[serde(default)]
    pub expected_status: Option<MilestoneStatus>,
}

pub async fn dispute(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(milestone_id): Path<Uuid>,
    Json(req): Json<DisputeRequest>,
) -> ApiResult<Json<Milestone>> {
    Ok(Json(state.market.dispute_milestone(
        user_id,
        milestone_id,
        &req.reason,
        req.expected_status,
    )?))
}
