use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use taskmarket_core::{MarketError, User, UserType};

use crate::auth::CurrentUser;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub user_type: UserType,
}

pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let user = state.market.signup(&req.email, req.user_type)?;
    let token = state.sessions.issue(user.id);
    Ok((StatusCode::CREATED, Json(json!({ "user": user, "token": token }))))
}

pub async fn me(State(state): State<AppState>, CurrentUser(user_id): CurrentUser) -> ApiResult<Json<User>> {
    Ok(Json(state.market.user(user_id)?))
}

pub async fn pin_status(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> ApiResult<Json<Value>> {
    let configured = state.market.has_pin(user_id)?;
    Ok(Json(json!({ "configured": configured })))
}

#[derive(Debug, Deserialize)]
pub struct PinRequest {
    pub pin: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePinRequest {
    pub current_pin: String,
    pub new_pin: String,
}

pub async fn setup_pin(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<PinRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    state
        .blocking(move |market| market.setup_pin(user_id, &req.pin))
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "configured": true }))))
}

pub async fn change_pin(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<ChangePinRequest>,
) -> ApiResult<Json<Value>> {
    state
        .blocking(move |market| market.change_pin(user_id, &req.current_pin, &req.new_pin))
        .await?;
    Ok(Json(json!({ "changed": true })))
}

/// Wrong and missing PINs are reported the same way.
pub async fn verify_pin(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<PinRequest>,
) -> ApiResult<Json<Value>> {
    if req.pin.is_empty() {
        return Err(MarketError::PinRejected.into());
    }
    state
        .blocking(move |market| market.require_pin(user_id, &req.pin))
        .await?;
    Ok(Json(json!({ "verified": true })))
}
