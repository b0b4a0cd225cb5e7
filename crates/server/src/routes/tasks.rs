use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use taskmarket_core::{Application, Kobo, NewTask, Task};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn create_task(
    State(state): State<AppState>,
    CurrentUser(client_id): CurrentUser,
    Json(input): Json<NewTask>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    let task = state.market.create_task(client_id, input)?;
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn get_task(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<Task>> {
    Ok(Json(state.market.task(task_id)?))
}

pub async fn publish_task(
    State(state): State<AppState>,
    CurrentUser(client_id): CurrentUser,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<Task>> {
    Ok(Json(state.market.publish_task(client_id, task_id)?))
}

pub async fn cancel_task(
    State(state): State<AppState>,
    CurrentUser(client_id): CurrentUser,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<Task>> {
    Ok(Json(state.market.cancel_task(client_id, task_id)?))
}

#[derive(Debug, Deserialize)]
pub struct ApplyRequest {
    pub proposed_budget: Kobo,
    #[serde(default)]
    pub cover_letter: Option<String>,
}

pub async fn apply(
    State(state): State<AppState>,
    CurrentUser(freelancer_id): CurrentUser,
    Path(task_id): Path<Uuid>,
    Json(req): Json<ApplyRequest>,
) -> ApiResult<(StatusCode, Json<Application>)> {
    let application =
        state
            .market
            .apply(freelancer_id, task_id, req.proposed_budget, req.cover_letter)?;
    Ok((StatusCode::CREATED, Json(application)))
}

pub async fn shortlist(
    State(state): State<AppState>,
    CurrentUser(client_id): CurrentUser,
    Path(application_id): Path<Uuid>,
) -> ApiResult<Json<Application>> {
    Ok(Json(
        state
            .market
            .shortlist_application(client_id, application_id)?,
    ))
}

pub async fn accept(
    State(state): State<AppState>,
    CurrentUser(client_id): CurrentUser,
    Path(application_id): Path<Uuid>,
) -> ApiResult<Json<Application>> {
    Ok(Json(
        state.market.accept_application(client_id, application_id)?,
    ))
}

pub async fn reject(
    State(state): State<AppState>,
    CurrentUser(client_id): CurrentUser,
    Path(application_id): Path<Uuid>,
) -> ApiResult<Json<Application>> {
    Ok(Json(
        state.market.reject_application(client_id, application_id)?,
    ))
}

pub async fn withdraw(
    State(state): State<AppState>,
    CurrentUser(freelancer_id): CurrentUser,
    Path(application_id): Path<Uuid>,
) -> ApiResult<Json<Application>> {
    Ok(Json(
        state
            .market
            .withdraw_application(freelancer_id, application_id)?,
    ))
}
