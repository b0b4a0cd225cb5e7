//! HTTP surface. Handlers are thin: extract, call the marketplace, render.

use axum::async_trait;
use axum::body::Bytes;
use axum::extract::{FromRequest, Request};
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use taskmarket_core::{MarketError, MilestoneStatus};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::state::AppState;

mod accounts;
mod admin;
mod escrow;
mod tasks;
mod wallet;
mod webhooks;

pub fn router(state: AppState) -> Router {
    let max_body_bytes = state.config.max_body_bytes;
    Router::new()
        .route("/health", get(health))
        .route("/api/auth/signup", post(accounts::signup))
        .route("/api/me", get(accounts::me))
        .route("/api/pin", get(accounts::pin_status))
        .route("/api/pin/setup", post(accounts::setup_pin))
        .route("/api/pin/change", post(accounts::change_pin))
        .route("/api/pin/verify", post(accounts::verify_pin))
        .route("/api/tasks", post(tasks::create_task))
        .route("/api/tasks/:id", get(tasks::get_task))
        .route("/api/tasks/:id/publish", post(tasks::publish_task))
        .route("/api/tasks/:id/cancel", post(tasks::cancel_task))
        .route("/api/tasks/:id/applications", post(tasks::apply))
        .route("/api/applications/:id/shortlist", post(tasks::shortlist))
        .route("/api/applications/:id/accept", post(tasks::accept))
        .route("/api/applications/:id/reject", post(tasks::reject))
        .route("/api/applications/:id/withdraw", post(tasks::withdraw))
        .route(
            "/api/tasks/:id/escrow",
            post(escrow::initialize).get(escrow::get_escrow),
        )
        .route("/api/milestones/:id/complete", post(escrow::complete))
        .route("/api/milestones/:id/approve", post(escrow::approve))
        .route("/api/milestones/:id/dispute", post(escrow::dispute))
        .route("/api/wallet", get(wallet::get_wallet))
        .route(
            "/api/bank-accounts",
            post(wallet::add_bank_account).get(wallet::list_bank_accounts),
        )
        .route("/api/bank-accounts/:id/default", post(wallet::set_default))
        .route("/api/withdrawals/quote", get(wallet::quote))
        .route("/api/withdrawals", post(wallet::request_withdrawal))
        .route("/api/withdrawals/:id/cancel", post(wallet::cancel_withdrawal))
        .route("/api/webhooks/youverify", post(webhooks::youverify))
        .route("/api/webhooks/paystack", post(webhooks::paystack))
        .route(
            "/api/admin/users/:id/verification",
            post(admin::set_verification),
        )
        .route("/api/admin/milestones/:id/resolve", post(admin::resolve_dispute))
        .route("/api/admin/milestones/:id/refund", post(admin::refund_milestone))
        .route(
            "/api/admin/withdrawals/:id/processing",
            post(admin::mark_processing),
        )
        .route("/api/admin/withdrawals/:id/complete", post(admin::complete_withdrawal))
        .route("/api/admin/withdrawals/:id/fail", post(admin::fail_withdrawal))
        .route("/api/admin/escrow/auto-release", post(admin::auto_release))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExpectedStatus {
    expected_status: Option<MilestoneStatus>,
}

/// Optional precondition for milestone actions: the status the caller last
/// saw. Only an empty body means "none"; any other body must be JSON naming a
/// known status, or the request is refused.
#[derive(Debug, Default, Clone, Copy)]
pub struct Precondition(pub Option<MilestoneStatus>);

#[async_trait]
impl<S: Send + Sync> FromRequest<S> for Precondition {
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/json"));
        let body = Bytes::from_request(req, state)
            .await
            .map_err(IntoResponse::into_response)?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Precondition(None));
        }
        if !is_json {
            return Err(invalid_precondition("body must be application/json"));
        }
        serde_json::from_slice::<ExpectedStatus>(&body)
            .map(|b| Precondition(b.expected_status))
            .map_err(|e| invalid_precondition(&e.to_string()))
    }
}

fn invalid_precondition(detail: &str) -> Response {
    ApiError::from(MarketError::Validation(format!(
        "invalid expected_status body: {detail}"
    )))
    .into_response()
}
