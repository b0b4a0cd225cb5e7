use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};
use taskmarket_core::{PAYSTACK_SIGNATURE_HEADER, YOUVERIFY_SIGNATURE_HEADER};

use crate::error::ApiResult;
use crate::state::AppState;

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Verified events are always acknowledged, applied or not, so the vendor
/// does not retry them.
fn received() -> Json<Value> {
    Json(json!({ "received": true }))
}

pub async fn youverify(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let outcome = state.market.handle_youverify_webhook(
        &state.config.youverify_secret,
        header(&headers, YOUVERIFY_SIGNATURE_HEADER),
        &body,
    )?;
    tracing::debug!(?outcome, "youverify webhook handled");
    Ok(received())
}

pub async fn paystack(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let outcome = state.market.handle_paystack_webhook(
        &state.config.paystack_secret,
        header(&headers, PAYSTACK_SIGNATURE_HEADER),
        &body,
    )?;
    tracing::debug!(?outcome, "paystack webhook handled");
    Ok(received())
}
