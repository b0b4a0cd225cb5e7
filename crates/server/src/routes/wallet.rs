use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use taskmarket_core::{BankAccount, FeeQuote, Kobo, NewBankAccount, WithdrawalRequest};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn get_wallet(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> ApiResult<Json<Value>> {
    let wallet = state.market.wallet(user_id)?;
    let withdrawals = state.market.withdrawals(user_id)?;
    Ok(Json(json!({
        "user_id": wallet.user_id,
        "balance": wallet.balance,
        "withdrawals": withdrawals,
    })))
}

pub async fn add_bank_account(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(input): Json<NewBankAccount>,
) -> ApiResult<(StatusCode, Json<BankAccount>)> {
    let account = state.market.add_bank_account(user_id, input)?;
    Ok((StatusCode::CREATED, Json(account)))
}

pub async fn list_bank_accounts(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> ApiResult<Json<Vec<BankAccount>>> {
    Ok(Json(state.market.bank_accounts(user_id)?))
}

pub async fn set_default(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(bank_account_id): Path<Uuid>,
) -> ApiResult<Json<BankAccount>> {
    Ok(Json(
        state
            .market
            .set_default_bank_account(user_id, bank_account_id)?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct QuoteParams {
    pub amount: Kobo,
}

pub async fn quote(
    State(state): State<AppState>,
    Query(params): Query<QuoteParams>,
) -> ApiResult<Json<FeeQuote>> {
    Ok(Json(state.market.quote_withdrawal(params.amount)?))
}

#[derive(Debug, Deserialize)]
pub struct WithdrawalBody {
    pub amount: Kobo,
    pub bank_account_id: Uuid,
    pub pin: String,
}

pub async fn request_withdrawal(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<WithdrawalBody>,
) -> ApiResult<(StatusCode, Json<WithdrawalRequest>)> {
    let withdrawal = state
        .blocking(move |market| {
            market.request_withdrawal(user_id, req.amount, req.bank_account_id, &req.pin)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(withdrawal)))
}

pub async fn cancel_withdrawal(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(withdrawal_id): Path<Uuid>,
) -> ApiResult<Json<WithdrawalRequest>> {
    Ok(Json(
        state.market.cancel_withdrawal(user_id, withdrawal_id)?,
    ))
}
