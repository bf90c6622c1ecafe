//! Routes acting on the authenticated caller's account.
//!
//! The source of every transfer and the target of every top-up is the
//! account in the bearer token; request bodies cannot name another one.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::time::Instant;

use crate::{
    AppState,
    error::ApiError,
    extract::{JsonBody, QueryParams},
    middleware::AuthAccount,
    routes::accounts::AccountResponse,
};
use tally_core::ledger::{AccountStore, MutationParams, TransferRequest};
use tally_db::AccountRepository;
use tally_shared::types::{AccountId, CategoryId};

/// Creates the ledger routes (requires auth middleware to be applied externally).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/account/me", get(get_me))
        .route("/account/balance", get(get_balance))
        .route("/account/top-up", post(top_up))
        .route("/account/transfer", post(transfer))
        .route("/account/mutations", get(list_mutations))
}

/// Request body for a top-up.
#[derive(Debug, Deserialize)]
pub struct TopUpRequest {
    /// Amount in minor units, must be positive.
    pub amount: i64,
}

/// Request body for a transfer from the caller's account.
#[derive(Debug, Deserialize)]
pub struct TransferBody {
    /// Destination account.
    pub to_account_id: AccountId,
    /// Amount in minor units, must be positive.
    pub amount: i64,
    /// Optional category.
    #[serde(default)]
    pub category_id: Option<CategoryId>,
}

/// Balance of the caller's account.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// Account ID.
    pub account_id: AccountId,
    /// Balance in minor units.
    pub balance: i64,
}

/// GET `/account/me` - The caller's account.
async fn get_me(
    State(state): State<AppState>,
    auth: AuthAccount,
) -> Result<impl IntoResponse, ApiError> {
    let repo = AccountRepository::new((*state.db).clone());
    let account = repo.get_account(auth.account_id()).await?;
    Ok(Json(AccountResponse::from(account)))
}

/// GET `/account/balance` - The caller's balance.
async fn get_balance(
    State(state): State<AppState>,
    auth: AuthAccount,
) -> Result<impl IntoResponse, ApiError> {
    let account = state.engine.store().get_by_id(auth.account_id()).await?;
    Ok(Json(BalanceResponse {
        account_id: account.id,
        balance: account.balance,
    }))
}

/// POST `/account/top-up` - Credit the caller's account.
async fn top_up(
    State(state): State<AppState>,
    auth: AuthAccount,
    JsonBody(payload): JsonBody<TopUpRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let account_id = auth.account_id();
    let balance = state.engine.top_up(account_id, payload.amount).await?;
    Ok(Json(BalanceResponse {
        account_id,
        balance,
    }))
}

/// POST `/account/transfer` - Move funds from the caller's account.
async fn transfer(
    State(state): State<AppState>,
    auth: AuthAccount,
    JsonBody(payload): JsonBody<TransferBody>,
) -> Result<impl IntoResponse, ApiError> {
    let request = TransferRequest {
        from_account_id: auth.account_id(),
        to_account_id: payload.to_account_id,
        amount: payload.amount,
        category_id: payload.category_id,
    };
    let deadline = Instant::now() + state.request_timeout;

    let record = state.engine.transfer_before(request, deadline).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET `/account/mutations` - The caller's transfer history, most recent first.
///
/// Query: `start_date`, `end_date` (`YYYY-MM-DD` or RFC 3339, inclusive), `limit`.
async fn list_mutations(
    State(state): State<AppState>,
    auth: AuthAccount,
    QueryParams(params): QueryParams<MutationParams>,
) -> Result<impl IntoResponse, ApiError> {
    let deadline = Instant::now() + state.request_timeout;
    let mutations = state
        .mutations
        .list_before(auth.account_id(), &params, deadline)
        .await?;

    Ok(Json(json!({ "mutations": mutations })))
}
