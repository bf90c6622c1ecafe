//! Account management routes.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::{
    AppState,
    error::ApiError,
    extract::{JsonBody, PathParam},
};
use tally_db::{AccountRepository, entities::accounts};
use tally_shared::types::AccountId;

/// Creates the account routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/accounts", get(list_accounts).post(create_account))
        .route(
            "/accounts/{account_id}",
            get(get_account).patch(rename_account).delete(delete_account),
        )
}

/// Request body for creating an account.
#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    /// Account name.
    pub name: String,
}

/// Request body for renaming an account.
#[derive(Debug, Deserialize)]
pub struct UpdateAccountRequest {
    /// New account name.
    pub name: String,
}

/// Response for an account.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    /// Account ID.
    pub id: i64,
    /// Account name.
    pub name: String,
    /// Current balance in minor units.
    pub balance: i64,
    /// Creation timestamp.
    pub created_at: String,
    /// Last update timestamp.
    pub updated_at: String,
}

impl From<accounts::Model> for AccountResponse {
    fn from(model: accounts::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            balance: model.balance,
            created_at: model.created_at.to_rfc3339(),
            updated_at: model.updated_at.to_rfc3339(),
        }
    }
}

/// GET `/accounts` - List accounts.
async fn list_accounts(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let repo = AccountRepository::new((*state.db).clone());
    let accounts: Vec<AccountResponse> = repo
        .list_accounts()
        .await?
        .into_iter()
        .map(AccountResponse::from)
        .collect();

    Ok(Json(json!({ "accounts": accounts })))
}

/// POST `/accounts` - Create an account with a zero balance.
async fn create_account(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CreateAccountRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let repo = AccountRepository::new((*state.db).clone());
    let account = repo.create_account(&payload.name).await?;

    info!(account_id = account.id, "Account created");
    Ok((StatusCode::CREATED, Json(AccountResponse::from(account))))
}

/// GET `/accounts/{account_id}` - Get an account.
async fn get_account(
    State(state): State<AppState>,
    PathParam(account_id): PathParam<AccountId>,
) -> Result<impl IntoResponse, ApiError> {
    let repo = AccountRepository::new((*state.db).clone());
    let account = repo.get_account(account_id).await?;
    Ok(Json(AccountResponse::from(account)))
}

/// PATCH `/accounts/{account_id}` - Rename an account.
async fn rename_account(
    State(state): State<AppState>,
    PathParam(account_id): PathParam<AccountId>,
    JsonBody(payload): JsonBody<UpdateAccountRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let repo = AccountRepository::new((*state.db).clone());
    let account = repo.rename_account(account_id, &payload.name).await?;
    Ok(Json(AccountResponse::from(account)))
}

/// DELETE `/accounts/{account_id}` - Delete an account no transfer references.
async fn delete_account(
    State(state): State<AppState>,
    PathParam(account_id): PathParam<AccountId>,
) -> Result<impl IntoResponse, ApiError> {
    let repo = AccountRepository::new((*state.db).clone());
    repo.delete_account(account_id).await?;

    info!(%account_id, "Account deleted");
    Ok(StatusCode::NO_CONTENT)
}
