use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};

use crate::error::AppError;
use crate::middleware::auth::AuthAccount;
use crate::models::account::{AccountSummary, CreateAccountResponse};
use crate::provisioning::register_account;
use crate::util::{log_prefix, now_secs};
use crate::AppState;

/// POST /accounts/v1/accounts: create a new account under a random number.
pub async fn create_account(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    tracing::info!(handler = "create_account", "Handler: POST /accounts/v1/accounts");

    let now = now_secs();
    let account = register_account(state.repo.as_ref(), state.max_devices, now).await?;

    tracing::info!(
        handler = "create_account",
        account = %log_prefix(&account.account_number),
        status = 201,
        "Responding: account created"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateAccountResponse::new(&account, now)),
    ))
}

/// GET /accounts/v1/accounts/me: summary of the authenticated account.
pub async fn get_me(
    State(state): State<AppState>,
    Extension(AuthAccount(account_number)): Extension<AuthAccount>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!(
        handler = "get_me",
        account = %log_prefix(&account_number),
        "Handler: GET /accounts/v1/accounts/me"
    );

    let account = state
        .repo
        .find_account(&account_number)
        .await?
        .ok_or_else(|| AppError::NotFound("Account not found".into()))?;
    let device_count = state.repo.count_devices(&account_number).await?;

    Ok(Json(AccountSummary::new(&account, device_count, now_secs())))
}
