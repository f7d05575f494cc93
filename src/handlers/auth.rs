use axum::{extract::State, response::IntoResponse, Extension, Json};
use chrono::Utc;

use crate::error::AppError;
use crate::ids::is_valid_account_number;
use crate::middleware::auth::AuthAccount;
use crate::models::account::{TokenRequest, TokenResponse, WwwAuthTokenResponse};
use crate::token::{generate_www_auth_token, issue_token};
use crate::util::log_prefix;
use crate::AppState;

/// POST /auth/v1/token: exchange an account number for an access token.
pub async fn create_token(
    State(state): State<AppState>,
    Json(body): Json<TokenRequest>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!(
        handler = "create_token",
        account = %log_prefix(&body.account_number),
        "Handler: POST /auth/v1/token"
    );

    if !is_valid_account_number(&body.account_number) {
        return Err(AppError::Unauthorized("Unknown or inactive account".into()));
    }

    let issued = issue_token(state.repo.as_ref(), &body.account_number, Utc::now()).await?;

    tracing::info!(
        handler = "create_token",
        account = %log_prefix(&body.account_number),
        status = 200,
        "Responding: access token issued"
    );

    Ok(Json(TokenResponse {
        expiry: issued.formatted_expiry(),
        access_token: issued.token.as_str().to_string(),
    }))
}

/// POST /app/v1/www-auth-token: one-off token for logging into the web site.
pub async fn create_www_auth_token(
    Extension(AuthAccount(account_number)): Extension<AuthAccount>,
) -> impl IntoResponse {
    tracing::info!(
        handler = "create_www_auth_token",
        account = %log_prefix(&account_number),
        "Handler: POST /app/v1/www-auth-token"
    );

    Json(WwwAuthTokenResponse {
        auth_token: generate_www_auth_token(),
    })
}
