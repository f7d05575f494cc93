use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::token::authenticate;
use crate::util::log_prefix;
use crate::AppState;

/// Resolve the `Authorization: Bearer <token>` header to an account.
/// Missing credential is 401, an unknown or malformed token is 403.
/// On success the account is available to handlers as [`AuthAccount`].
pub async fn require_bearer_token(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let method = req.method().clone();
    let uri = req.uri().path().to_string();

    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    match authenticate(state.repo.as_ref(), header.as_deref()).await {
        Ok(account) => {
            tracing::debug!(
                account = %log_prefix(&account.account_number),
                method = %method,
                uri = %uri,
                "Auth middleware: token valid, forwarding to handler"
            );
            req.extensions_mut().insert(AuthAccount(account.account_number));
            next.run(req).await
        }
        Err(e) => {
            tracing::warn!(
                method = %method,
                uri = %uri,
                error = %e,
                "Auth middleware: rejected"
            );
            e.into_response()
        }
    }
}

/// Extractor for the account number resolved from the bearer token.
#[derive(Debug, Clone)]
pub struct AuthAccount(pub String);
