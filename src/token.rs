use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::AppError;
use crate::models::account::Account;
use crate::repository::{AccountRepository, InsertResult};
use crate::util::{format_timestamp, log_prefix};

pub const ACCESS_TOKEN_PREFIX: &str = "mva_";
const ACCESS_TOKEN_HEX_LEN: usize = 64;
/// Advertised lifetime of an access token.
pub const ACCESS_TOKEN_TTL_HOURS: i64 = 24;

/// A syntactically valid access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    /// `mva_` followed by hex(SHA-256(20 random bytes)).
    pub fn generate() -> Self {
        let mut seed = [0u8; 20];
        rand::thread_rng().fill_bytes(&mut seed);
        let digest = Sha256::digest(seed);
        Self(format!("{ACCESS_TOKEN_PREFIX}{}", hex::encode(digest)))
    }

    pub fn parse(raw: &str) -> Option<Self> {
        is_valid_access_token(raw).then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// `mva_` + 64 lowercase hex chars.
pub fn is_valid_access_token(token: &str) -> bool {
    token
        .strip_prefix(ACCESS_TOKEN_PREFIX)
        .is_some_and(|hex| {
            hex.len() == ACCESS_TOKEN_HEX_LEN
                && hex.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        })
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: AccessToken,
    pub expiry: DateTime<Utc>,
}

impl IssuedToken {
    pub fn formatted_expiry(&self) -> String {
        format_timestamp(self.expiry.timestamp())
    }
}

/// Mints a token for an active account and stores it, regenerating on the
/// (unlikely) event that another account already holds the same value.
pub async fn issue_token(
    repo: &dyn AccountRepository,
    account_number: &str,
    now: DateTime<Utc>,
) -> Result<IssuedToken, AppError> {
    if !repo.account_exists(account_number).await? {
        return Err(AppError::Unauthorized("Unknown or inactive account".into()));
    }

    loop {
        let token = AccessToken::generate();
        match repo.store_token(account_number, token.as_str()).await? {
            Some(InsertResult::Inserted(())) => {
                tracing::debug!(
                    account = %log_prefix(account_number),
                    token = %log_prefix(token.as_str()),
                    "Access token issued"
                );
                return Ok(IssuedToken {
                    token,
                    expiry: now + Duration::hours(ACCESS_TOKEN_TTL_HOURS),
                });
            }
            Some(InsertResult::Collision) => {
                tracing::debug!("Access token collision, regenerating");
            }
            None => {
                return Err(AppError::Unauthorized("Unknown or inactive account".into()));
            }
        }
    }
}

/// Resolves the account behind an `Authorization` header value.
///
/// Missing header or non-bearer scheme is 401; a malformed or unknown token
/// is 403.
pub async fn authenticate(
    repo: &dyn AccountRepository,
    authorization: Option<&str>,
) -> Result<Account, AppError> {
    let raw = authorization
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Missing bearer token".into()))?;

    let token =
        AccessToken::parse(raw).ok_or_else(|| AppError::Forbidden("Invalid access token".into()))?;

    repo.find_account_by_token(token.as_str())
        .await?
        .ok_or_else(|| AppError::Forbidden("Invalid access token".into()))
}

/// Short-lived login handoff token for the web site.
pub fn generate_www_auth_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
