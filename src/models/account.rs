use serde::{Deserialize, Serialize};

use crate::util::format_timestamp;

/// Account row, without the bearer token.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Account {
    pub account_number: String,
    pub id: String,
    pub status: String,
    pub expiry: Option<i64>,
    pub max_devices: i64,
    pub created_at: i64,
}

impl Account {
    /// Unset expiry counts as "expires now".
    pub fn expiry_or(&self, now: i64) -> i64 {
        self.expiry.unwrap_or(now)
    }
}

#[derive(Debug, Serialize)]
pub struct CreateAccountResponse {
    pub id: String,
    pub expiry: String,
    pub max_ports: i64,
    pub can_add_ports: bool,
    pub max_devices: i64,
    pub can_add_devices: bool,
    pub number: String,
}

impl CreateAccountResponse {
    pub fn new(account: &Account, now: i64) -> Self {
        Self {
            id: account.id.clone(),
            expiry: format_timestamp(account.expiry_or(now)),
            max_ports: 0,
            can_add_ports: false,
            max_devices: account.max_devices,
            can_add_devices: account.max_devices > 0,
            number: account.account_number.clone(),
        }
    }
}

/// `GET /accounts/v1/accounts/me`
#[derive(Debug, Serialize)]
pub struct AccountSummary {
    pub id: String,
    pub expiry: String,
    pub max_ports: i64,
    pub can_add_ports: bool,
    pub max_devices: i64,
    pub can_add_devices: bool,
}

impl AccountSummary {
    pub fn new(account: &Account, device_count: i64, now: i64) -> Self {
        Self {
            id: account.id.clone(),
            expiry: format_timestamp(account.expiry_or(now)),
            max_ports: 0,
            can_add_ports: false,
            max_devices: account.max_devices,
            can_add_devices: device_count < account.max_devices,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub account_number: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expiry: String,
}

#[derive(Debug, Serialize)]
pub struct WwwAuthTokenResponse {
    pub auth_token: String,
}
