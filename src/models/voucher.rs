use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Voucher {
    pub code: String,
    pub duration_months: i64,
    pub is_used: bool,
    pub account_number: Option<String>,
    pub used_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitVoucherRequest {
    pub voucher_code: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitVoucherResponse {
    /// Seconds added to the account.
    pub time_added: i64,
    pub new_expiry: String,
}
