use crate::error::AppError;
use crate::ids::generate_voucher_code;
use crate::repository::{AccountRepository, RedeemResult};
use crate::util::log_prefix;

/// Months are approximated as 30 days.
pub const SECONDS_PER_MONTH: i64 = 30 * 24 * 60 * 60;

pub fn months_to_secs(months: i64) -> i64 {
    months * SECONDS_PER_MONTH
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoucherValidity {
    Valid { duration_secs: i64 },
    NotFound,
    AlreadyUsed,
}

/// Fails closed: unknown and used codes are both invalid.
pub async fn validate_voucher(
    repo: &dyn AccountRepository,
    code: &str,
) -> Result<VoucherValidity, AppError> {
    let validity = match repo.find_voucher(code).await? {
        None => VoucherValidity::NotFound,
        Some(voucher) if voucher.is_used => VoucherValidity::AlreadyUsed,
        Some(voucher) => VoucherValidity::Valid {
            duration_secs: months_to_secs(voucher.duration_months),
        },
    };

    tracing::debug!(voucher = %log_prefix(code), ?validity, "Voucher validated");
    Ok(validity)
}

/// Marks the voucher used and extends the account expiry in one transaction.
/// Returns the new expiry (unix seconds).
pub async fn redeem_voucher(
    repo: &dyn AccountRepository,
    account_number: &str,
    duration_secs: i64,
    code: &str,
    now: i64,
) -> Result<i64, AppError> {
    match repo
        .redeem_voucher(account_number, duration_secs, code, now)
        .await?
    {
        RedeemResult::Redeemed(new_expiry) => Ok(new_expiry),
        RedeemResult::AlreadyUsed => Err(AppError::VoucherUsed(
            "Voucher code already used".into(),
        )),
        RedeemResult::UnknownVoucher => Err(AppError::NotFound("Voucher code not found".into())),
        RedeemResult::UnknownAccount => Err(AppError::NotFound("Account not found".into())),
    }
}

/// Creates `count` fresh voucher codes worth `duration_months` each.
/// Codes that already exist are regenerated.
pub async fn generate_vouchers(
    repo: &dyn AccountRepository,
    count: usize,
    duration_months: i64,
) -> Result<Vec<String>, AppError> {
    if duration_months <= 0 {
        return Err(AppError::BadRequest("Voucher duration must be positive".into()));
    }

    let mut created = Vec::with_capacity(count);
    while created.len() < count {
        let batch: Vec<String> = (0..count - created.len())
            .map(|_| generate_voucher_code())
            .collect();
        let stored = repo.insert_vouchers(&batch, duration_months).await?;
        tracing::debug!(
            requested = batch.len(),
            stored = stored.len(),
            "Voucher batch inserted"
        );
        created.extend(stored);
    }

    Ok(created)
}
