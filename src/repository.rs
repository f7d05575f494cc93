use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::AppError;
use crate::models::account::Account;
use crate::models::change::ChangeRecord;
use crate::models::device::{Device, NewDevice};
use crate::models::voucher::Voucher;

/// Outcome of an insert keyed by a randomly generated identifier.
pub enum InsertResult<T> {
    Inserted(T),
    /// The identifier is already taken; generate a new one and retry.
    Collision,
}

pub enum DeviceInsertResult {
    Inserted(Device),
    /// The account already holds `max_devices` devices. Nothing was written.
    QuotaExceeded,
    /// Another device got the chosen IPv4 address first.
    AddressTaken,
}

pub enum RedeemResult {
    /// New account expiry, unix seconds.
    Redeemed(i64),
    AlreadyUsed,
    UnknownVoucher,
    UnknownAccount,
}

#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn create_account(
        &self,
        account_number: &str,
        id: &str,
        max_devices: i64,
        now: i64,
    ) -> Result<InsertResult<Account>, AppError>;
    async fn find_account(&self, account_number: &str) -> Result<Option<Account>, AppError>;
    /// True iff the account exists and is active.
    async fn account_exists(&self, account_number: &str) -> Result<bool, AppError>;
    /// Stores `token` as the account's only bearer token. `Ok(None)` when the
    /// account does not exist.
    async fn store_token(
        &self,
        account_number: &str,
        token: &str,
    ) -> Result<Option<InsertResult<()>>, AppError>;
    async fn find_account_by_token(&self, token: &str) -> Result<Option<Account>, AppError>;

    async fn count_devices(&self, account_number: &str) -> Result<i64, AppError>;
    /// Allocated IPv4 addresses within `first..=last`, ascending.
    async fn allocated_ipv4(&self, first: u32, last: u32) -> Result<Vec<u32>, AppError>;
    async fn insert_device(
        &self,
        device: NewDevice,
        max_devices: i64,
    ) -> Result<DeviceInsertResult, AppError>;
    async fn find_device(&self, account_number: &str, id: &str)
        -> Result<Option<Device>, AppError>;
    async fn list_devices(&self, account_number: &str) -> Result<Vec<Device>, AppError>;
    async fn delete_device(&self, account_number: &str, id: &str) -> Result<bool, AppError>;

    async fn find_voucher(&self, code: &str) -> Result<Option<Voucher>, AppError>;
    async fn redeem_voucher(
        &self,
        account_number: &str,
        duration_secs: i64,
        code: &str,
        now: i64,
    ) -> Result<RedeemResult, AppError>;
    /// Inserts the codes that are not taken yet; returns the ones stored.
    async fn insert_vouchers(
        &self,
        codes: &[String],
        duration_months: i64,
    ) -> Result<Vec<String>, AppError>;

    async fn health_check(&self) -> Result<(), AppError>;
    /// Row-level change feed for every write this repository performs.
    fn subscribe_changes(&self) -> broadcast::Receiver<ChangeRecord>;
}
