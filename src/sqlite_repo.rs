use async_trait::async_trait;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tokio::sync::broadcast;

use crate::error::AppError;
use crate::models::account::Account;
use crate::models::change::{ChangeKind, ChangeRecord};
use crate::models::device::{Device, DeviceResponse, NewDevice};
use crate::models::voucher::Voucher;
use crate::repository::{AccountRepository, DeviceInsertResult, InsertResult, RedeemResult};
use crate::util::log_prefix;

const CHANGE_FEED_CAPACITY: usize = 256;

const ACCOUNT_COLUMNS: &str = "account_number, id, status, expiry, max_devices, created_at";
const DEVICE_COLUMNS: &str =
    "id, account_number, pubkey, hijack_dns, name, ipv4_address, ipv6_address, created_at";

pub struct SqliteRepository {
    pool: SqlitePool,
    changes: broadcast::Sender<ChangeRecord>,
}

impl SqliteRepository {
    pub fn new(pool: SqlitePool) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self { pool, changes }
    }

    fn emit(&self, kind: ChangeKind, table: &'static str, data: Value) {
        // No receivers is fine: nobody is watching the feed.
        let _ = self.changes.send(ChangeRecord::new(kind, table, data));
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn account_data(account: &Account) -> Value {
    json!({
        "id": account.id,
        "status": account.status,
        "expiry": account.expiry,
        "max_devices": account.max_devices,
    })
}

fn device_data(device: &Device) -> Value {
    let view = DeviceResponse::from(device);
    json!({
        "id": view.id,
        "name": view.name,
        "created": view.created,
        "ipv4_address": view.ipv4_address,
        "ipv6_address": view.ipv6_address,
    })
}

#[async_trait]
impl AccountRepository for SqliteRepository {
    async fn create_account(
        &self,
        account_number: &str,
        id: &str,
        max_devices: i64,
        now: i64,
    ) -> Result<InsertResult<Account>, AppError> {
        let number_prefix = log_prefix(account_number);
        tracing::debug!(account = %number_prefix, "db: INSERT accounts");

        let inserted = sqlx::query(
            "INSERT INTO accounts (account_number, id, status, expiry, max_devices, created_at) \
             VALUES (?, ?, 'active', ?, ?, ?)",
        )
        .bind(account_number)
        .bind(id)
        .bind(now)
        .bind(max_devices)
        .bind(now)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                tracing::debug!(account = %number_prefix, "db: account number collision");
                return Ok(InsertResult::Collision);
            }
            Err(e) => return Err(e.into()),
        }

        let account = Account {
            account_number: account_number.to_string(),
            id: id.to_string(),
            status: "active".to_string(),
            expiry: Some(now),
            max_devices,
            created_at: now,
        };
        tracing::debug!(account = %number_prefix, "db: account row inserted");

        self.emit(ChangeKind::Insert, "accounts", account_data(&account));
        Ok(InsertResult::Inserted(account))
    }

    async fn find_account(&self, account_number: &str) -> Result<Option<Account>, AppError> {
        tracing::debug!(account = %log_prefix(account_number), "db: SELECT account");

        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE account_number = ?"
        ))
        .bind(account_number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    async fn account_exists(&self, account_number: &str) -> Result<bool, AppError> {
        let number_prefix = log_prefix(account_number);
        tracing::debug!(account = %number_prefix, "db: SELECT 1 (active account check)");

        let exists: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM accounts WHERE account_number = ? AND status = 'active'",
        )
        .bind(account_number)
        .fetch_optional(&self.pool)
        .await?;

        let found = exists.is_some();
        tracing::debug!(account = %number_prefix, found, "db: account exists result");

        Ok(found)
    }

    async fn store_token(
        &self,
        account_number: &str,
        token: &str,
    ) -> Result<Option<InsertResult<()>>, AppError> {
        let number_prefix = log_prefix(account_number);
        tracing::debug!(account = %number_prefix, "db: UPDATE accounts SET bearer_token");

        let updated: Result<Option<String>, sqlx::Error> = sqlx::query_scalar(
            "UPDATE accounts SET bearer_token = ? WHERE account_number = ? RETURNING id",
        )
        .bind(token)
        .bind(account_number)
        .fetch_optional(&self.pool)
        .await;

        match updated {
            Ok(Some(id)) => {
                tracing::debug!(account = %number_prefix, "db: token stored");
                self.emit(ChangeKind::Update, "accounts", json!({ "id": id }));
                Ok(Some(InsertResult::Inserted(())))
            }
            Ok(None) => {
                tracing::debug!(account = %number_prefix, "db: token not stored, no such account");
                Ok(None)
            }
            Err(e) if is_unique_violation(&e) => {
                tracing::debug!(account = %number_prefix, "db: token collision");
                Ok(Some(InsertResult::Collision))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_account_by_token(&self, token: &str) -> Result<Option<Account>, AppError> {
        tracing::debug!(token = %log_prefix(token), "db: SELECT account by bearer_token");

        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE bearer_token = ?"
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    async fn count_devices(&self, account_number: &str) -> Result<i64, AppError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM devices WHERE account_number = ?")
                .bind(account_number)
                .fetch_one(&self.pool)
                .await?;

        tracing::debug!(account = %log_prefix(account_number), count, "db: device count");
        Ok(count)
    }

    async fn allocated_ipv4(&self, first: u32, last: u32) -> Result<Vec<u32>, AppError> {
        let rows: Vec<i64> = sqlx::query_scalar(
            "SELECT ipv4_address FROM devices \
             WHERE ipv4_address BETWEEN ? AND ? ORDER BY ipv4_address ASC",
        )
        .bind(i64::from(first))
        .bind(i64::from(last))
        .fetch_all(&self.pool)
        .await?;

        tracing::debug!(allocated = rows.len(), "db: allocated IPv4 addresses in range");
        Ok(rows.into_iter().map(|a| a as u32).collect())
    }

    async fn insert_device(
        &self,
        device: NewDevice,
        max_devices: i64,
    ) -> Result<DeviceInsertResult, AppError> {
        let number_prefix = log_prefix(&device.account_number);
        tracing::debug!(
            account = %number_prefix,
            device_id = %device.id,
            ipv4 = %device.ipv4_address,
            "db: conditional INSERT devices"
        );

        // The count and the insert run as one statement, so the quota holds
        // under concurrent registrations.
        let inserted = sqlx::query(
            "INSERT INTO devices \
             (id, account_number, pubkey, hijack_dns, name, ipv4_address, ipv6_address, created_at) \
             SELECT ?, ?, ?, ?, ?, ?, ?, ? \
             WHERE (SELECT COUNT(*) FROM devices WHERE account_number = ?) < ?",
        )
        .bind(&device.id)
        .bind(&device.account_number)
        .bind(&device.pubkey)
        .bind(device.hijack_dns)
        .bind(&device.name)
        .bind(i64::from(u32::from(device.ipv4_address)))
        .bind(&device.ipv6_address)
        .bind(device.created_at)
        .bind(&device.account_number)
        .bind(max_devices)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(result) if result.rows_affected() == 0 => {
                tracing::debug!(account = %number_prefix, "db: device quota reached, nothing inserted");
                Ok(DeviceInsertResult::QuotaExceeded)
            }
            Ok(_) => {
                let device = device.into_device();
                tracing::debug!(
                    account = %log_prefix(&device.account_number),
                    device_id = %device.id,
                    "db: device inserted"
                );
                self.emit(ChangeKind::Insert, "devices", device_data(&device));
                Ok(DeviceInsertResult::Inserted(device))
            }
            Err(e) if is_unique_violation(&e) => {
                tracing::debug!(ipv4 = %device.ipv4_address, "db: IPv4 address taken concurrently");
                Ok(DeviceInsertResult::AddressTaken)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_device(
        &self,
        account_number: &str,
        id: &str,
    ) -> Result<Option<Device>, AppError> {
        tracing::debug!(account = %log_prefix(account_number), device_id = %id, "db: SELECT device");

        let device = sqlx::query_as::<_, Device>(&format!(
            "SELECT {DEVICE_COLUMNS} FROM devices WHERE id = ? AND account_number = ?"
        ))
        .bind(id)
        .bind(account_number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(device)
    }

    async fn list_devices(&self, account_number: &str) -> Result<Vec<Device>, AppError> {
        let devices = sqlx::query_as::<_, Device>(&format!(
            "SELECT {DEVICE_COLUMNS} FROM devices WHERE account_number = ? ORDER BY created_at ASC, id ASC"
        ))
        .bind(account_number)
        .fetch_all(&self.pool)
        .await?;

        tracing::debug!(
            account = %log_prefix(account_number),
            rows_returned = devices.len(),
            "db: devices fetched"
        );
        Ok(devices)
    }

    async fn delete_device(&self, account_number: &str, id: &str) -> Result<bool, AppError> {
        tracing::debug!(account = %log_prefix(account_number), device_id = %id, "db: DELETE device");

        let deleted = sqlx::query_as::<_, Device>(&format!(
            "DELETE FROM devices WHERE id = ? AND account_number = ? RETURNING {DEVICE_COLUMNS}"
        ))
        .bind(id)
        .bind(account_number)
        .fetch_optional(&self.pool)
        .await?;

        tracing::debug!(device_id = %id, deleted = deleted.is_some(), "db: delete result");

        match deleted {
            Some(device) => {
                self.emit(ChangeKind::Delete, "devices", device_data(&device));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_voucher(&self, code: &str) -> Result<Option<Voucher>, AppError> {
        tracing::debug!(voucher = %log_prefix(code), "db: SELECT voucher");

        let voucher = sqlx::query_as::<_, Voucher>(
            "SELECT code, duration_months, is_used, account_number, used_at \
             FROM vouchers WHERE code = ?",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(voucher)
    }

    async fn redeem_voucher(
        &self,
        account_number: &str,
        duration_secs: i64,
        code: &str,
        now: i64,
    ) -> Result<RedeemResult, AppError> {
        let number_prefix = log_prefix(account_number);
        tracing::debug!(
            account = %number_prefix,
            voucher = %log_prefix(code),
            duration_secs,
            "db: BEGIN voucher redemption"
        );

        let mut tx = self.pool.begin().await?;

        // Claim the voucher first: only one transaction can flip is_used.
        let claimed = sqlx::query(
            "UPDATE vouchers SET is_used = 1, account_number = ?, used_at = ? \
             WHERE code = ? AND is_used = 0 \
             AND EXISTS (SELECT 1 FROM accounts WHERE account_number = ?)",
        )
        .bind(account_number)
        .bind(now)
        .bind(code)
        .bind(account_number)
        .execute(&mut *tx)
        .await?;

        if claimed.rows_affected() == 0 {
            let is_used: Option<bool> =
                sqlx::query_scalar("SELECT is_used FROM vouchers WHERE code = ?")
                    .bind(code)
                    .fetch_optional(&mut *tx)
                    .await?;
            tx.rollback().await?;

            let outcome = match is_used {
                None => RedeemResult::UnknownVoucher,
                Some(true) => RedeemResult::AlreadyUsed,
                Some(false) => RedeemResult::UnknownAccount,
            };
            tracing::debug!(account = %number_prefix, "db: voucher not claimed, rolled back");
            return Ok(outcome);
        }

        let (account_id, new_expiry): (String, i64) = sqlx::query_as(
            "UPDATE accounts SET expiry = COALESCE(expiry, ?) + ? \
             WHERE account_number = ? RETURNING id, expiry",
        )
        .bind(now)
        .bind(duration_secs)
        .bind(account_number)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::debug!(account = %number_prefix, new_expiry, "db: voucher redeemed, COMMIT");

        self.emit(
            ChangeKind::Update,
            "vouchers",
            json!({ "is_used": true, "used_at": now }),
        );
        self.emit(
            ChangeKind::Update,
            "accounts",
            json!({ "id": account_id, "expiry": new_expiry }),
        );

        Ok(RedeemResult::Redeemed(new_expiry))
    }

    async fn insert_vouchers(
        &self,
        codes: &[String],
        duration_months: i64,
    ) -> Result<Vec<String>, AppError> {
        tracing::debug!(batch = codes.len(), duration_months, "db: INSERT vouchers");

        let mut tx = self.pool.begin().await?;
        let mut stored = Vec::with_capacity(codes.len());

        for code in codes {
            let result = sqlx::query(
                "INSERT INTO vouchers (code, duration_months) VALUES (?, ?) \
                 ON CONFLICT (code) DO NOTHING",
            )
            .bind(code)
            .bind(duration_months)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                stored.push(code.clone());
            }
        }

        tx.commit().await?;
        tracing::debug!(
            requested = codes.len(),
            stored = stored.len(),
            "db: vouchers inserted"
        );

        if !stored.is_empty() {
            self.emit(
                ChangeKind::Insert,
                "vouchers",
                json!({ "count": stored.len(), "duration_months": duration_months }),
            );
        }

        Ok(stored)
    }

    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<ChangeRecord> {
        self.changes.subscribe()
    }
}
