use std::net::Ipv4Addr;

use uuid::Uuid;

use crate::error::AppError;
use crate::ids::{generate_account_number, generate_device_name};
use crate::ip_pool::AddressPool;
use crate::models::account::Account;
use crate::models::device::{CreateDeviceRequest, Device, NewDevice};
use crate::repository::{AccountRepository, DeviceInsertResult, InsertResult};
use crate::util::log_prefix;

/// Creates an account under a fresh random number. Collisions are retried
/// until the insert goes through.
pub async fn register_account(
    repo: &dyn AccountRepository,
    max_devices: i64,
    now: i64,
) -> Result<Account, AppError> {
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        let number = generate_account_number();
        let id = Uuid::new_v4().to_string();

        match repo.create_account(&number, &id, max_devices, now).await? {
            InsertResult::Inserted(account) => {
                tracing::debug!(
                    account = %log_prefix(&account.account_number),
                    attempts,
                    "Account number allocated"
                );
                return Ok(account);
            }
            InsertResult::Collision => {
                tracing::debug!(attempts, "Account number collision, regenerating");
            }
        }
    }
}

/// `count >= max` blocks further devices.
pub async fn check_max_devices_reached(
    repo: &dyn AccountRepository,
    account_number: &str,
    max_devices: i64,
) -> Result<bool, AppError> {
    let count = repo.count_devices(account_number).await?;
    Ok(count >= max_devices)
}

/// Lowest free IPv4 address of the pool at the time of the query.
pub async fn allocate_ipv4(
    repo: &dyn AccountRepository,
    pool: &AddressPool,
) -> Result<Ipv4Addr, AppError> {
    let (first, last) = pool.bounds();
    let allocated = repo.allocated_ipv4(first, last).await?;

    match pool.first_free(&allocated) {
        Some(addr) => {
            tracing::debug!(ipv4 = %addr, "IPv4 address selected");
            Ok(addr)
        }
        None => {
            tracing::error!(subnet = %pool.v4_subnet(), "IPv4 pool exhausted");
            Err(AppError::AddressesExhausted)
        }
    }
}

/// Registers a device for `account`, allocating its tunnel addresses.
///
/// The quota is checked up front for a cheap rejection and again by the
/// conditional insert. An address lost to a concurrent registration is
/// re-allocated.
pub async fn register_device(
    repo: &dyn AccountRepository,
    pool: &AddressPool,
    account: &Account,
    request: CreateDeviceRequest,
    now: i64,
) -> Result<Device, AppError> {
    let quota_error = || {
        AppError::QuotaExceeded(format!(
            "Maximum number of devices ({}) reached",
            account.max_devices
        ))
    };

    if check_max_devices_reached(repo, &account.account_number, account.max_devices).await? {
        return Err(quota_error());
    }

    let name = generate_device_name();
    loop {
        let ipv4 = allocate_ipv4(repo, pool).await?;
        let device = NewDevice {
            id: Uuid::new_v4().to_string(),
            account_number: account.account_number.clone(),
            pubkey: request.pubkey.clone(),
            hijack_dns: request.hijack_dns,
            name: name.clone(),
            ipv4_address: ipv4,
            ipv6_address: pool.ipv6_for(ipv4).to_string(),
            created_at: now,
        };

        match repo.insert_device(device, account.max_devices).await? {
            DeviceInsertResult::Inserted(device) => return Ok(device),
            DeviceInsertResult::QuotaExceeded => return Err(quota_error()),
            DeviceInsertResult::AddressTaken => {
                tracing::debug!(ipv4 = %ipv4, "Address taken concurrently, re-allocating");
            }
        }
    }
}
