use std::path::Path as FsPath;

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use serde::de::DeserializeOwned;

use crate::error::AppError;
use crate::ids::normalize_voucher_code;
use crate::middleware::auth::AuthAccount;
use crate::models::release::{ReleaseEntry, ReleaseResponse};
use crate::models::voucher::{SubmitVoucherRequest, SubmitVoucherResponse};
use crate::util::{format_timestamp, log_prefix, now_secs};
use crate::voucher::{redeem_voucher, validate_voucher, VoucherValidity};
use crate::AppState;

/// Reads and parses one of the externally supplied JSON documents.
async fn load_resource<T: DeserializeOwned>(dir: &FsPath, name: &str) -> Result<T, AppError> {
    let path = dir.join(name);
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| AppError::Resource(format!("reading {}: {e}", path.display())))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AppError::Resource(format!("parsing {}: {e}", path.display())))
}

/// GET /app/v1/relays
pub async fn get_relays(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let relays: serde_json::Value = load_resource(&state.resource_dir, "relays.json").await?;
    Ok(Json(relays))
}

/// GET /app/v1/api-addrs
pub async fn get_api_addrs(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let addrs: serde_json::Value = load_resource(&state.resource_dir, "api-addrs.json").await?;
    Ok(Json(addrs))
}

/// GET /app/v1/releases/{platform}/{version}
pub async fn get_release(
    State(state): State<AppState>,
    Path((platform, version)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let releases: Vec<ReleaseEntry> = load_resource(&state.resource_dir, "releases.json").await?;

    releases
        .into_iter()
        .find(|r| r.matches(&platform, &version))
        .map(|r| Json(ReleaseResponse::from(r)))
        .ok_or_else(|| AppError::NotFound("No matching version found".into()))
}

/// POST /app/v1/submit-voucher: redeem a voucher for the authenticated account.
pub async fn submit_voucher(
    State(state): State<AppState>,
    Extension(AuthAccount(account_number)): Extension<AuthAccount>,
    Json(body): Json<SubmitVoucherRequest>,
) -> Result<impl IntoResponse, AppError> {
    let code = normalize_voucher_code(&body.voucher_code);
    tracing::info!(
        handler = "submit_voucher",
        account = %log_prefix(&account_number),
        voucher = %log_prefix(&code),
        "Handler: POST /app/v1/submit-voucher"
    );

    let duration_secs = match validate_voucher(state.repo.as_ref(), &code).await? {
        VoucherValidity::Valid { duration_secs } => duration_secs,
        VoucherValidity::NotFound => {
            return Err(AppError::NotFound("Voucher code not found".into()));
        }
        VoucherValidity::AlreadyUsed => {
            return Err(AppError::VoucherUsed("Voucher code already used".into()));
        }
    };

    let new_expiry = redeem_voucher(
        state.repo.as_ref(),
        &account_number,
        duration_secs,
        &code,
        now_secs(),
    )
    .await?;

    tracing::info!(
        handler = "submit_voucher",
        account = %log_prefix(&account_number),
        time_added = duration_secs,
        status = 200,
        "Responding: voucher redeemed"
    );

    Ok(Json(SubmitVoucherResponse {
        time_added: duration_secs,
        new_expiry: format_timestamp(new_expiry),
    }))
}
