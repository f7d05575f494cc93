use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use crate::error::AppError;
use crate::middleware::auth::AuthAccount;
use crate::models::device::{CreateDeviceRequest, DeleteResponse, DeviceResponse};
use crate::provisioning::register_device;
use crate::util::{log_prefix, now_secs};
use crate::AppState;

const MAX_PUBKEY_LEN: usize = 256;

/// POST /accounts/v1/devices: register a device and allocate its addresses.
pub async fn create_device(
    State(state): State<AppState>,
    Extension(AuthAccount(account_number)): Extension<AuthAccount>,
    Json(body): Json<CreateDeviceRequest>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!(
        handler = "create_device",
        account = %log_prefix(&account_number),
        hijack_dns = body.hijack_dns,
        "Handler: POST /accounts/v1/devices"
    );

    let pubkey = body.pubkey.trim();
    if pubkey.is_empty() || pubkey.len() > MAX_PUBKEY_LEN {
        return Err(AppError::BadRequest(format!(
            "pubkey length must be 1-{MAX_PUBKEY_LEN}"
        )));
    }

    let account = state
        .repo
        .find_account(&account_number)
        .await?
        .ok_or_else(|| AppError::NotFound("Account not found".into()))?;

    let request = CreateDeviceRequest {
        pubkey: pubkey.to_string(),
        hijack_dns: body.hijack_dns,
    };
    let device = register_device(
        state.repo.as_ref(),
        &state.address_pool,
        &account,
        request,
        now_secs(),
    )
    .await?;

    tracing::info!(
        handler = "create_device",
        account = %log_prefix(&account_number),
        device_id = %device.id,
        ipv4 = %device.ipv4(),
        status = 201,
        "Responding: device registered"
    );

    Ok((StatusCode::CREATED, Json(DeviceResponse::from(&device))))
}

/// GET /accounts/v1/devices
pub async fn list_devices(
    State(state): State<AppState>,
    Extension(AuthAccount(account_number)): Extension<AuthAccount>,
) -> Result<impl IntoResponse, AppError> {
    let devices = state.repo.list_devices(&account_number).await?;
    let body: Vec<DeviceResponse> = devices.iter().map(DeviceResponse::from).collect();
    Ok(Json(body))
}

/// GET /accounts/v1/devices/{id}
pub async fn get_device(
    State(state): State<AppState>,
    Extension(AuthAccount(account_number)): Extension<AuthAccount>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let device = state
        .repo
        .find_device(&account_number, &id)
        .await?
        .ok_or_else(|| AppError::NotFound("Device not found".into()))?;

    Ok(Json(DeviceResponse::from(&device)))
}

/// DELETE /accounts/v1/devices/{id}: removes the device and frees its addresses.
pub async fn delete_device(
    State(state): State<AppState>,
    Extension(AuthAccount(account_number)): Extension<AuthAccount>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!(
        handler = "delete_device",
        account = %log_prefix(&account_number),
        device_id = %id,
        "Handler: DELETE /accounts/v1/devices/:id"
    );

    let deleted = state
        .repo
        .delete_device(&account_number, &id)
        .await?;

    if !deleted {
        return Err(AppError::NotFound("Device not found".into()));
    }

    tracing::info!(
        handler = "delete_device",
        device_id = %id,
        status = 200,
        "Responding: device deleted"
    );

    Ok(Json(DeleteResponse { deleted: true }))
}
