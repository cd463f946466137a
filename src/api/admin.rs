//! Admin-scoped account management endpoints. All routes here sit behind the
//! session guard plus the admin role layer.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::HeaderMap,
};
use serde::Deserialize;
use std::sync::Arc;

use super::auth::request_meta;
use super::{AccountDto, ApiError, ApiResponse, AppState, UnlockResponse};
use crate::models::Principal;
use crate::services::admin_service::UnlockOutcome;

#[derive(Deserialize)]
pub struct UnlockRequest {
    pub identifier: Option<String>,
    #[serde(default)]
    pub all: bool,
}

/// POST /admin/accounts/unlock
/// Releases a single account's lock, or every lock with `{"all": true}`.
pub async fn unlock(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    headers: HeaderMap,
    Json(payload): Json<UnlockRequest>,
) -> Result<Json<ApiResponse<UnlockResponse>>, ApiError> {
    let meta = request_meta(&headers);

    if payload.all {
        let released = state
            .shared
            .admin_service
            .unlock_all(&principal, &meta)
            .await?;
        return Ok(Json(ApiResponse::success(UnlockResponse {
            message: format!("{released} cuentas desbloqueadas"),
            released,
        })));
    }

    let identifier = payload
        .identifier
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ApiError::validation("Debe indicar un usuario o usar \"all\""))?;

    let outcome = state
        .shared
        .admin_service
        .unlock(identifier, &principal, &meta)
        .await?;

    let (message, released) = match outcome {
        UnlockOutcome::Unlocked => ("Cuenta desbloqueada".to_string(), 1),
        UnlockOutcome::NotLocked => ("La cuenta no estaba bloqueada".to_string(), 0),
    };

    Ok(Json(ApiResponse::success(UnlockResponse {
        message,
        released,
    })))
}

/// POST /admin/accounts/{id}/deactivate
pub async fn deactivate(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    headers: HeaderMap,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<AccountDto>>, ApiError> {
    let account = state
        .shared
        .admin_service
        .deactivate(id, &principal, &request_meta(&headers))
        .await?;

    Ok(Json(ApiResponse::success(AccountDto::from(&account))))
}

/// POST /admin/accounts/{id}/activate
pub async fn activate(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    headers: HeaderMap,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<AccountDto>>, ApiError> {
    let account = state
        .shared
        .admin_service
        .activate(id, &principal, &request_meta(&headers))
        .await?;

    Ok(Json(ApiResponse::success(AccountDto::from(&account))))
}
