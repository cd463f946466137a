use axum::{
    Extension, Json,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tower_sessions::Session;

use super::{AccountDto, ApiError, ApiResponse, AppState, MessageResponse};
use crate::models::{AccountStatus, Principal, Role};
use crate::services::audit::{AuditEvent, RequestMeta};
use crate::services::session_monitor::{ACCOUNT_ID_KEY, LAST_ACTIVITY_KEY, SessionState};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
pub struct LoginRequest {
    /// Username or email; matched case-insensitively.
    #[serde(alias = "username", alias = "email")]
    pub identifier: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
    pub new_password_confirmation: String,
}

// ============================================================================
// Middleware
// ============================================================================

/// Session gate for every protected route.
///
/// Resolves the logged-in account, applies idle-session expiry, and injects
/// the resolved [`Principal`] as a request extension for downstream handlers
/// and role checks.
pub async fn session_guard(
    State(state): State<Arc<AppState>>,
    session: Session,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let account_id = session
        .get::<i32>(ACCOUNT_ID_KEY)
        .await
        .map_err(|e| ApiError::internal(format!("Session error: {e}")))?
        .ok_or_else(|| ApiError::unauthorized("No autenticado"))?;

    let now = state.shared.clock.now();
    let (session_state, idle_seconds) = state
        .shared
        .session_monitor
        .check_and_touch(&session, now)
        .await
        .map_err(|e| ApiError::internal(format!("Session error: {e}")))?;

    if session_state == SessionState::Expired {
        state.shared.audit.record(
            &AuditEvent::SessionExpired {
                account_id,
                idle_seconds,
            },
            &request_meta(&headers),
        );
        return Err(ApiError::unauthorized(
            "Sesión expirada por inactividad. Inicie sesión nuevamente.",
        ));
    }

    let account = state
        .store()
        .get_account_by_id(account_id)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?
        .ok_or_else(|| ApiError::unauthorized("No autenticado"))?;

    // Deactivation cuts existing sessions, not just future logins.
    if account.status == AccountStatus::Inactive {
        session
            .flush()
            .await
            .map_err(|e| ApiError::internal(format!("Session error: {e}")))?;
        return Err(ApiError::unauthorized(
            "Cuenta desactivada. Contacte al administrador.",
        ));
    }

    request.extensions_mut().insert(account.principal());
    Ok(next.run(request).await)
}

pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    require_role(&state, Role::Admin, &headers, request, next).await
}

pub async fn require_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    require_role(&state, Role::User, &headers, request, next).await
}

async fn require_role(
    state: &Arc<AppState>,
    required: Role,
    headers: &HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let principal = request
        .extensions()
        .get::<Principal>()
        .cloned()
        .ok_or_else(|| ApiError::unauthorized("No autenticado"))?;

    state.shared.role_guard.authorize(
        &principal,
        required,
        request.uri().path(),
        &request_meta(headers),
    )?;

    Ok(next.run(request).await)
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /auth/login
/// Authenticate with username/email and password, starts a session on success.
pub async fn login(
    State(state): State<Arc<AppState>>,
    session: Session,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<ApiResponse<AccountDto>>, ApiError> {
    if payload.identifier.trim().is_empty() {
        return Err(ApiError::validation("El usuario es requerido"));
    }
    if payload.password.is_empty() {
        return Err(ApiError::validation("La contraseña es requerida"));
    }

    let meta = request_meta(&headers);
    let account = state
        .shared
        .auth_service
        .authenticate(&payload.identifier, &payload.password, &meta)
        .await?;

    // Rotate the session id on privilege change to prevent fixation.
    session
        .cycle_id()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to create session: {e}")))?;
    session
        .insert(ACCOUNT_ID_KEY, account.id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to create session: {e}")))?;
    session
        .insert(LAST_ACTIVITY_KEY, state.shared.clock.now().timestamp())
        .await
        .map_err(|e| ApiError::internal(format!("Failed to create session: {e}")))?;

    Ok(Json(ApiResponse::success(AccountDto::from(&account))))
}

/// POST /auth/logout
/// Invalidate the current session. Safe to call without one.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    session: Session,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    if let Ok(Some(account_id)) = session.get::<i32>(ACCOUNT_ID_KEY).await {
        state
            .shared
            .audit
            .record(&AuditEvent::LoggedOut { account_id }, &request_meta(&headers));
    }

    session
        .flush()
        .await
        .map_err(|e| ApiError::internal(format!("Session error: {e}")))?;

    Ok((
        StatusCode::OK,
        Json(ApiResponse::success(MessageResponse {
            message: "Sesión cerrada".to_string(),
        })),
    ))
}

/// GET /auth/me
pub async fn get_current_account(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<ApiResponse<AccountDto>>, ApiError> {
    let account = state
        .store()
        .get_account_by_id(principal.account_id)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?
        .ok_or_else(|| ApiError::unauthorized("No autenticado"))?;

    Ok(Json(ApiResponse::success(AccountDto::from(&account))))
}

/// PUT /auth/password
/// Change the caller's password after re-verifying the current one.
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    headers: HeaderMap,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    if payload.new_password != payload.new_password_confirmation {
        return Err(ApiError::validation(
            "La confirmación de la contraseña no coincide",
        ));
    }

    state
        .shared
        .auth_service
        .change_password(
            &principal,
            &payload.current_password,
            &payload.new_password,
            &request_meta(&headers),
        )
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse {
        message: "Contraseña actualizada".to_string(),
    })))
}

/// GET /dashboard
/// User-scoped landing resource; admins are denied by the role layer.
pub async fn dashboard(
    Extension(principal): Extension<Principal>,
) -> Json<ApiResponse<MessageResponse>> {
    Json(ApiResponse::success(MessageResponse {
        message: format!("Bienvenido, {}", principal.username),
    }))
}

// ============================================================================
// Helpers
// ============================================================================

pub fn request_meta(headers: &HeaderMap) -> RequestMeta {
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string());

    let user_agent = headers
        .get("user-agent")
        .and_then(|h| h.to_str().ok())
        .map(ToString::to_string);

    RequestMeta { ip, user_agent }
}
