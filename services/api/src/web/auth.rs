//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for login, logout and "who am I".

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use dumpster_core::{
    domain::{Credentials, Identity, Role},
    identity::authenticate,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;

use crate::web::{
    middleware::{session_token, SESSION_COOKIE},
    rest::port_error_response,
    state::AppState,
};

//=========================================================================================
// Request/Response Types
//=========================================================================================

/// Common users identify themselves; organizations present a password.
#[derive(Deserialize, ToSchema)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum LoginRequest {
    CommonUser { name: String, email: String },
    Organization { email: String, password: String },
}

impl From<LoginRequest> for Credentials {
    fn from(req: LoginRequest) -> Self {
        match req {
            LoginRequest::CommonUser { name, email } => Credentials::CommonUser { name, email },
            LoginRequest::Organization { email, password } => {
                Credentials::Organization { email, password }
            }
        }
    }
}

#[derive(Serialize, ToSchema, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoleDto {
    CommonUser,
    Organization,
}

#[derive(Serialize, ToSchema)]
pub struct IdentityResponse {
    pub role: RoleDto,
    pub email: String,
    pub display_name: Option<String>,
}

impl From<Identity> for IdentityResponse {
    fn from(identity: Identity) -> Self {
        Self {
            role: match identity.role {
                Role::CommonUser => RoleDto::CommonUser,
                Role::Organization => RoleDto::Organization,
            },
            email: identity.email,
            display_name: identity.display_name,
        }
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/login - Start a session as a common user or an organization
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = IdentityResponse),
        (status = 400, description = "Missing name or email"),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    // 1. Turn the credentials into an identity
    let identity = authenticate(&state.directory, req.into()).map_err(port_error_response)?;
    info!(role = ?identity.role, email = %identity.email, "login");

    // 2. Replace the session this browser already had, if any
    if let Some(previous) = session_token(&headers) {
        state.sessions.logout(previous).await;
    }
    let token = state.sessions.login(identity.clone()).await;

    // 3. Hand the token back as a session cookie
    let cookie = format!(
        "{}={}; HttpOnly; Secure; SameSite=Lax; Path=/",
        SESSION_COOKIE, token
    );

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(IdentityResponse::from(identity)),
    ))
}

/// POST /auth/logout - End the current session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logout successful"),
        (status = 401, description = "No active session")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let token = session_token(&headers)
        .ok_or((StatusCode::UNAUTHORIZED, "No session found".to_string()))?;

    if !state.sessions.logout(token).await {
        return Err((StatusCode::UNAUTHORIZED, "No session found".to_string()));
    }

    let cookie = format!(
        "{}=; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=0",
        SESSION_COOKIE
    );
    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie)]))
}

/// GET /auth/me - The identity behind the current session
#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Current identity", body = IdentityResponse),
        (status = 401, description = "No active session")
    )
)]
pub async fn me_handler(Extension(identity): Extension<Identity>) -> Json<IdentityResponse> {
    Json(identity.into())
}
