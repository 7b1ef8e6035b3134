//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::debug;

use crate::web::state::AppState;

pub const SESSION_COOKIE: &str = "session";

/// Pulls the session token out of the `Cookie` header, if any.
pub fn session_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())?
        .split(';')
        .find_map(|c| {
            c.trim()
                .strip_prefix(SESSION_COOKIE)
                .and_then(|rest| rest.strip_prefix('='))
        })
        .filter(|token| !token.is_empty())
}

/// Middleware that resolves the session cookie to an `Identity`.
///
/// If valid, inserts the identity into request extensions for handlers to use.
/// If invalid or missing, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // 1. Extract the session token from the cookie header
    let token = session_token(req.headers()).ok_or(StatusCode::UNAUTHORIZED)?;

    // 2. Resolve it against the in-memory registry
    let identity = state.sessions.resolve(token).await.map_err(|e| {
        debug!("Rejected request without a live session: {}", e);
        StatusCode::UNAUTHORIZED
    })?;

    // 3. Insert the identity into request extensions
    req.extensions_mut().insert(identity);

    // 4. Continue to the handler
    Ok(next.run(req).await)
}
