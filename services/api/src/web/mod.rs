pub mod auth;
pub mod middleware;
pub mod rest;
pub mod state;

pub use middleware::require_auth;
pub use rest::ApiDoc;

use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::web::state::AppState;

/// Builds the API router: public auth routes plus the session-protected report routes.
pub fn router(app_state: Arc<AppState>) -> Router {
    // Public routes (no session required)
    let public_routes = Router::new().route("/auth/login", post(auth::login_handler));

    // Protected routes (session required)
    let protected_routes = Router::new()
        .route("/auth/logout", post(auth::logout_handler))
        .route("/auth/me", get(auth::me_handler))
        .route("/reports", post(rest::submit_report_handler))
        .route("/reports/mine", get(rest::list_own_reports_handler))
        .route("/reports/mine/export.csv", get(rest::export_own_reports_handler))
        .route("/reports/pending", get(rest::list_pending_reports_handler))
        .route("/reports/export.csv", get(rest::export_all_reports_handler))
        .route("/reports/{id}", get(rest::get_report_handler))
        .route("/reports/{id}/image", get(rest::report_image_handler))
        .route("/reports/{id}/accept", post(rest::accept_report_handler))
        .route("/reports/{id}/export.csv", get(rest::export_report_handler))
        .route("/reports/{id}/receipt.csv", get(rest::report_receipt_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(app_state.config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
