//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the report endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::{auth, state::AppState};
use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, Utc};
use dumpster_core::{
    domain::{Identity, ImageUpload, Report},
    ports::PortError,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use utoipa::{OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::login_handler,
        auth::logout_handler,
        auth::me_handler,
        submit_report_handler,
        list_own_reports_handler,
        list_pending_reports_handler,
        get_report_handler,
        report_image_handler,
        accept_report_handler,
        export_report_handler,
        report_receipt_handler,
        export_own_reports_handler,
        export_all_reports_handler,
    ),
    components(
        schemas(ReportResponse, auth::LoginRequest, auth::IdentityResponse, auth::RoleDto)
    ),
    tags(
        (name = "Dumpster Reports API", description = "Upload dumpster photos, track reports and accept them for collection.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// A report as returned to clients.
#[derive(Serialize, ToSchema, Debug)]
pub struct ReportResponse {
    pub id: i64,
    pub submitter_email: String,
    pub submitter_name: String,
    pub location: String,
    pub image_path: String,
    pub detection_counts: BTreeMap<String, u32>,
    pub created_at: DateTime<Utc>,
    pub accepted: bool,
    pub accepted_by: Option<String>,
    pub accepted_at: Option<DateTime<Utc>>,
}

impl From<Report> for ReportResponse {
    fn from(report: Report) -> Self {
        let accepted = report.accepted();
        let (accepted_by, accepted_at) = match report.acceptance {
            Some(a) => (Some(a.by), Some(a.at)),
            None => (None, None),
        };
        Self {
            id: report.id,
            submitter_email: report.submitter_email,
            submitter_name: report.submitter_name,
            location: report.location,
            image_path: report.image_path,
            detection_counts: report.detection_counts,
            created_at: report.created_at,
            accepted,
            accepted_by,
            accepted_at,
        }
    }
}

fn to_responses(reports: Vec<Report>) -> Json<Vec<ReportResponse>> {
    Json(reports.into_iter().map(ReportResponse::from).collect())
}

/// Maps a core error onto the status code and message shown to the user.
pub fn port_error_response(e: PortError) -> (StatusCode, String) {
    let status = match e {
        PortError::Unauthenticated | PortError::InvalidCredentials => StatusCode::UNAUTHORIZED,
        PortError::Unauthorized => StatusCode::FORBIDDEN,
        PortError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        PortError::NotFound(_) => StatusCode::NOT_FOUND,
        PortError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        PortError::DetectionFailed(_) => StatusCode::BAD_GATEWAY,
    };
    (status, e.to_string())
}

fn csv_attachment(file_name: String, body: String) -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        body,
    )
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Upload a dumpster photo and run detection on it.
///
/// Accepts a multipart/form-data request with an `image` file part and a
/// `location` text part.
#[utoipa::path(
    post,
    path = "/reports",
    request_body(content_type = "multipart/form-data", description = "`image` file and `location` text."),
    responses(
        (status = 201, description = "Report created", body = ReportResponse),
        (status = 400, description = "Missing location or undecodable image"),
        (status = 403, description = "Only common users may submit"),
        (status = 502, description = "Detection failed")
    )
)]
pub async fn submit_report_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let mut upload: Option<ImageUpload> = None;
    let mut location = String::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (e.status(), e.body_text()))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("image") => {
                let file_name = field.file_name().unwrap_or("upload.jpg").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| (e.status(), e.body_text()))?;
                upload = Some(ImageUpload {
                    file_name,
                    bytes: bytes.to_vec(),
                });
            }
            Some("location") => {
                location = field
                    .text()
                    .await
                    .map_err(|e| (e.status(), e.body_text()))?;
            }
            _ => {}
        }
    }

    let upload = upload.ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            "Multipart form must include an image".to_string(),
        )
    })?;

    let report = app_state
        .reports
        .submit(&identity, upload, &location)
        .await
        .map_err(port_error_response)?;

    Ok((StatusCode::CREATED, Json(ReportResponse::from(report))))
}

/// Reports submitted by the logged-in user.
#[utoipa::path(
    get,
    path = "/reports/mine",
    responses(
        (status = 200, description = "The caller's reports, oldest first", body = [ReportResponse]),
        (status = 403, description = "Only common users have own reports")
    )
)]
pub async fn list_own_reports_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<ReportResponse>>, (StatusCode, String)> {
    app_state
        .reports
        .list_own(&identity)
        .await
        .map(to_responses)
        .map_err(port_error_response)
}

/// Reports no organization has accepted yet.
#[utoipa::path(
    get,
    path = "/reports/pending",
    responses(
        (status = 200, description = "Pending reports, oldest first", body = [ReportResponse]),
        (status = 403, description = "Only organizations see pending reports")
    )
)]
pub async fn list_pending_reports_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<ReportResponse>>, (StatusCode, String)> {
    app_state
        .reports
        .list_pending(&identity)
        .await
        .map(to_responses)
        .map_err(port_error_response)
}

#[utoipa::path(
    get,
    path = "/reports/{id}",
    params(("id" = i64, Path, description = "Report id")),
    responses(
        (status = 200, description = "The report", body = ReportResponse),
        (status = 403, description = "Not the submitter"),
        (status = 404, description = "No such report")
    )
)]
pub async fn get_report_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<Json<ReportResponse>, (StatusCode, String)> {
    app_state
        .reports
        .get(&identity, id)
        .await
        .map(|r| Json(r.into()))
        .map_err(port_error_response)
}

/// The photo with detection boxes drawn on it.
#[utoipa::path(
    get,
    path = "/reports/{id}/image",
    params(("id" = i64, Path, description = "Report id")),
    responses(
        (status = 200, description = "PNG image", content_type = "image/png"),
        (status = 404, description = "No such report or image")
    )
)]
pub async fn report_image_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let bytes = app_state
        .reports
        .annotated_image(&identity, id)
        .await
        .map_err(port_error_response)?;
    Ok(([(header::CONTENT_TYPE, "image/png")], bytes))
}

/// Accept a report for collection. The submitter is notified.
#[utoipa::path(
    post,
    path = "/reports/{id}/accept",
    params(("id" = i64, Path, description = "Report id")),
    responses(
        (status = 200, description = "Accepted report", body = ReportResponse),
        (status = 403, description = "Only organizations may accept"),
        (status = 404, description = "No such report")
    )
)]
pub async fn accept_report_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<Json<ReportResponse>, (StatusCode, String)> {
    app_state
        .reports
        .accept(&identity, id)
        .await
        .map(|r| Json(r.into()))
        .map_err(port_error_response)
}

#[utoipa::path(
    get,
    path = "/reports/{id}/export.csv",
    params(("id" = i64, Path, description = "Report id")),
    responses((status = 200, description = "One report as CSV", content_type = "text/csv"))
)]
pub async fn export_report_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let body = app_state
        .reports
        .export_one(&identity, id)
        .await
        .map_err(port_error_response)?;
    Ok(csv_attachment(format!("req_{}.csv", id), body))
}

/// The short receipt offered right after an upload.
#[utoipa::path(
    get,
    path = "/reports/{id}/receipt.csv",
    params(("id" = i64, Path, description = "Report id")),
    responses((status = 200, description = "Location, counts and timestamp as CSV", content_type = "text/csv"))
)]
pub async fn report_receipt_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let body = app_state
        .reports
        .receipt(&identity, id)
        .await
        .map_err(port_error_response)?;
    Ok(csv_attachment("report.csv".to_string(), body))
}

#[utoipa::path(
    get,
    path = "/reports/mine/export.csv",
    responses((status = 200, description = "The caller's reports as CSV", content_type = "text/csv"))
)]
pub async fn export_own_reports_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let body = app_state
        .reports
        .export_own(&identity)
        .await
        .map_err(port_error_response)?;
    Ok(csv_attachment("my_requests.csv".to_string(), body))
}

#[utoipa::path(
    get,
    path = "/reports/export.csv",
    responses(
        (status = 200, description = "Every report as CSV", content_type = "text/csv"),
        (status = 403, description = "Only organizations may export everything")
    )
)]
pub async fn export_all_reports_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let body = app_state
        .reports
        .export_all(&identity)
        .await
        .map_err(port_error_response)?;
    Ok(csv_attachment("all_requests.csv".to_string(), body))
}
