//! crates/dumpster_core/src/service.rs
//!
//! The Report Service: mediates between the detection model, the image store,
//! the report store and the notification sink, and decides which role may do what.

use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinError;
use tracing::{error, info};

use crate::annotate;
use crate::domain::{
    Detection, DetectionCounts, Identity, ImageUpload, NewReport, Report, Role,
};
use crate::export::{render_csv, ExportLayout};
use crate::ports::{
    DetectionService, ImageStore, NotificationSink, PortError, PortResult, ReportRepository,
};

const UPLOAD_SUBJECT: &str = "New dumpster upload";
const ACCEPTED_SUBJECT: &str = "Your dumpster request has been accepted";

/// Tallies detections per label. The result does not depend on detection order.
pub fn count_detections(detections: &[Detection]) -> DetectionCounts {
    let mut counts = DetectionCounts::new();
    for detection in detections {
        *counts.entry(detection.label.clone()).or_insert(0) += 1;
    }
    counts
}

pub struct ReportService {
    store: Arc<dyn ReportRepository>,
    detector: Arc<dyn DetectionService>,
    images: Arc<dyn ImageStore>,
    notifier: Arc<dyn NotificationSink>,
    /// Addresses told about every new upload.
    upload_watchers: Vec<String>,
}

impl ReportService {
    pub fn new(
        store: Arc<dyn ReportRepository>,
        detector: Arc<dyn DetectionService>,
        images: Arc<dyn ImageStore>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            store,
            detector,
            images,
            notifier,
            upload_watchers: Vec::new(),
        }
    }

    pub fn with_upload_watchers(mut self, watchers: Vec<String>) -> Self {
        self.upload_watchers = watchers;
        self
    }

    /// Runs detection on an uploaded image and files a new report for it.
    pub async fn submit(
        &self,
        identity: &Identity,
        upload: ImageUpload,
        location: &str,
    ) -> PortResult<Report> {
        identity.require(Role::CommonUser)?;
        let location = location.trim();
        if location.is_empty() {
            return Err(PortError::InvalidInput(
                "location of the dumpster is required".to_string(),
            ));
        }

        let ImageUpload { file_name, bytes } = upload;
        let image = tokio::task::spawn_blocking(move || annotate::decode_rgb(&bytes))
            .await
            .map_err(|e| worker_failed("decode", e))
            .and_then(|decoded| decoded)
            .inspect_err(|e| log_fault("decode", None, e))?;

        let detections = self
            .detector
            .detect(&image)
            .await
            .inspect_err(|e| log_fault("detect", None, e))?;
        let detection_counts = count_detections(&detections);

        let annotated = tokio::task::spawn_blocking(move || {
            let mut image = image;
            annotate::draw_detections(&mut image, &detections);
            annotate::encode_png(&image)
        })
        .await
        .map_err(|e| worker_failed("annotate", e))
        .and_then(|encoded| encoded)
        .inspect_err(|e| log_fault("annotate", None, e))?;

        let image_path = self
            .images
            .save(&stored_file_name(&file_name, Utc::now()), &annotated)
            .await
            .inspect_err(|e| log_fault("save_image", None, e))?;

        let submitter_name = identity.display_name.clone().unwrap_or_default();
        let created = self
            .store
            .create(NewReport {
                submitter_email: identity.email.clone(),
                submitter_name: submitter_name.clone(),
                location: location.to_string(),
                image_path: image_path.clone(),
                detection_counts,
            })
            .await
            .inspect_err(|e| log_fault("create", None, e));
        let report = match created {
            Ok(report) => report,
            Err(e) => {
                // No report will ever point at the image.
                if let Err(cleanup) = self.images.remove(&image_path).await {
                    log_fault("remove_image", None, &cleanup);
                }
                return Err(e);
            }
        };

        info!(
            report_id = report.id,
            labels = report.detection_counts.len(),
            "report submitted"
        );

        let message = format!("{submitter_name} uploaded at {location}.");
        for watcher in &self.upload_watchers {
            self.notifier.notify(watcher, UPLOAD_SUBJECT, &message).await;
        }

        Ok(report)
    }

    /// Reports submitted by the calling common user, oldest first.
    pub async fn list_own(&self, identity: &Identity) -> PortResult<Vec<Report>> {
        identity.require(Role::CommonUser)?;
        self.store
            .find_by_submitter(&identity.email)
            .await
            .inspect_err(|e| log_fault("find_by_submitter", None, e))
    }

    pub async fn list_pending(&self, identity: &Identity) -> PortResult<Vec<Report>> {
        identity.require(Role::Organization)?;
        self.store
            .find_pending()
            .await
            .inspect_err(|e| log_fault("find_pending", None, e))
    }

    /// Claims a report for collection and tells the submitter about it.
    pub async fn accept(&self, identity: &Identity, report_id: i64) -> PortResult<Report> {
        identity.require(Role::Organization)?;
        let report = self
            .store
            .accept(report_id, &identity.email)
            .await
            .inspect_err(|e| log_fault("accept", Some(report_id), e))?;

        info!(report_id, accepted_by = %identity.email, "report accepted");

        self.notifier
            .notify(
                &report.submitter_email,
                ACCEPTED_SUBJECT,
                &format!(
                    "Your request at {} will be collected by {}.",
                    report.location, identity.email
                ),
            )
            .await;

        Ok(report)
    }

    /// A single report, visible to its submitter and to any organization.
    pub async fn get(&self, identity: &Identity, report_id: i64) -> PortResult<Report> {
        let report = self
            .store
            .find_by_id(report_id)
            .await
            .inspect_err(|e| log_fault("find_by_id", Some(report_id), e))?;
        ensure_visible(identity, &report)?;
        Ok(report)
    }

    pub async fn annotated_image(&self, identity: &Identity, report_id: i64) -> PortResult<Vec<u8>> {
        let report = self.get(identity, report_id).await?;
        self.images
            .load(&report.image_path)
            .await
            .inspect_err(|e| log_fault("load_image", Some(report_id), e))
    }

    pub async fn export_one(&self, identity: &Identity, report_id: i64) -> PortResult<String> {
        let report = self.get(identity, report_id).await?;
        render_csv(std::slice::from_ref(&report), ExportLayout::Full)
            .inspect_err(|e| log_fault("export", Some(report_id), e))
    }

    /// The short receipt a submitter can download right after uploading.
    pub async fn receipt(&self, identity: &Identity, report_id: i64) -> PortResult<String> {
        let report = self.get(identity, report_id).await?;
        render_csv(std::slice::from_ref(&report), ExportLayout::Submission)
            .inspect_err(|e| log_fault("export", Some(report_id), e))
    }

    pub async fn export_own(&self, identity: &Identity) -> PortResult<String> {
        let reports = self.list_own(identity).await?;
        render_csv(&reports, ExportLayout::Full).inspect_err(|e| log_fault("export", None, e))
    }

    pub async fn export_all(&self, identity: &Identity) -> PortResult<String> {
        identity.require(Role::Organization)?;
        let reports = self
            .store
            .find_all()
            .await
            .inspect_err(|e| log_fault("find_all", None, e))?;
        render_csv(&reports, ExportLayout::Full).inspect_err(|e| log_fault("export", None, e))
    }
}

fn ensure_visible(identity: &Identity, report: &Report) -> PortResult<()> {
    match identity.role {
        Role::Organization => Ok(()),
        Role::CommonUser if report.submitter_email == identity.email => Ok(()),
        Role::CommonUser => Err(PortError::Unauthorized),
    }
}

fn log_fault(operation: &str, report_id: Option<i64>, err: &PortError) {
    if err.is_infrastructure() {
        error!(operation, report_id, error = %err, "infrastructure fault");
    }
}

/// A blocking image worker that panicked or was cancelled. Nothing the user sent
/// can cause this, so it is reported as a server-side fault.
fn worker_failed(stage: &str, e: JoinError) -> PortError {
    PortError::StorageUnavailable(format!("{stage} worker failed: {e}"))
}

/// `<unix-millis>_<stem>.png`, with the stem reduced to filesystem-safe characters.
fn stored_file_name(original: &str, now: DateTime<Utc>) -> String {
    let stem: String = Path::new(original)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(64)
        .collect();
    let stem = if stem.is_empty() { "upload".to_string() } else { stem };
    format!("{}_{}.png", now.timestamp_millis(), stem)
}
