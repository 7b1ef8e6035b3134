//! In-memory stand-ins for the ports, used by the unit tests of this crate.

use async_trait::async_trait;
use chrono::Utc;
use image::{Rgb, RgbImage};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::annotate::encode_png;
use crate::domain::{Acceptance, BoundingBox, Detection, Identity, ImageUpload, NewReport, Report, Role};
use crate::ports::{
    DetectionService, ImageStore, NotificationSink, PortError, PortResult, ReportRepository,
};

#[derive(Default)]
pub struct InMemoryStore {
    rows: Mutex<Vec<Report>>,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    pub fn all(&self) -> Vec<Report> {
        self.rows.lock().unwrap().clone()
    }

    /// Makes every later `create` fail as if the database were down.
    pub fn go_offline(&self) {
        self.unavailable.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ReportRepository for InMemoryStore {
    async fn create(&self, report: NewReport) -> PortResult<Report> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PortError::StorageUnavailable("database is down".to_string()));
        }
        let mut rows = self.rows.lock().unwrap();
        let id = rows.last().map_or(1, |r| r.id + 1);
        let created = Report {
            id,
            submitter_email: report.submitter_email,
            submitter_name: report.submitter_name,
            location: report.location,
            image_path: report.image_path,
            detection_counts: report.detection_counts,
            created_at: Utc::now(),
            acceptance: None,
        };
        rows.push(created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, id: i64) -> PortResult<Report> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Report {id} not found")))
    }

    async fn find_by_submitter(&self, email: &str) -> PortResult<Vec<Report>> {
        Ok(self
            .all()
            .into_iter()
            .filter(|r| r.submitter_email == email)
            .collect())
    }

    async fn find_pending(&self) -> PortResult<Vec<Report>> {
        Ok(self.all().into_iter().filter(|r| !r.accepted()).collect())
    }

    async fn find_all(&self) -> PortResult<Vec<Report>> {
        Ok(self.all())
    }

    async fn accept(&self, id: i64, organization_email: &str) -> PortResult<Report> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| PortError::NotFound(format!("Report {id} not found")))?;
        row.acceptance = Some(Acceptance {
            by: organization_email.to_string(),
            at: Utc::now(),
        });
        Ok(row.clone())
    }
}

/// Returns the same detections for every image, or fails when empty-handed.
pub struct ScriptedDetector {
    detections: Option<Vec<Detection>>,
}

#[async_trait]
impl DetectionService for ScriptedDetector {
    async fn detect(&self, _image: &RgbImage) -> PortResult<Vec<Detection>> {
        self.detections
            .clone()
            .ok_or_else(|| PortError::DetectionFailed("model unavailable".to_string()))
    }
}

#[derive(Default)]
pub struct MemoryImages {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryImages {
    pub fn contains(&self, path: &str) -> bool {
        self.files.lock().unwrap().contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.files.lock().unwrap().len()
    }
}

#[async_trait]
impl ImageStore for MemoryImages {
    async fn save(&self, file_name: &str, bytes: &[u8]) -> PortResult<String> {
        let path = format!("uploads/{file_name}");
        self.files
            .lock()
            .unwrap()
            .insert(path.clone(), bytes.to_vec());
        Ok(path)
    }

    async fn load(&self, path: &str) -> PortResult<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Image {path} not found")))
    }

    async fn remove(&self, path: &str) -> PortResult<()> {
        self.files.lock().unwrap().remove(path);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String, String)>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(String, String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    async fn notify(&self, email: &str, subject: &str, message: &str) {
        self.sent
            .lock()
            .unwrap()
            .push((email.to_string(), subject.to_string(), message.to_string()));
    }
}

pub struct Fixture {
    pub store: Arc<InMemoryStore>,
    pub detector: Arc<ScriptedDetector>,
    pub images: Arc<MemoryImages>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Fixture {
    pub fn with_labels(names: &[&str]) -> Self {
        Self::build(Some(labels(names)))
    }

    pub fn failing_detector() -> Self {
        Self::build(None)
    }

    fn build(detections: Option<Vec<Detection>>) -> Self {
        Self {
            store: Arc::new(InMemoryStore::default()),
            detector: Arc::new(ScriptedDetector { detections }),
            images: Arc::new(MemoryImages::default()),
            notifier: Arc::new(RecordingNotifier::default()),
        }
    }
}

/// Detections with a small box each, so annotation has something to draw.
pub fn labels(names: &[&str]) -> Vec<Detection> {
    names
        .iter()
        .map(|name| Detection {
            label: name.to_string(),
            bbox: Some(BoundingBox {
                x_min: 0.1,
                y_min: 0.1,
                x_max: 0.6,
                y_max: 0.6,
            }),
        })
        .collect()
}

pub fn png_upload(file_name: &str) -> ImageUpload {
    let image = RgbImage::from_pixel(32, 24, Rgb([120, 110, 90]));
    ImageUpload {
        file_name: file_name.to_string(),
        bytes: encode_png(&image).unwrap(),
    }
}

pub fn common_user(email: &str) -> Identity {
    Identity {
        role: Role::CommonUser,
        email: email.to_string(),
        display_name: Some("Asha".to_string()),
    }
}

pub fn organization(email: &str) -> Identity {
    Identity {
        role: Role::Organization,
        email: email.to_string(),
        display_name: None,
    }
}
