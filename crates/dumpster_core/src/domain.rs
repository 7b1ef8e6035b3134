//! crates/dumpster_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Per-label object counts for one submission. Ordered so that rendering is stable.
pub type DetectionCounts = BTreeMap<String, u32>;

/// The role an authenticated actor plays for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    CommonUser,
    Organization,
}

/// The authenticated actor for the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub role: Role,
    pub email: String,
    /// Only present for common users.
    pub display_name: Option<String>,
}

/// What a caller presents to log in.
#[derive(Debug, Clone)]
pub enum Credentials {
    CommonUser { name: String, email: String },
    Organization { email: String, password: String },
}

/// Axis-aligned box in normalized image coordinates (0.0..=1.0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

/// One labeled object instance found in an image.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub label: String,
    pub bbox: Option<BoundingBox>,
}

impl Detection {
    pub fn labeled(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            bbox: None,
        }
    }
}

/// Who accepted a report, and when.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acceptance {
    pub by: String,
    pub at: DateTime<Utc>,
}

/// A report as handed to the store, before it has an id or a creation time.
#[derive(Debug, Clone)]
pub struct NewReport {
    pub submitter_email: String,
    pub submitter_name: String,
    pub location: String,
    pub image_path: String,
    pub detection_counts: DetectionCounts,
}

/// One user-submitted dumpster observation with its detection results.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub id: i64,
    pub submitter_email: String,
    pub submitter_name: String,
    pub location: String,
    pub image_path: String,
    pub detection_counts: DetectionCounts,
    pub created_at: DateTime<Utc>,
    /// `None` until an organization accepts the report.
    pub acceptance: Option<Acceptance>,
}

impl Report {
    pub fn accepted(&self) -> bool {
        self.acceptance.is_some()
    }

    pub fn accepted_by(&self) -> Option<&str> {
        self.acceptance.as_ref().map(|a| a.by.as_str())
    }

    pub fn accepted_at(&self) -> Option<DateTime<Utc>> {
        self.acceptance.as_ref().map(|a| a.at)
    }
}

/// Raw bytes of an uploaded image together with the name it was uploaded under.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}
