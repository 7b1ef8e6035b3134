//! crates/dumpster_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the storage engine, the detection model and the
//! notification channel.

use async_trait::async_trait;
use image::RgbImage;

use crate::domain::{Detection, NewReport, Report};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// The error type for all port and service operations.
/// Every variant is surfaced to the caller as a user-visible message.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Unauthorized: this action is not permitted for the current role")]
    Unauthorized,
    #[error("Unauthenticated: please log in first")]
    Unauthenticated,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("Detection failed: {0}")]
    DetectionFailed(String),
}

impl PortError {
    /// True for faults of the infrastructure rather than mistakes of the caller.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            PortError::StorageUnavailable(_) | PortError::DetectionFailed(_)
        )
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Durable persistence of reports. Implementations return reports in creation order.
#[async_trait]
pub trait ReportRepository: Send + Sync {
    /// Assigns a fresh id and creation time and persists the report.
    async fn create(&self, report: NewReport) -> PortResult<Report>;

    async fn find_by_id(&self, id: i64) -> PortResult<Report>;

    async fn find_by_submitter(&self, email: &str) -> PortResult<Vec<Report>>;

    async fn find_pending(&self) -> PortResult<Vec<Report>>;

    async fn find_all(&self) -> PortResult<Vec<Report>>;

    /// Marks the report as accepted by `organization_email`. Accepting twice
    /// overwrites the previous acceptance.
    async fn accept(&self, id: i64, organization_email: &str) -> PortResult<Report>;
}

#[async_trait]
pub trait DetectionService: Send + Sync {
    /// Finds labeled objects in a decoded RGB image.
    async fn detect(&self, image: &RgbImage) -> PortResult<Vec<Detection>>;
}

#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Persists `bytes` under `file_name` and returns the reference to store on the report.
    async fn save(&self, file_name: &str, bytes: &[u8]) -> PortResult<String>;

    async fn load(&self, path: &str) -> PortResult<Vec<u8>>;

    /// Deletes a saved image. Removing one that is already gone is not an error.
    async fn remove(&self, path: &str) -> PortResult<()>;
}

/// Fire-and-forget delivery hook. There is no delivery guarantee.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, email: &str, subject: &str, message: &str);
}
