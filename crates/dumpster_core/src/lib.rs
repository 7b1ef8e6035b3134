pub mod annotate;
pub mod domain;
pub mod export;
pub mod identity;
pub mod ports;
pub mod service;

#[cfg(test)]
mod test_support;

pub use domain::{
    Acceptance, BoundingBox, Credentials, Detection, DetectionCounts, Identity, ImageUpload,
    NewReport, Report, Role,
};
pub use export::{render_csv, ExportLayout};
pub use identity::{authenticate, OrganizationDirectory};
pub use ports::{
    DetectionService, ImageStore, NotificationSink, PortError, PortResult, ReportRepository,
};
pub use service::{count_detections, ReportService};
