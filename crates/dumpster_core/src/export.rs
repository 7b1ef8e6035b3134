//! crates/dumpster_core/src/export.rs
//!
//! Renders reports as CSV. Detection counts are flattened into one column per
//! label, unioned over every report in the exported set.

use std::collections::BTreeSet;

use chrono::SecondsFormat;

use crate::domain::Report;
use crate::ports::{PortError, PortResult};

/// Which columns an export carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportLayout {
    /// `location, <labels>, timestamp`: the receipt handed out right after an upload.
    Submission,
    /// `id, location, <labels>, timestamp, accepted, accepted_by, accepted_at`.
    Full,
}

/// Renders `reports` as a CSV document. Labels a report lacks render as empty cells.
pub fn render_csv(reports: &[Report], layout: ExportLayout) -> PortResult<String> {
    let labels: BTreeSet<&str> = reports
        .iter()
        .flat_map(|r| r.detection_counts.keys().map(String::as_str))
        .collect();

    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header: Vec<&str> = Vec::with_capacity(labels.len() + 6);
    if layout == ExportLayout::Full {
        header.push("id");
    }
    header.push("location");
    header.extend(labels.iter().copied());
    header.push("timestamp");
    if layout == ExportLayout::Full {
        header.extend(["accepted", "accepted_by", "accepted_at"]);
    }
    writer.write_record(&header).map_err(render_error)?;

    for report in reports {
        let mut row: Vec<String> = Vec::with_capacity(header.len());
        if layout == ExportLayout::Full {
            row.push(report.id.to_string());
        }
        row.push(report.location.clone());
        for label in &labels {
            row.push(
                report
                    .detection_counts
                    .get(*label)
                    .map(u32::to_string)
                    .unwrap_or_default(),
            );
        }
        row.push(
            report
                .created_at
                .to_rfc3339_opts(SecondsFormat::Secs, true),
        );
        if layout == ExportLayout::Full {
            row.push(report.accepted().to_string());
            row.push(report.accepted_by().unwrap_or_default().to_string());
            row.push(
                report
                    .accepted_at()
                    .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true))
                    .unwrap_or_default(),
            );
        }
        writer.write_record(&row).map_err(render_error)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| PortError::StorageUnavailable(format!("failed to flush export: {e}")))?;
    String::from_utf8(bytes)
        .map_err(|e| PortError::StorageUnavailable(format!("export is not UTF-8: {e}")))
}

fn render_error(e: csv::Error) -> PortError {
    PortError::StorageUnavailable(format!("failed to render export: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Acceptance, DetectionCounts};
    use chrono::{TimeZone, Utc};

    fn report(id: i64, location: &str, counts: &[(&str, u32)]) -> Report {
        Report {
            id,
            submitter_email: "asha@example.com".to_string(),
            submitter_name: "Asha".to_string(),
            location: location.to_string(),
            image_path: format!("uploads/{id}.png"),
            detection_counts: counts
                .iter()
                .map(|(l, c)| (l.to_string(), *c))
                .collect::<DetectionCounts>(),
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap(),
            acceptance: None,
        }
    }

    #[test]
    fn labels_are_unioned_across_rows() {
        let reports = vec![
            report(1, "MG Road", &[("plastic", 2)]),
            report(2, "Church Street", &[("can", 1)]),
        ];

        let csv = render_csv(&reports, ExportLayout::Submission).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines[0], "location,can,plastic,timestamp");
        assert_eq!(lines[1], "MG Road,,2,2024-03-01T09:30:00Z");
        assert_eq!(lines[2], "Church Street,1,,2024-03-01T09:30:00Z");
    }

    #[test]
    fn full_layout_carries_acceptance() {
        let mut accepted = report(7, "Indiranagar, 5th Cross", &[("plastic", 1)]);
        accepted.acceptance = Some(Acceptance {
            by: "ngo@example.org".to_string(),
            at: Utc.with_ymd_and_hms(2024, 3, 2, 12, 0, 0).unwrap(),
        });
        let pending = report(8, "Koramangala", &[]);

        let csv = render_csv(&[accepted, pending], ExportLayout::Full).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(
            lines[0],
            "id,location,plastic,timestamp,accepted,accepted_by,accepted_at"
        );
        assert_eq!(
            lines[1],
            "7,\"Indiranagar, 5th Cross\",1,2024-03-01T09:30:00Z,true,ngo@example.org,2024-03-02T12:00:00Z"
        );
        assert_eq!(lines[2], "8,Koramangala,,2024-03-01T09:30:00Z,false,,");
    }

    #[test]
    fn empty_set_renders_header_only() {
        let csv = render_csv(&[], ExportLayout::Full).unwrap();
        assert_eq!(
            csv,
            "id,location,timestamp,accepted,accepted_by,accepted_at\n"
        );
    }
}
