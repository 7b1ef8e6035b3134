//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `ReportRepository` port from the `core` crate. It handles all interactions
//! with the SQLite database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dumpster_core::domain::{Acceptance, DetectionCounts, NewReport, Report};
use dumpster_core::ports::{PortError, PortResult, ReportRepository};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;

const REPORT_COLUMNS: &str = "id, submitter_email, submitter_name, location, image_path, \
     counts_json, created_at, accepted, accepted_by, accepted_at";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `ReportRepository` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: SqlitePool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens (creating if needed) the database at `database_url` in WAL mode, so
    /// readers are not blocked by the single writer SQLite allows.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Ok(Self::new(pool))
    }

    /// Waits for in-flight queries and closes every connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct ReportRecord {
    id: i64,
    submitter_email: String,
    submitter_name: String,
    location: String,
    image_path: String,
    counts_json: String,
    created_at: DateTime<Utc>,
    accepted: bool,
    accepted_by: Option<String>,
    accepted_at: Option<DateTime<Utc>>,
}

impl ReportRecord {
    fn to_domain(self) -> PortResult<Report> {
        let detection_counts: DetectionCounts =
            serde_json::from_str(&self.counts_json).map_err(|e| {
                PortError::StorageUnavailable(format!(
                    "Report {} has unreadable counts: {}",
                    self.id, e
                ))
            })?;

        let acceptance = match (self.accepted, self.accepted_by, self.accepted_at) {
            (false, _, _) => None,
            (true, Some(by), Some(at)) => Some(Acceptance { by, at }),
            (true, _, _) => {
                return Err(PortError::StorageUnavailable(format!(
                    "Report {} is accepted but lacks acceptance details",
                    self.id
                )))
            }
        };

        Ok(Report {
            id: self.id,
            submitter_email: self.submitter_email,
            submitter_name: self.submitter_name,
            location: self.location,
            image_path: self.image_path,
            detection_counts,
            created_at: self.created_at,
            acceptance,
        })
    }
}

fn to_domain_all(records: Vec<ReportRecord>) -> PortResult<Vec<Report>> {
    records.into_iter().map(ReportRecord::to_domain).collect()
}

fn storage_error(e: sqlx::Error) -> PortError {
    PortError::StorageUnavailable(e.to_string())
}

//=========================================================================================
// `ReportRepository` Trait Implementation
//=========================================================================================

#[async_trait]
impl ReportRepository for DbAdapter {
    async fn create(&self, report: NewReport) -> PortResult<Report> {
        let counts_json = serde_json::to_string(&report.detection_counts)
            .map_err(|e| PortError::StorageUnavailable(e.to_string()))?;

        let record = sqlx::query_as::<_, ReportRecord>(&format!(
            "INSERT INTO reports (submitter_email, submitter_name, location, image_path, counts_json, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) RETURNING {REPORT_COLUMNS}"
        ))
        .bind(&report.submitter_email)
        .bind(&report.submitter_name)
        .bind(&report.location)
        .bind(&report.image_path)
        .bind(counts_json)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(storage_error)?;

        record.to_domain()
    }

    async fn find_by_id(&self, id: i64) -> PortResult<Report> {
        let record = sqlx::query_as::<_, ReportRecord>(&format!(
            "SELECT {REPORT_COLUMNS} FROM reports WHERE id = ?1"
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("Report {} not found", id)),
            _ => storage_error(e),
        })?;

        record.to_domain()
    }

    async fn find_by_submitter(&self, email: &str) -> PortResult<Vec<Report>> {
        let records = sqlx::query_as::<_, ReportRecord>(&format!(
            "SELECT {REPORT_COLUMNS} FROM reports WHERE submitter_email = ?1 ORDER BY id ASC"
        ))
        .bind(email)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        to_domain_all(records)
    }

    async fn find_pending(&self) -> PortResult<Vec<Report>> {
        let records = sqlx::query_as::<_, ReportRecord>(&format!(
            "SELECT {REPORT_COLUMNS} FROM reports WHERE accepted = 0 ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        to_domain_all(records)
    }

    async fn find_all(&self) -> PortResult<Vec<Report>> {
        let records = sqlx::query_as::<_, ReportRecord>(&format!(
            "SELECT {REPORT_COLUMNS} FROM reports ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        to_domain_all(records)
    }

    async fn accept(&self, id: i64, organization_email: &str) -> PortResult<Report> {
        // Single-row update; SQLite serializes concurrent writers.
        let record = sqlx::query_as::<_, ReportRecord>(&format!(
            "UPDATE reports SET accepted = 1, accepted_by = ?1, accepted_at = ?2 \
             WHERE id = ?3 RETURNING {REPORT_COLUMNS}"
        ))
        .bind(organization_email)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| PortError::NotFound(format!("Report {} not found", id)))?;

        record.to_domain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    async fn adapter() -> DbAdapter {
        // Every connection to `sqlite::memory:` is its own database, so keep exactly one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let db = DbAdapter::new(pool);
        db.run_migrations().await.unwrap();
        db
    }

    fn new_report(email: &str, counts: &[(&str, u32)]) -> NewReport {
        NewReport {
            submitter_email: email.to_string(),
            submitter_name: "Asha".to_string(),
            location: "MG Road".to_string(),
            image_path: "uploads/1_dump.png".to_string(),
            detection_counts: counts.iter().map(|(l, c)| (l.to_string(), *c)).collect(),
        }
    }

    #[tokio::test]
    async fn ids_are_unique_and_increasing() {
        let db = adapter().await;
        let mut last = 0;
        for _ in 0..5 {
            let report = db.create(new_report("asha@example.com", &[])).await.unwrap();
            assert!(report.id > last);
            last = report.id;
        }
    }

    #[tokio::test]
    async fn create_round_trips_counts_and_starts_pending() {
        let db = adapter().await;
        let created = db
            .create(new_report("asha@example.com", &[("plastic", 2), ("can", 1)]))
            .await
            .unwrap();

        assert!(!created.accepted());
        assert_eq!(created.accepted_by(), None);

        let fetched = db.find_by_id(created.id).await.unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.detection_counts.get("plastic"), Some(&2));
    }

    #[tokio::test]
    async fn find_by_submitter_ignores_other_submitters() {
        let db = adapter().await;
        let a1 = db.create(new_report("asha@example.com", &[])).await.unwrap();
        db.create(new_report("ravi@example.com", &[])).await.unwrap();
        let a2 = db.create(new_report("asha@example.com", &[])).await.unwrap();

        let ids: Vec<i64> = db
            .find_by_submitter("asha@example.com")
            .await
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![a1.id, a2.id]);
        assert!(db.find_by_submitter("nobody@example.com").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn accept_sets_all_acceptance_fields_and_leaves_pending() {
        let db = adapter().await;
        let first = db.create(new_report("asha@example.com", &[])).await.unwrap();
        let second = db.create(new_report("asha@example.com", &[])).await.unwrap();

        let accepted = db.accept(first.id, "ngo@example.org").await.unwrap();
        assert!(accepted.accepted());
        assert_eq!(accepted.accepted_by(), Some("ngo@example.org"));
        assert!(accepted.accepted_at().is_some());
        assert_eq!(db.find_by_id(first.id).await.unwrap(), accepted);

        let pending: Vec<i64> = db.find_pending().await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(pending, vec![second.id]);
        assert_eq!(db.find_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn accept_unknown_id_is_not_found() {
        let db = adapter().await;
        let report = db.create(new_report("asha@example.com", &[])).await.unwrap();

        assert!(matches!(
            db.accept(report.id + 100, "ngo@example.org").await,
            Err(PortError::NotFound(_))
        ));
        assert!(matches!(
            db.find_by_id(report.id + 100).await,
            Err(PortError::NotFound(_))
        ));
        assert!(!db.find_by_id(report.id).await.unwrap().accepted());
    }

    #[tokio::test]
    async fn reaccept_overwrites_acceptor() {
        let db = adapter().await;
        let report = db.create(new_report("asha@example.com", &[])).await.unwrap();
        db.accept(report.id, "ngo@example.org").await.unwrap();
        let again = db.accept(report.id, "bbmp@example.gov").await.unwrap();
        assert_eq!(again.accepted_by(), Some("bbmp@example.gov"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writes_survive_a_reopen() {
        let path = std::env::temp_dir().join(format!("dumpster-db-{}.db", uuid::Uuid::new_v4()));
        let url = format!("sqlite://{}", path.display());

        let db = Arc::new(DbAdapter::connect(&url, 5).await.unwrap());
        db.run_migrations().await.unwrap();

        let tasks: Vec<_> = (0..40)
            .map(|i| {
                let db = db.clone();
                tokio::spawn(async move {
                    let created = db
                        .create(new_report(&format!("user{i}@example.com"), &[("can", i)]))
                        .await?;
                    db.accept(created.id, &format!("org{i}@example.org")).await
                })
            })
            .collect();

        let mut ids = HashSet::new();
        for task in tasks {
            let report = task.await.unwrap().unwrap();
            assert!(ids.insert(report.id), "id {} handed out twice", report.id);
        }
        db.close().await;
        drop(db);

        let reopened = DbAdapter::connect(&url, 5).await.unwrap();
        reopened.run_migrations().await.unwrap();
        let all = reopened.find_all().await.unwrap();

        assert_eq!(all.len(), 40);
        assert_eq!(all.iter().map(|r| r.id).collect::<HashSet<_>>(), ids);
        for report in &all {
            let i = report.detection_counts["can"];
            assert_eq!(report.submitter_email, format!("user{i}@example.com"));
            assert_eq!(
                report.accepted_by().map(str::to_string),
                Some(format!("org{i}@example.org"))
            );
            assert!(report.accepted_at().is_some());
        }
        assert!(reopened.find_pending().await.unwrap().is_empty());

        reopened.close().await;
        let _ = std::fs::remove_file(&path);
    }
}
