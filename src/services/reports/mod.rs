//! Empty-classroom reports.
//!
//! Students file a report when a class is left without a teacher; staff
//! verify or reject it. Reports are hard-deleted.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use sea_query::{Alias, Expr, Order, Query, SimpleExpr};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::WorkflowConfig;
use crate::interfaces::activity_sink::{ActivityEntry, ActivitySink};
use crate::interfaces::storage_adapter::{StorageAdapter, StorageError};
use crate::services::activity::TracingActivitySink;
use crate::services::build_query;
use crate::services::error::{Result, WorkflowError};
use crate::services::leave_workflow::Actor;
use crate::storage::schema::{Reports, Users};
use crate::storage::{with_deadline, Row};

/// Verification state of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Verified,
    Rejected,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Verified => "verified",
            ReportStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportStatus {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(ReportStatus::Pending),
            "verified" => Ok(ReportStatus::Verified),
            "rejected" => Ok(ReportStatus::Rejected),
            other => Err(WorkflowError::validation(format!(
                "unknown report status '{}'",
                other
            ))),
        }
    }
}

/// A report as stored, with the verifier's display name when known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub id: i64,
    pub reported_at: NaiveDateTime,
    pub class_name: String,
    pub teacher_name: String,
    pub lesson_time: String,
    pub description: String,
    /// Opaque reference to the attached photo.
    pub photo_ref: Option<String>,
    pub status: ReportStatus,
    pub verified_by: Option<i64>,
    pub verified_by_name: Option<String>,
    pub verified_at: Option<NaiveDateTime>,
    pub rejection_note: Option<String>,
}

impl Report {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_i64("id")?,
            reported_at: row.get_datetime("tanggal")?,
            class_name: row.get_str("kelas")?,
            teacher_name: row.get_str("guru")?,
            lesson_time: row.get_str("waktu")?,
            description: row.get_str("keterangan")?,
            photo_ref: row.get_opt_str("foto_base64")?,
            status: row.get_str("status")?.parse()?,
            verified_by: row.get_opt_i64("verified_by")?,
            verified_by_name: row.get_opt_str("verified_by_name")?,
            verified_at: row.get_opt_datetime("verified_at")?,
            rejection_note: row.get_opt_str("rejection_note")?,
        })
    }
}

/// Fields supplied when filing a report.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewReport {
    pub reported_at: NaiveDateTime,
    pub class_name: String,
    pub teacher_name: String,
    pub lesson_time: String,
    pub description: String,
    pub photo_ref: Option<String>,
}

impl NewReport {
    fn validate(&self) -> Result<()> {
        let required = [
            &self.class_name,
            &self.teacher_name,
            &self.lesson_time,
            &self.description,
        ];
        if required.iter().any(|field| field.trim().is_empty()) {
            return Err(WorkflowError::validation(
                "class, teacher, time and description are required",
            ));
        }
        Ok(())
    }
}

const REPORT_COLUMNS: [Reports; 11] = [
    Reports::Id,
    Reports::Tanggal,
    Reports::Kelas,
    Reports::Guru,
    Reports::Waktu,
    Reports::Keterangan,
    Reports::FotoBase64,
    Reports::Status,
    Reports::VerifiedBy,
    Reports::VerifiedAt,
    Reports::RejectionNote,
];

/// Report intake and verification over a storage adapter.
pub struct ReportService {
    storage: Arc<dyn StorageAdapter>,
    activity: Arc<dyn ActivitySink>,
    deadline: Option<Duration>,
}

impl ReportService {
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self {
            storage,
            activity: Arc::new(TracingActivitySink),
            deadline: None,
        }
    }

    pub fn with_config(mut self, config: &WorkflowConfig) -> Self {
        self.deadline = config.deadline();
        self
    }

    pub fn with_activity_sink(mut self, activity: Arc<dyn ActivitySink>) -> Self {
        self.activity = activity;
        self
    }

    fn record(&self, action: &'static str, entity_id: Option<i64>, actor: &Actor, description: String) {
        self.activity.record(ActivityEntry {
            action,
            entity_type: "report",
            entity_id,
            actor_id: actor.id,
            actor_name: actor.name.clone(),
            description,
        });
    }

    /// Reports newest first, optionally narrowed to one status.
    pub async fn list_reports(&self, status: Option<ReportStatus>) -> Result<Vec<Report>> {
        self.load(status, None).await
    }

    pub async fn get_report(&self, id: i64) -> Result<Report> {
        self.load(None, Some(id))
            .await?
            .into_iter()
            .next()
            .ok_or(WorkflowError::NotFound { entity: "report", id })
    }

    async fn load(&self, status: Option<ReportStatus>, id: Option<i64>) -> Result<Vec<Report>> {
        let mut select = Query::select();
        select
            .columns(REPORT_COLUMNS.map(|c| (Reports::Table, c)))
            .expr_as(
                Expr::col((Users::Table, Users::Name)),
                Alias::new("verified_by_name"),
            )
            .from(Reports::Table)
            .left_join(
                Users::Table,
                Expr::col((Users::Table, Users::Id)).equals((Reports::Table, Reports::VerifiedBy)),
            )
            .order_by((Reports::Table, Reports::Tanggal), Order::Desc)
            .order_by((Reports::Table, Reports::Id), Order::Desc);

        if let Some(status) = status {
            select.and_where(Expr::col((Reports::Table, Reports::Status)).eq(status.as_str()));
        }
        if let Some(id) = id {
            select.and_where(Expr::col((Reports::Table, Reports::Id)).eq(id));
        }

        let (sql, params) = build_query(select);
        let rows = self.storage.query(&sql, &params).await?;
        rows.iter().map(Report::from_row).collect()
    }

    /// File a report. It starts `pending`.
    pub async fn create_report(&self, report: NewReport, actor: &Actor) -> Result<i64> {
        report.validate()?;
        let photo = report
            .photo_ref
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(str::to_string);
        let (sql, params) = build_query(
            Query::insert()
                .into_table(Reports::Table)
                .columns([
                    Reports::Tanggal,
                    Reports::Kelas,
                    Reports::Guru,
                    Reports::Waktu,
                    Reports::Keterangan,
                    Reports::FotoBase64,
                ])
                .values_panic([
                    report
                        .reported_at
                        .format("%Y-%m-%d %H:%M:%S")
                        .to_string()
                        .into(),
                    report.class_name.trim().into(),
                    report.teacher_name.trim().into(),
                    report.lesson_time.trim().into(),
                    report.description.trim().into(),
                    photo.into(),
                ])
                .to_owned(),
        );
        let id = self
            .storage
            .execute(&sql, &params)
            .await?
            .last_insert_id
            .ok_or_else(|| {
                WorkflowError::Storage(StorageError::Decode {
                    column: "id".to_string(),
                    reason: "insert did not report a generated identifier".to_string(),
                })
            })?;
        info!(report_id = id, class = %report.class_name.trim(), "Report created");
        self.record(
            "CREATE_REPORT",
            Some(id),
            actor,
            format!("Created report for {}", report.class_name.trim()),
        );
        Ok(id)
    }

    pub async fn delete_report(&self, id: i64, actor: &Actor) -> Result<()> {
        if self.delete(&[id]).await? == 0 {
            return Err(WorkflowError::NotFound { entity: "report", id });
        }
        info!(report_id = id, "Report deleted");
        self.record("DELETE_REPORT", Some(id), actor, format!("Deleted report ID: {}", id));
        Ok(())
    }

    /// Delete many. Returns the number of rows removed.
    pub async fn delete_reports(&self, ids: &[i64], actor: &Actor) -> Result<u64> {
        if ids.is_empty() {
            return Err(WorkflowError::validation("no report ids given"));
        }
        let affected = self.delete(ids).await?;
        info!(requested = ids.len(), affected, "Reports deleted");
        self.record(
            "BULK_DELETE_REPORTS",
            None,
            actor,
            format!("Deleted {} reports", ids.len()),
        );
        Ok(affected)
    }

    /// Set the verification state.
    ///
    /// `verified` and `rejected` stamp the acting verifier and the time;
    /// rejection requires a note. Moving back to `pending` clears all three.
    pub async fn update_status(
        &self,
        id: i64,
        status: ReportStatus,
        note: Option<String>,
        actor: &Actor,
    ) -> Result<()> {
        let note = note
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);
        if status == ReportStatus::Rejected && note.is_none() {
            return Err(WorkflowError::validation("rejection requires a note"));
        }

        let (verified_by, verified_at, note): (SimpleExpr, SimpleExpr, SimpleExpr) = match status {
            ReportStatus::Pending => (
                Option::<i64>::None.into(),
                Option::<String>::None.into(),
                Option::<String>::None.into(),
            ),
            ReportStatus::Verified | ReportStatus::Rejected => {
                (actor.id.into(), Expr::cust("NOW()"), note.into())
            }
        };
        let (sql, params) = build_query(
            Query::update()
                .table(Reports::Table)
                .values([
                    (Reports::Status, status.as_str().into()),
                    (Reports::VerifiedBy, verified_by),
                    (Reports::VerifiedAt, verified_at),
                    (Reports::RejectionNote, note),
                ])
                .and_where(Expr::col(Reports::Id).eq(id))
                .to_owned(),
        );
        with_deadline(self.deadline, async {
            let result = self.storage.execute(&sql, &params).await?;
            // A networked engine reports zero for a row written with identical values
            if result.affected_rows == 0 && !self.exists(id).await? {
                return Err(WorkflowError::NotFound { entity: "report", id });
            }
            Ok(())
        })
        .await?;
        info!(report_id = id, %status, verifier = actor.id, "Report status updated");
        self.record(
            "UPDATE_REPORT_STATUS",
            Some(id),
            actor,
            format!("Updated report status to {}", status),
        );
        Ok(())
    }

    async fn exists(&self, id: i64) -> Result<bool> {
        let (sql, params) = build_query(
            Query::select()
                .column(Reports::Id)
                .from(Reports::Table)
                .and_where(Expr::col(Reports::Id).eq(id))
                .to_owned(),
        );
        Ok(!self.storage.query(&sql, &params).await?.is_empty())
    }

    async fn delete(&self, ids: &[i64]) -> Result<u64> {
        let (sql, params) = build_query(
            Query::delete()
                .from_table(Reports::Table)
                .and_where(Expr::col(Reports::Id).is_in(ids.iter().copied()))
                .to_owned(),
        );
        let affected = with_deadline(self.deadline, self.storage.execute(&sql, &params))
            .await?
            .affected_rows;
        Ok(affected)
    }
}
