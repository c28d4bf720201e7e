//! Teacher leave workflow.
//!
//! Submission writes one leave row and all of its class assignments
//! atomically. Approval and rejection move a pending leave to a decided
//! state. Notifying the last outstanding assignment of an approved leave
//! moves the leave to `notified`.

mod model;

pub use model::{
    Actor, ClassAssignment, LeaveFilter, LeaveStatus, LeaveType, NewAssignment, NewLeave,
    NotificationStatus, NotifyOutcome, TeacherLeave,
};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sea_query::{Alias, Expr, Order, Query};
use tracing::{debug, info, warn};

use crate::config::WorkflowConfig;
use crate::interfaces::activity_sink::{ActivityEntry, ActivitySink};
use crate::interfaces::storage_adapter::{Executor, RawConnection, StorageAdapter, StorageError};
use crate::services::activity::TracingActivitySink;
use crate::services::build_query;
use crate::services::error::{Result, WorkflowError};
use crate::storage::schema::{ClassAssignments, TeacherLeaves, Teachers};
use crate::storage::with_deadline;

/// Locks the parent leave row before any read in the notify transaction,
/// so concurrent notifications under one leave run one after another.
const LOCK_PARENT_LEAVE: &str = "UPDATE teacher_leaves SET status = status \
     WHERE id = (SELECT leave_id FROM class_assignments WHERE id = ?)";

const ASSIGNMENT_COLUMNS: [ClassAssignments; 12] = [
    ClassAssignments::Id,
    ClassAssignments::LeaveId,
    ClassAssignments::KelasId,
    ClassAssignments::NamaKelas,
    ClassAssignments::JamPelajaran,
    ClassAssignments::MataPelajaran,
    ClassAssignments::GuruPengganti,
    ClassAssignments::GuruPenggantiId,
    ClassAssignments::Tugas,
    ClassAssignments::StatusPenyampaian,
    ClassAssignments::WaktuDisampaikan,
    ClassAssignments::DisampaikanOleh,
];

const LEAVE_COLUMNS: [TeacherLeaves; 14] = [
    TeacherLeaves::Id,
    TeacherLeaves::GuruId,
    TeacherLeaves::TanggalMulai,
    TeacherLeaves::TanggalSelesai,
    TeacherLeaves::JenisIzin,
    TeacherLeaves::Alasan,
    TeacherLeaves::NomorSurat,
    TeacherLeaves::FileSurat,
    TeacherLeaves::Status,
    TeacherLeaves::DisetujuiOleh,
    TeacherLeaves::DisetujuiOlehNama,
    TeacherLeaves::TanggalDisetujui,
    TeacherLeaves::Catatan,
    TeacherLeaves::CreatedAt,
];

/// How `submit` obtains its transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SubmitMode {
    /// The adapter's closure transaction.
    #[default]
    Transaction,
    /// A raw connection with explicit begin/commit/rollback. Falls back to
    /// `Transaction` on backends that do not hand out raw connections.
    ManualConnection,
}

/// Leave request state machine over a storage adapter.
pub struct LeaveWorkflow {
    storage: Arc<dyn StorageAdapter>,
    activity: Arc<dyn ActivitySink>,
    deadline: Option<Duration>,
    submit_mode: SubmitMode,
}

impl LeaveWorkflow {
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self {
            storage,
            activity: Arc::new(TracingActivitySink),
            deadline: None,
            submit_mode: SubmitMode::default(),
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

    pub fn with_submit_mode(mut self, mode: SubmitMode) -> Self {
        self.submit_mode = mode;
        self
    }

    /// Submit a leave request with its class assignments.
    ///
    /// Returns the new leave id. Nothing is persisted unless every row is.
    pub async fn submit(&self, leave: NewLeave, actor: &Actor) -> Result<i64> {
        leave.validate()?;

        let leave_id = with_deadline(self.deadline, self.submit_atomically(&leave)).await?;

        info!(
            leave_id,
            teacher_id = leave.teacher_id,
            assignments = leave.assignments.len(),
            "Teacher leave submitted"
        );
        self.activity.record(ActivityEntry {
            action: "CREATE_TEACHER_LEAVE",
            entity_type: "teacher_leave",
            entity_id: Some(leave_id),
            actor_id: actor.id,
            actor_name: actor.name.clone(),
            description: format!(
                "{} leave {} to {} with {} class assignment(s)",
                leave.leave_type.code(),
                leave.start_date,
                leave.end_date,
                leave.assignments.len()
            ),
        });
        Ok(leave_id)
    }

    async fn submit_atomically(&self, leave: &NewLeave) -> Result<i64> {
        if self.submit_mode == SubmitMode::ManualConnection {
            match self.storage.acquire_connection().await {
                Ok(conn) => return submit_on_connection(conn, leave).await,
                Err(StorageError::Unsupported { backend, .. }) => {
                    debug!(%backend, "Raw connections unsupported; using transaction");
                }
                Err(e) => return Err(e.into()),
            }
        }

        let leave = leave.clone();
        self.storage
            .transaction(move |tx| Box::pin(async move { insert_leave(tx, &leave).await }))
            .await
    }

    /// Approve a pending leave. The note is optional.
    pub async fn approve(&self, leave_id: i64, approver: &Actor, note: Option<String>) -> Result<()> {
        let note = note.filter(|n| !n.trim().is_empty());
        self.decide(leave_id, approver, LeaveStatus::Approved, note)
            .await
    }

    /// Reject a pending leave. A rejection must say why.
    pub async fn reject(&self, leave_id: i64, approver: &Actor, note: &str) -> Result<()> {
        if note.trim().is_empty() {
            return Err(WorkflowError::validation("a rejection requires a note"));
        }
        self.decide(leave_id, approver, LeaveStatus::Rejected, Some(note.to_string()))
            .await
    }

    async fn decide(
        &self,
        leave_id: i64,
        approver: &Actor,
        target: LeaveStatus,
        note: Option<String>,
    ) -> Result<()> {
        let action = match target {
            LeaveStatus::Approved => "approve",
            _ => "reject",
        };

        let (sql, params) = build_query(
            Query::update()
                .table(TeacherLeaves::Table)
                .values([
                    (TeacherLeaves::Status, target.as_str().into()),
                    (TeacherLeaves::DisetujuiOleh, approver.id.into()),
                    (TeacherLeaves::DisetujuiOlehNama, approver.name.clone().into()),
                    (TeacherLeaves::TanggalDisetujui, Expr::cust("NOW()")),
                    (TeacherLeaves::Catatan, note.clone().into()),
                ])
                .and_where(Expr::col(TeacherLeaves::Id).eq(leave_id))
                .and_where(Expr::col(TeacherLeaves::Status).eq(LeaveStatus::Pending.as_str()))
                .to_owned(),
        );

        with_deadline(self.deadline, async {
            let result = self.storage.execute(&sql, &params).await?;
            if result.affected_rows == 0 {
                // Either the leave does not exist or it has left `pending`
                let current = self.current_status(leave_id).await?;
                return Err(WorkflowError::IllegalTransition {
                    id: leave_id,
                    from: current.as_str().to_string(),
                    action,
                });
            }
            Ok(())
        })
        .await?;

        info!(leave_id, status = %target, approver_id = approver.id, "Teacher leave decided");
        let (code, verb) = match target {
            LeaveStatus::Approved => ("APPROVE_TEACHER_LEAVE", "Approved"),
            _ => ("REJECT_TEACHER_LEAVE", "Rejected"),
        };
        self.activity.record(ActivityEntry {
            action: code,
            entity_type: "teacher_leave",
            entity_id: Some(leave_id),
            actor_id: approver.id,
            actor_name: approver.name.clone(),
            description: match note {
                Some(note) => format!("{} leave {}: {}", verb, leave_id, note),
                None => format!("{} leave {}", verb, leave_id),
            },
        });
        Ok(())
    }

    async fn current_status(&self, leave_id: i64) -> Result<LeaveStatus> {
        let (sql, params) = build_query(
            Query::select()
                .column(TeacherLeaves::Status)
                .from(TeacherLeaves::Table)
                .and_where(Expr::col(TeacherLeaves::Id).eq(leave_id))
                .to_owned(),
        );
        let rows = self.storage.query(&sql, &params).await?;
        let row = rows.first().ok_or(WorkflowError::NotFound {
            entity: "teacher leave",
            id: leave_id,
        })?;
        row.get_str("status")?.parse()
    }

    /// Mark one class assignment as passed on to its class.
    ///
    /// Repeating the call on a notified assignment changes nothing. When
    /// the last outstanding assignment of an approved leave is notified the
    /// leave becomes `notified`, exactly once even under concurrent calls.
    pub async fn notify_assignment(
        &self,
        assignment_id: i64,
        notifier: &Actor,
    ) -> Result<NotifyOutcome> {
        let notifier_name = notifier.name.clone();
        let outcome = with_deadline(
            self.deadline,
            self.storage.transaction(move |tx| {
                Box::pin(async move { notify_in(tx, assignment_id, &notifier_name).await })
            }),
        )
        .await?;

        if outcome.already_notified {
            debug!(assignment_id, "Assignment already notified");
            return Ok(outcome);
        }

        info!(
            assignment_id,
            leave_id = outcome.leave_id,
            escalated = outcome.escalated,
            "Class assignment notified"
        );
        self.activity.record(ActivityEntry {
            action: "NOTIFY_ASSIGNMENT",
            entity_type: "class_assignment",
            entity_id: Some(assignment_id),
            actor_id: notifier.id,
            actor_name: notifier.name.clone(),
            description: if outcome.escalated {
                format!(
                    "Notified assignment {}; leave {} fully notified",
                    assignment_id, outcome.leave_id
                )
            } else {
                format!("Notified assignment {}", assignment_id)
            },
        });
        Ok(outcome)
    }

    /// Leaves matching `filter`, newest first, each with its assignments.
    pub async fn list_leaves(&self, filter: LeaveFilter) -> Result<Vec<TeacherLeave>> {
        with_deadline(self.deadline, self.load_leaves(filter, None)).await
    }

    /// One leave with its assignments.
    pub async fn get_leave(&self, leave_id: i64) -> Result<TeacherLeave> {
        let leaves = with_deadline(
            self.deadline,
            self.load_leaves(LeaveFilter::default(), Some(leave_id)),
        )
        .await?;
        leaves.into_iter().next().ok_or(WorkflowError::NotFound {
            entity: "teacher leave",
            id: leave_id,
        })
    }

    async fn load_leaves(
        &self,
        filter: LeaveFilter,
        leave_id: Option<i64>,
    ) -> Result<Vec<TeacherLeave>> {
        let mut select = Query::select();
        select
            .columns(LEAVE_COLUMNS.map(|c| (TeacherLeaves::Table, c)))
            .expr_as(
                Expr::col((Teachers::Table, Teachers::Nama)),
                Alias::new("nama_guru"),
            )
            .column((Teachers::Table, Teachers::Nip))
            .column((Teachers::Table, Teachers::Mapel))
            .from(TeacherLeaves::Table)
            .inner_join(
                Teachers::Table,
                Expr::col((Teachers::Table, Teachers::Id))
                    .equals((TeacherLeaves::Table, TeacherLeaves::GuruId)),
            )
            .order_by((TeacherLeaves::Table, TeacherLeaves::CreatedAt), Order::Desc)
            .order_by((TeacherLeaves::Table, TeacherLeaves::Id), Order::Desc);

        if let Some(id) = leave_id {
            select.and_where(Expr::col((TeacherLeaves::Table, TeacherLeaves::Id)).eq(id));
        }
        if let Some(teacher_id) = filter.teacher_id {
            select.and_where(Expr::col((TeacherLeaves::Table, TeacherLeaves::GuruId)).eq(teacher_id));
        }
        if let Some(status) = filter.status {
            select.and_where(
                Expr::col((TeacherLeaves::Table, TeacherLeaves::Status)).eq(status.as_str()),
            );
        }

        let (sql, params) = build_query(select);
        let rows = self.storage.query(&sql, &params).await?;
        let mut leaves = rows
            .iter()
            .map(TeacherLeave::from_row)
            .collect::<Result<Vec<_>>>()?;
        if leaves.is_empty() {
            return Ok(leaves);
        }

        let ids: Vec<i64> = leaves.iter().map(|l| l.id).collect();
        let (sql, params) = build_query(
            Query::select()
                .columns(ASSIGNMENT_COLUMNS)
                .from(ClassAssignments::Table)
                .and_where(Expr::col(ClassAssignments::LeaveId).is_in(ids))
                .order_by(ClassAssignments::Id, Order::Asc)
                .to_owned(),
        );
        let mut by_leave: HashMap<i64, Vec<ClassAssignment>> = HashMap::new();
        for row in self.storage.query(&sql, &params).await? {
            let assignment = ClassAssignment::from_row(&row)?;
            by_leave.entry(assignment.leave_id).or_default().push(assignment);
        }
        for leave in &mut leaves {
            leave.assignments = by_leave.remove(&leave.id).unwrap_or_default();
        }
        Ok(leaves)
    }
}

/// Run the submission inside a caller-managed transaction on a raw connection.
async fn submit_on_connection(mut conn: Box<dyn RawConnection>, leave: &NewLeave) -> Result<i64> {
    if let Err(e) = conn.begin().await {
        release_quietly(conn).await;
        return Err(e.into());
    }

    let inserted = insert_leave(conn.as_executor(), leave).await;
    let outcome = match inserted {
        Ok(id) => conn.commit().await.map(|_| id).map_err(WorkflowError::from),
        Err(e) => Err(e),
    };
    if outcome.is_err() {
        if let Err(rollback_err) = conn.rollback().await {
            warn!(error = %rollback_err, "Rollback failed on raw connection");
        }
    }
    release_quietly(conn).await;
    outcome
}

async fn release_quietly(conn: Box<dyn RawConnection>) {
    if let Err(e) = conn.release().await {
        warn!(error = %e, "Failed to release raw connection");
    }
}

/// Insert the leave and its assignments through one executor.
async fn insert_leave(exec: &mut dyn Executor, leave: &NewLeave) -> Result<i64> {
    let (sql, params) = build_query(
        Query::select()
            .column(Teachers::Id)
            .from(Teachers::Table)
            .and_where(Expr::col(Teachers::Id).eq(leave.teacher_id))
            .and_where(Expr::col(Teachers::IsActive).eq(true))
            .to_owned(),
    );
    if exec.query(&sql, &params).await?.is_empty() {
        return Err(WorkflowError::NotFound {
            entity: "teacher",
            id: leave.teacher_id,
        });
    }

    let (sql, params) = build_query(
        Query::insert()
            .into_table(TeacherLeaves::Table)
            .columns([
                TeacherLeaves::GuruId,
                TeacherLeaves::TanggalMulai,
                TeacherLeaves::TanggalSelesai,
                TeacherLeaves::JenisIzin,
                TeacherLeaves::Alasan,
                TeacherLeaves::NomorSurat,
                TeacherLeaves::FileSurat,
                TeacherLeaves::Status,
            ])
            .values_panic([
                leave.teacher_id.into(),
                leave.start_date.format("%Y-%m-%d").to_string().into(),
                leave.end_date.format("%Y-%m-%d").to_string().into(),
                leave.leave_type.code().into(),
                leave.reason.trim().into(),
                leave.document_number.clone().into(),
                leave.document_ref.clone().into(),
                LeaveStatus::Pending.as_str().into(),
            ])
            .to_owned(),
    );
    let leave_id = exec
        .execute(&sql, &params)
        .await?
        .last_insert_id
        .ok_or_else(|| {
            WorkflowError::Storage(StorageError::Decode {
                column: "id".to_string(),
                reason: "insert did not report a generated identifier".to_string(),
            })
        })?;

    for assignment in &leave.assignments {
        let (sql, params) = build_query(
            Query::insert()
                .into_table(ClassAssignments::Table)
                .columns([
                    ClassAssignments::LeaveId,
                    ClassAssignments::KelasId,
                    ClassAssignments::NamaKelas,
                    ClassAssignments::JamPelajaran,
                    ClassAssignments::MataPelajaran,
                    ClassAssignments::GuruPengganti,
                    ClassAssignments::GuruPenggantiId,
                    ClassAssignments::Tugas,
                    ClassAssignments::StatusPenyampaian,
                ])
                .values_panic([
                    leave_id.into(),
                    assignment.class_id.into(),
                    assignment.class_name.trim().into(),
                    assignment.lesson_period.trim().into(),
                    assignment.subject.trim().into(),
                    assignment.substitute_teacher.trim().into(),
                    assignment.substitute_teacher_id.into(),
                    assignment.task.trim().into(),
                    NotificationStatus::NotNotified.code().into(),
                ])
                .to_owned(),
        );
        exec.execute(&sql, &params).await?;
    }

    Ok(leave_id)
}

/// Notify one assignment and escalate its leave if it was the last one.
async fn notify_in(
    exec: &mut dyn Executor,
    assignment_id: i64,
    notifier_name: &str,
) -> Result<NotifyOutcome> {
    exec.execute(LOCK_PARENT_LEAVE, &[assignment_id.into()]).await?;

    let (sql, params) = build_query(
        Query::select()
            .columns([ClassAssignments::LeaveId, ClassAssignments::StatusPenyampaian])
            .from(ClassAssignments::Table)
            .and_where(Expr::col(ClassAssignments::Id).eq(assignment_id))
            .to_owned(),
    );
    let rows = exec.query(&sql, &params).await?;
    let row = rows.first().ok_or(WorkflowError::NotFound {
        entity: "class assignment",
        id: assignment_id,
    })?;
    let leave_id = row.get_i64("leave_id")?;
    let flag: NotificationStatus = row.get_str("status_penyampaian")?.parse()?;

    if flag == NotificationStatus::Notified {
        return Ok(NotifyOutcome {
            leave_id,
            already_notified: true,
            escalated: false,
        });
    }

    let (sql, params) = build_query(
        Query::select()
            .column(TeacherLeaves::Status)
            .from(TeacherLeaves::Table)
            .and_where(Expr::col(TeacherLeaves::Id).eq(leave_id))
            .to_owned(),
    );
    let rows = exec.query(&sql, &params).await?;
    let parent_status: LeaveStatus = rows
        .first()
        .ok_or(WorkflowError::NotFound {
            entity: "teacher leave",
            id: leave_id,
        })?
        .get_str("status")?
        .parse()?;
    if parent_status != LeaveStatus::Approved {
        return Err(WorkflowError::IllegalTransition {
            id: leave_id,
            from: parent_status.as_str().to_string(),
            action: "notify",
        });
    }

    let (sql, params) = build_query(
        Query::update()
            .table(ClassAssignments::Table)
            .values([
                (
                    ClassAssignments::StatusPenyampaian,
                    NotificationStatus::Notified.code().into(),
                ),
                (ClassAssignments::WaktuDisampaikan, Expr::cust("NOW()")),
                (ClassAssignments::DisampaikanOleh, notifier_name.into()),
            ])
            .and_where(Expr::col(ClassAssignments::Id).eq(assignment_id))
            .and_where(
                Expr::col(ClassAssignments::StatusPenyampaian)
                    .eq(NotificationStatus::NotNotified.code()),
            )
            .to_owned(),
    );
    exec.execute(&sql, &params).await?;

    let (sql, params) = build_query(
        Query::select()
            .expr_as(Expr::col(ClassAssignments::Id).count(), Alias::new("remaining"))
            .from(ClassAssignments::Table)
            .and_where(Expr::col(ClassAssignments::LeaveId).eq(leave_id))
            .and_where(
                Expr::col(ClassAssignments::StatusPenyampaian)
                    .ne(NotificationStatus::Notified.code()),
            )
            .to_owned(),
    );
    let remaining = exec
        .query(&sql, &params)
        .await?
        .first()
        .map(|row| row.get_i64("remaining"))
        .transpose()?
        .unwrap_or(0);

    let mut escalated = false;
    if remaining == 0 {
        let (sql, params) = build_query(
            Query::update()
                .table(TeacherLeaves::Table)
                .value(TeacherLeaves::Status, LeaveStatus::Notified.as_str())
                .and_where(Expr::col(TeacherLeaves::Id).eq(leave_id))
                .and_where(Expr::col(TeacherLeaves::Status).eq(LeaveStatus::Approved.as_str()))
                .to_owned(),
        );
        escalated = exec.execute(&sql, &params).await?.affected_rows == 1;
    }

    Ok(NotifyOutcome {
        leave_id,
        already_notified: false,
        escalated,
    })
}

#[cfg(test)]
mod tests;
