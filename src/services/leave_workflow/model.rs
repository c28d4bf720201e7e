//! Leave request data model.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::services::error::{Result, WorkflowError};
use crate::storage::Row;

/// Kind of absence requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeaveType {
    #[serde(rename = "SAKIT")]
    Sick,
    #[serde(rename = "IZIN")]
    PermittedAbsence,
    #[serde(rename = "DINAS")]
    OfficialDuty,
    #[serde(rename = "CUTI")]
    AnnualLeave,
    #[serde(rename = "LAINNYA")]
    Other,
}

impl LeaveType {
    /// Stored code.
    pub fn code(&self) -> &'static str {
        match self {
            LeaveType::Sick => "SAKIT",
            LeaveType::PermittedAbsence => "IZIN",
            LeaveType::OfficialDuty => "DINAS",
            LeaveType::AnnualLeave => "CUTI",
            LeaveType::Other => "LAINNYA",
        }
    }
}

impl FromStr for LeaveType {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "SAKIT" => Ok(LeaveType::Sick),
            "IZIN" => Ok(LeaveType::PermittedAbsence),
            "DINAS" => Ok(LeaveType::OfficialDuty),
            "CUTI" => Ok(LeaveType::AnnualLeave),
            "LAINNYA" => Ok(LeaveType::Other),
            other => Err(WorkflowError::validation(format!("unknown leave type '{}'", other))),
        }
    }
}

/// Leave request status.
///
/// Legal transitions: `pending -> approved`, `pending -> rejected`,
/// `approved -> notified`. The last one is derived, never requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
    Notified,
}

impl LeaveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaveStatus::Pending => "pending",
            LeaveStatus::Approved => "approved",
            LeaveStatus::Rejected => "rejected",
            LeaveStatus::Notified => "notified",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LeaveStatus::Rejected | LeaveStatus::Notified)
    }
}

impl fmt::Display for LeaveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeaveStatus {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(LeaveStatus::Pending),
            "approved" => Ok(LeaveStatus::Approved),
            "rejected" => Ok(LeaveStatus::Rejected),
            "notified" => Ok(LeaveStatus::Notified),
            other => Err(WorkflowError::validation(format!("unknown leave status '{}'", other))),
        }
    }
}

/// Whether an assignment has been passed on to its class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationStatus {
    #[serde(rename = "belum")]
    NotNotified,
    #[serde(rename = "sudah")]
    Notified,
}

impl NotificationStatus {
    pub fn code(&self) -> &'static str {
        match self {
            NotificationStatus::NotNotified => "belum",
            NotificationStatus::Notified => "sudah",
        }
    }
}

impl FromStr for NotificationStatus {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "belum" => Ok(NotificationStatus::NotNotified),
            "sudah" => Ok(NotificationStatus::Notified),
            other => Err(WorkflowError::validation(format!(
                "unknown notification status '{}'",
                other
            ))),
        }
    }
}

/// Authenticated caller identity. Recorded, never verified here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: i64,
    pub name: String,
}

impl Actor {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// One class-coverage instruction in a submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAssignment {
    pub class_id: Option<i64>,
    pub class_name: String,
    pub lesson_period: String,
    pub subject: String,
    pub substitute_teacher: String,
    pub substitute_teacher_id: Option<i64>,
    pub task: String,
}

impl NewAssignment {
    fn validate(&self, index: usize) -> Result<()> {
        let required = [
            ("class name", &self.class_name),
            ("lesson period", &self.lesson_period),
            ("subject", &self.subject),
            ("substitute teacher", &self.substitute_teacher),
            ("task", &self.task),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(WorkflowError::validation(format!(
                    "assignment {}: {} is required",
                    index + 1,
                    field
                )));
            }
        }
        Ok(())
    }
}

/// A leave submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLeave {
    pub teacher_id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub leave_type: LeaveType,
    pub reason: String,
    pub document_number: Option<String>,
    /// Opaque reference to a supporting document.
    pub document_ref: Option<String>,
    pub assignments: Vec<NewAssignment>,
}

impl NewLeave {
    /// Check everything that can be checked without the database.
    pub fn validate(&self) -> Result<()> {
        if self.start_date > self.end_date {
            return Err(WorkflowError::validation(format!(
                "start date {} is after end date {}",
                self.start_date, self.end_date
            )));
        }
        if self.reason.trim().is_empty() {
            return Err(WorkflowError::validation("reason is required"));
        }
        if self.assignments.is_empty() {
            return Err(WorkflowError::validation(
                "at least one class assignment is required",
            ));
        }
        for (index, assignment) in self.assignments.iter().enumerate() {
            assignment.validate(index)?;
        }
        Ok(())
    }
}

/// A class assignment as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassAssignment {
    pub id: i64,
    pub leave_id: i64,
    pub class_id: Option<i64>,
    pub class_name: String,
    pub lesson_period: String,
    pub subject: String,
    pub substitute_teacher: String,
    pub substitute_teacher_id: Option<i64>,
    pub task: String,
    pub status: NotificationStatus,
    pub notified_at: Option<NaiveDateTime>,
    pub notified_by: Option<String>,
}

impl ClassAssignment {
    pub(crate) fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_i64("id")?,
            leave_id: row.get_i64("leave_id")?,
            class_id: row.get_opt_i64("kelas_id")?,
            class_name: row.get_str("nama_kelas")?,
            lesson_period: row.get_str("jam_pelajaran")?,
            subject: row.get_str("mata_pelajaran")?,
            substitute_teacher: row.get_str("guru_pengganti")?,
            substitute_teacher_id: row.get_opt_i64("guru_pengganti_id")?,
            task: row.get_str("tugas")?,
            status: row.get_str("status_penyampaian")?.parse()?,
            notified_at: row.get_opt_datetime("waktu_disampaikan")?,
            notified_by: row.get_opt_str("disampaikan_oleh")?,
        })
    }

    pub fn is_notified(&self) -> bool {
        self.status == NotificationStatus::Notified
    }
}

/// A leave request with its owner's details and its assignments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeacherLeave {
    pub id: i64,
    pub teacher_id: i64,
    pub teacher_name: String,
    pub teacher_nip: Option<String>,
    pub teacher_subject: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub leave_type: LeaveType,
    pub reason: String,
    pub document_number: Option<String>,
    pub document_ref: Option<String>,
    pub status: LeaveStatus,
    pub approver_id: Option<i64>,
    pub approver_name: Option<String>,
    pub decided_at: Option<NaiveDateTime>,
    pub note: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub assignments: Vec<ClassAssignment>,
}

impl TeacherLeave {
    /// Build from a leave row joined with its teacher; assignments are attached later.
    pub(crate) fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_i64("id")?,
            teacher_id: row.get_i64("guru_id")?,
            teacher_name: row.get_str("nama_guru")?,
            teacher_nip: row.get_opt_str("nip")?,
            teacher_subject: row.get_str("mapel")?,
            start_date: row.get_date("tanggal_mulai")?,
            end_date: row.get_date("tanggal_selesai")?,
            leave_type: row.get_str("jenis_izin")?.parse()?,
            reason: row.get_str("alasan")?,
            document_number: row.get_opt_str("nomor_surat")?,
            document_ref: row.get_opt_str("file_surat")?,
            status: row.get_str("status")?.parse()?,
            approver_id: row.get_opt_i64("disetujui_oleh")?,
            approver_name: row.get_opt_str("disetujui_oleh_nama")?,
            decided_at: row.get_opt_datetime("tanggal_disetujui")?,
            note: row.get_opt_str("catatan")?,
            created_at: row.get_opt_datetime("created_at")?,
            assignments: Vec::new(),
        })
    }

    pub fn all_notified(&self) -> bool {
        self.assignments.iter().all(ClassAssignment::is_notified)
    }
}

/// Read filter for `list_leaves`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeaveFilter {
    pub teacher_id: Option<i64>,
    pub status: Option<LeaveStatus>,
}

impl LeaveFilter {
    pub fn for_teacher(teacher_id: i64) -> Self {
        Self {
            teacher_id: Some(teacher_id),
            status: None,
        }
    }
}

/// What `notify_assignment` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifyOutcome {
    pub leave_id: i64,
    /// The assignment was already notified; nothing changed.
    pub already_notified: bool,
    /// This call moved the parent leave to `notified`.
    pub escalated: bool,
}
