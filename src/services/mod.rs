//! Workflow services built on the storage adapter contract.

pub mod activity;
pub mod error;
pub mod leave_workflow;
pub mod reports;
pub mod roster;
pub mod users;

pub use activity::{MemoryActivitySink, TracingActivitySink};
pub use error::{Result, WorkflowError};
pub use leave_workflow::{
    Actor, ClassAssignment, LeaveFilter, LeaveStatus, LeaveType, LeaveWorkflow, NewAssignment,
    NewLeave, NotificationStatus, NotifyOutcome, SubmitMode, TeacherLeave,
};
pub use reports::{NewReport, Report, ReportService, ReportStatus};
pub use roster::{ClassRoom, NewClass, NewTeacher, Roster, Teacher};
pub use users::{NewUser, User, UserDirectory, UserRole};

use sea_query::{MysqlQueryBuilder, QueryStatementWriter};

use crate::storage::value::{from_sea_values, Value};

/// Render a statement in the networked dialect with bound parameters.
///
/// The embedded adapter translates the SQL on the way in.
pub(crate) fn build_query<T: QueryStatementWriter>(stmt: T) -> (String, Vec<Value>) {
    let (sql, values) = stmt.build(MysqlQueryBuilder);
    (sql, from_sea_values(values))
}
