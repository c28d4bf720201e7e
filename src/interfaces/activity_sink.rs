//! Activity sink interface.

/// One audited mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityEntry {
    /// Action code, e.g. `APPROVE_TEACHER_LEAVE`.
    pub action: &'static str,
    /// Entity kind, e.g. `teacher_leave`.
    pub entity_type: &'static str,
    pub entity_id: Option<i64>,
    /// Identity of the caller that performed the mutation.
    pub actor_id: i64,
    pub actor_name: String,
    pub description: String,
}

/// Interface for recording who did what.
///
/// Called after a mutation has committed. Recording is fire-and-forget:
/// implementations must not fail the caller and must not block on I/O.
///
/// Implementations:
/// - `TracingActivitySink`: structured log events
/// - `MemoryActivitySink`: in-memory recorder for tests
pub trait ActivitySink: Send + Sync {
    fn record(&self, entry: ActivityEntry);
}
