//! Activity sink implementations.

use std::sync::Mutex;

use tracing::info;

use crate::interfaces::activity_sink::{ActivityEntry, ActivitySink};

/// Emits each entry as a structured log event on the `siswaconnect::activity` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingActivitySink;

impl ActivitySink for TracingActivitySink {
    fn record(&self, entry: ActivityEntry) {
        info!(
            target: "siswaconnect::activity",
            action = entry.action,
            entity_type = entry.entity_type,
            entity_id = ?entry.entity_id,
            actor_id = entry.actor_id,
            actor_name = %entry.actor_name,
            "{}",
            entry.description
        );
    }
}

/// Keeps entries in memory. For tests.
#[derive(Debug, Default)]
pub struct MemoryActivitySink {
    entries: Mutex<Vec<ActivityEntry>>,
}

impl MemoryActivitySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<ActivityEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Actions recorded so far, in order.
    pub fn actions(&self) -> Vec<&'static str> {
        self.entries().iter().map(|e| e.action).collect()
    }
}

impl ActivitySink for MemoryActivitySink {
    fn record(&self, entry: ActivityEntry) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry);
        }
    }
}
