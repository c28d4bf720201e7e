//! Storage configuration types.

use serde::Deserialize;

/// Storage configuration.
///
/// `backend` selects the adapter; only the matching sub-section is read.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend kind: `embedded` (`sqlite`) or `networked` (`mysql`).
    pub backend: String,
    /// Embedded engine configuration.
    pub embedded: EmbeddedConfig,
    /// Networked engine configuration.
    pub networked: NetworkedConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "embedded".to_string(),
            embedded: EmbeddedConfig::default(),
            networked: NetworkedConfig::default(),
        }
    }
}

impl StorageConfig {
    /// Embedded configuration pointing at `path`.
    pub fn embedded(path: impl Into<String>) -> Self {
        Self {
            backend: "embedded".to_string(),
            embedded: EmbeddedConfig {
                path: path.into(),
                ..EmbeddedConfig::default()
            },
            ..Self::default()
        }
    }
}

/// Embedded (single-file) engine configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddedConfig {
    /// Database file path. Parent directories are created on connect.
    pub path: String,
    /// Optional seed script (networked dialect) applied with the schema on first run.
    pub seed: Option<String>,
    /// How long a writer waits on a locked database before failing.
    pub busy_timeout_ms: u64,
}

impl Default for EmbeddedConfig {
    fn default() -> Self {
        Self {
            path: "siswaconnect.db".to_string(),
            seed: None,
            busy_timeout_ms: 5_000,
        }
    }
}

/// Networked (pooled client-server) engine configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkedConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    /// Upper bound on pooled connections; callers queue beyond it.
    pub max_connections: u32,
    /// How long a caller waits in the pool queue.
    pub acquire_timeout_secs: u64,
    /// Apply the schema (`CREATE TABLE IF NOT EXISTS`) on connect.
    pub bootstrap: bool,
}

impl Default for NetworkedConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3306,
            user: "root".to_string(),
            password: String::new(),
            database: "siswa_connect".to_string(),
            max_connections: 10,
            acquire_timeout_secs: 30,
            bootstrap: false,
        }
    }
}

/// Workflow service configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Per-operation deadline. Unset means no deadline.
    pub deadline_ms: Option<u64>,
}

impl WorkflowConfig {
    pub fn deadline(&self) -> Option<std::time::Duration> {
        self.deadline_ms.map(std::time::Duration::from_millis)
    }
}
