//! Application configuration.
//!
//! Aggregates configuration into a single Config struct that can be loaded
//! from YAML files or environment variables.

mod storage;

pub use storage::{EmbeddedConfig, NetworkedConfig, StorageConfig, WorkflowConfig};

use serde::Deserialize;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "SISWA_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "SISWA";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "SISWA_LOG";

/// Legacy: backend kind (`sqlite` | `mysql`).
pub const DB_TYPE_ENV_VAR: &str = "DB_TYPE";
/// Legacy: networked host.
pub const DB_HOST_ENV_VAR: &str = "DB_HOST";
/// Legacy: networked port.
pub const DB_PORT_ENV_VAR: &str = "DB_PORT";
/// Legacy: networked user.
pub const DB_USER_ENV_VAR: &str = "DB_USER";
/// Legacy: networked password.
pub const DB_PASSWORD_ENV_VAR: &str = "DB_PASSWORD";
/// Legacy: networked database name.
pub const DB_NAME_ENV_VAR: &str = "DB_NAME";
/// Legacy: embedded database file.
pub const DB_PATH_ENV_VAR: &str = "DB_PATH";

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Workflow service configuration.
    pub workflow: WorkflowConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    /// 5. Legacy `DB_*` environment variables
    pub fn load(path: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: Config = config.try_deserialize()?;
        config.apply_legacy_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overlay the `DB_*` variables older deployments set.
    fn apply_legacy_env<F>(&mut self, lookup: F) -> Result<(), Box<dyn std::error::Error>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let storage = &mut self.storage;
        if let Some(kind) = lookup(DB_TYPE_ENV_VAR) {
            storage.backend = kind;
        }
        if let Some(path) = lookup(DB_PATH_ENV_VAR) {
            storage.embedded.path = path;
        }
        if let Some(host) = lookup(DB_HOST_ENV_VAR) {
            storage.networked.host = host;
        }
        if let Some(port) = lookup(DB_PORT_ENV_VAR) {
            storage.networked.port = port
                .trim()
                .parse()
                .map_err(|e| format!("invalid {}: '{}' ({})", DB_PORT_ENV_VAR, port, e))?;
        }
        if let Some(user) = lookup(DB_USER_ENV_VAR) {
            storage.networked.user = user;
        }
        if let Some(password) = lookup(DB_PASSWORD_ENV_VAR) {
            storage.networked.password = password;
        }
        if let Some(database) = lookup(DB_NAME_ENV_VAR) {
            storage.networked.database = database;
        }
        Ok(())
    }
}
