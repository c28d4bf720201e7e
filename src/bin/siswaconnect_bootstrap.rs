//! siswaconnect-bootstrap: prepare the configured database
//!
//! Loads configuration, connects the selected storage backend (which
//! creates and seeds an empty embedded database, or applies the schema to
//! a networked one when `storage.networked.bootstrap` is set), reports what
//! it found and disconnects.
//!
//! ## Usage
//! ```text
//! siswaconnect-bootstrap [config.yaml]
//! ```
//!
//! ## Configuration
//! - SISWA_CONFIG: Path to a YAML config file (optional)
//! - SISWA__STORAGE__BACKEND: `embedded` or `networked`
//! - DB_HOST, DB_PORT, DB_USER, DB_PASSWORD, DB_NAME: networked connection
//! - SISWA_LOG: tracing filter (default: info)

use tracing::info;

use siswaconnect::config::Config;
use siswaconnect::storage::{create_adapter, schema::TABLES};
use siswaconnect::utils::bootstrap::{connect_with_retry, connection_backoff, init_tracing};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let path = std::env::args().nth(1);
    let config = Config::load(path.as_deref())?;

    let adapter = create_adapter(&config.storage)?;
    connect_with_retry(adapter.as_ref(), connection_backoff()).await?;

    for table in TABLES {
        let rows = adapter
            .query(&format!("SELECT COUNT(*) AS n FROM {}", table), &[])
            .await?;
        let count = rows.first().map(|r| r.get_i64("n")).transpose()?.unwrap_or(0);
        info!(table, rows = count, "Table ready");
    }

    info!(backend = %adapter.backend(), "siswaconnect-bootstrap finished");
    adapter.disconnect().await;
    Ok(())
}
