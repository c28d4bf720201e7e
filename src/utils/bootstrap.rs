//! Process startup helpers shared by binaries.

use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LOG_ENV_VAR;
use crate::interfaces::storage_adapter::{StorageAdapter, StorageError};

/// Initialize tracing from `SISWA_LOG`, defaulting to `info`.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Backoff for the storage connect at startup.
///
/// - Min delay: 100ms
/// - Max delay: 5s
/// - Max attempts: 10
/// - Jitter enabled
pub fn connection_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(5))
        .with_max_times(10)
        .with_jitter()
}

/// Whether a failed connect may succeed later (server still starting,
/// network blip). Configuration and dialect errors never will.
pub fn is_retryable_connect_error(err: &StorageError) -> bool {
    matches!(
        err,
        StorageError::Database(_) | StorageError::Io(_) | StorageError::Timeout(_)
    )
}

/// Connect `adapter`, retrying transient failures on `backoff`.
pub async fn connect_with_retry(
    adapter: &dyn StorageAdapter,
    backoff: ExponentialBuilder,
) -> Result<(), StorageError> {
    let backend = adapter.backend();
    (|| adapter.connect())
        .retry(backoff)
        .when(is_retryable_connect_error)
        .notify(|err: &StorageError, dur: Duration| {
            warn!(%backend, error = %err, delay = ?dur, "Storage connect failed, retrying");
        })
        .await?;
    info!(%backend, "Storage connected");
    Ok(())
}
