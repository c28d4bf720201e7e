//! Abstract interfaces for siswaconnect components.
//!
//! These traits define the contracts for:
//! - Storage adapters (one contract over the embedded and networked engines)
//! - Activity sinks (fire-and-forget audit trail)

pub mod activity_sink;
pub mod storage_adapter;

pub use activity_sink::{ActivityEntry, ActivitySink};
pub use storage_adapter::{
    BackendKind, Executor, RawConnection, StorageAdapter, StorageError, Transaction,
};
