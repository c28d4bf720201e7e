//! SiswaConnect storage and teacher-leave workflow.
//!
//! One [`storage::StorageAdapter`] contract over an embedded SQLite file or
//! a networked MySQL pool, selected at runtime from configuration. The
//! services on top (leave workflow, roster, reports, accounts) build every statement once in
//! the networked dialect and never branch on the engine.

pub mod config;
pub mod interfaces;
pub mod services;
pub mod storage;
pub mod utils;

pub use config::Config;
pub use services::{LeaveWorkflow, ReportService, Roster, UserDirectory, WorkflowError};
pub use storage::{connect_adapter, create_adapter, StorageAdapter, StorageError};
