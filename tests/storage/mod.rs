//! Shared storage integration tests.
//!
//! Tests the StorageAdapter contract against every backend. Each backend
//! test binary connects its adapter and runs these functions through
//! `run_adapter_contract_tests!`.

pub mod adapter_contract_tests;
