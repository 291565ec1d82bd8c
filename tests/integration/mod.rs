//! Integration tests against a real SQLite store

pub mod reconciliation_test;
pub mod push_merge_test;
pub mod store_test;
pub mod engine_test;
pub mod source_test;
