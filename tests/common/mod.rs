//! Common test utilities and helpers
//!
//! This module provides shared utilities for all tests including:
//! - Temporary local stores
//! - Snapshot and push event fixtures
//! - A scripted snapshot source
//! - Custom assertion macros

pub mod assertions;
pub mod database;
pub mod fixtures;
pub mod fake_source;

// Re-export commonly used utilities
pub use database::*;
pub use fixtures::*;
pub use fake_source::*;
