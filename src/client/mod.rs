//! Client Module
//!
//! The client-side synchronization engine:
//!
//! - `config`: the per-login [`config::Session`]
//! - `local_db`: SQLite mirror with a serialized write lane
//! - `state`: in-memory projection consumed by the UI
//! - `sync`: snapshot reconciliation and pass bookkeeping
//! - `push`: push event merging
//! - `engine`: the controller owning all of the above
//! - `telemetry`: tracing subscriber setup

pub mod config;
pub mod local_db;
pub mod state;
pub mod sync;
pub mod push;
pub mod engine;
pub mod telemetry;

pub use config::Session;
pub use engine::{EngineCommand, LocalChange, SyncEngine, SyncHandle};
