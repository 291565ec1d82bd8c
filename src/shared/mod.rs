//! Shared Module
//!
//! Types and data structures shared between the client engine and the server
//! API. Everything here is plain data: serialization, parsing and validation,
//! no I/O.

/// Chat entities: chatrooms, log entries, friends, bundles
pub mod messaging;

/// Authoritative snapshot wire format
pub mod snapshot;

/// Push-delivered incremental events
pub mod event;

/// Consistency violations and store errors
pub mod error;

/// Engine configuration
pub mod config;

/// Re-export commonly used types for convenience
pub use event::{PushEvent, PushEventKind};
pub use error::{ConsistencyViolation, StoreError};
pub use config::{EngineConfig, EngineConfigBuilder, ConfigError};
