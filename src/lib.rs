//! chatmirror - client-side chat state synchronization
//!
//! chatmirror keeps a locally persisted, offline-capable mirror of a user's chat
//! state (chatrooms, messages, friends, bundles) consistent with the server, while
//! absorbing a concurrent stream of push-delivered incremental events.
//!
//! # Module Structure
//!
//! - **`shared`** - Types shared with the server
//!   - Chatroom, log entry, friend and bundle structures
//!   - Snapshot wire format and push event payloads
//!   - Consistency violation and store error types
//!   - Engine configuration
//!
//! - **`client`** - The synchronization engine
//!   - `local_db`: SQLite mirror with a single serialized write lane
//!   - `sync`: snapshot reconciliation, pass cancellation, sync status
//!   - `push`: per-kind push event merging
//!   - `state`: in-memory projection consumed by the UI
//!   - `engine`: the controller tying the pieces together
//!
//! # Usage
//!
//! ```rust,no_run
//! use chatmirror::client::{engine::SyncEngine, config::Session};
//! use chatmirror::client::sync::source::HttpSnapshotSource;
//! use chatmirror::shared::config::EngineConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::builder()
//!     .server_url("https://chat.example.com".to_string())
//!     .build()?;
//! let session = Session::new(config, "me@example.com".to_string());
//! let source = HttpSnapshotSource::new(&session)?;
//! let (engine, handle) = SyncEngine::open(session, source).await?;
//! tokio::spawn(engine.run());
//! handle.request_reconcile();
//! # Ok(())
//! # }
//! ```
//!
//! # Thread Safety
//!
//! - **Local store**: reads go through a WAL-mode connection pool; all writes are
//!   funnelled through one dedicated task and run strictly in submission order.
//! - **Projection**: owned by the engine loop, never shared across threads.
//!
//! # Error Handling
//!
//! - `Result<T, E>` with `thiserror` enums in `shared::error`
//! - Consistency violations abort only the transaction that raised them

/// Shared types and data structures
pub mod shared;

/// Client-side synchronization engine
pub mod client;
