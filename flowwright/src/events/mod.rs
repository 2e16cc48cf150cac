//! Append-only session event log and the node-event emitter.
//!
//! Every graph node entry/exit appends one [`EventRecord`]; records are
//! mirrored to an optional in-process subscriber stream for a front-end.

mod emitter;
mod memory_log;
mod sqlite_log;

pub use emitter::SessionEventEmitter;
pub use memory_log::MemoryEventLog;
pub use session_event::{EventRecord, EventStatus};
pub use sqlite_log::SqliteEventLog;

use async_trait::async_trait;
use thiserror::Error;

/// Error from event-log operations.
#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("storage: {0}")]
    Storage(String),
    #[error("serialization: {0}")]
    Serialization(String),
}

/// Durable, append-only log keyed by `(session_id, seq)`.
#[async_trait]
pub trait EventLog: Send + Sync {
    async fn append(&self, record: &EventRecord) -> Result<(), EventLogError>;

    /// Records for a session in seq order.
    async fn list(&self, session_id: &str) -> Result<Vec<EventRecord>, EventLogError>;

    /// Next seq to assign for a session (0 for a fresh session).
    async fn next_seq(&self, session_id: &str) -> Result<u64, EventLogError>;
}
