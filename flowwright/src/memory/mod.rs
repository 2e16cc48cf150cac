//! Durable checkpointing for session state.
//!
//! A checkpoint is written at every node boundary; reads reconstruct a
//! session at its latest checkpoint for HITL resume, operator restart, and
//! crash recovery. Implementations: [`MemorySaver`] (tests, ephemeral runs)
//! and [`SqliteSaver`] (durable).

mod checkpointer;
mod memory_saver;
mod sqlite_saver;

pub use checkpointer::{Checkpoint, CheckpointError, CheckpointListItem, Checkpointer};
pub use memory_saver::MemorySaver;
pub use sqlite_saver::SqliteSaver;
