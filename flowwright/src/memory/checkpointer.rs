//! Checkpointer trait and checkpoint types.
//!
//! Checkpoints are `(session_id, node, state)` tuples: `node` is the next
//! node to run when the session resumes — the node after a completed step,
//! or the interrupted/failed node itself.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Error type for checkpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("session_id required")]
    SessionIdRequired,
    #[error("serialization: {0}")]
    Serialization(String),
    #[error("storage: {0}")]
    Storage(String),
}

/// One checkpoint: the state snapshot plus the node to resume from.
#[derive(Debug, Clone)]
pub struct Checkpoint<S> {
    /// Unique checkpoint id.
    pub id: String,
    /// Node to run when resuming from this checkpoint (END when terminal).
    pub node: String,
    /// The session state at this boundary.
    pub state: S,
    pub created_at: DateTime<Utc>,
}

impl<S> Checkpoint<S> {
    pub fn new(node: impl Into<String>, state: S) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            node: node.into(),
            state,
            created_at: Utc::now(),
        }
    }
}

/// Item returned by `Checkpointer::list` for session history.
#[derive(Debug, Clone)]
pub struct CheckpointListItem {
    pub checkpoint_id: String,
    pub node: String,
    pub created_at: DateTime<Utc>,
}

/// Saves and loads checkpoints keyed by session id.
///
/// Writes are transactional per node boundary; `get_latest` reconstructs the
/// most recent state for resume.
///
/// **Interaction**: Injected via `StateGraph::compile_with_checkpointer`;
/// the run loop calls `put` after every node and on interrupt/error/cancel.
#[async_trait]
pub trait Checkpointer<S>: Send + Sync
where
    S: Clone + Send + Sync + 'static,
{
    /// Persist a checkpoint. Returns the checkpoint id used.
    async fn put(
        &self,
        session_id: &str,
        checkpoint: &Checkpoint<S>,
    ) -> Result<String, CheckpointError>;

    /// Load the most recent checkpoint for the session.
    async fn get_latest(&self, session_id: &str) -> Result<Option<Checkpoint<S>>, CheckpointError>;

    /// List checkpoints for the session in creation order.
    async fn list(&self, session_id: &str) -> Result<Vec<CheckpointListItem>, CheckpointError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Display of each CheckpointError variant contains expected keywords.
    #[test]
    fn checkpoint_error_display_all_variants() {
        assert!(CheckpointError::SessionIdRequired
            .to_string()
            .contains("session_id"));
        assert!(CheckpointError::Serialization("err".into())
            .to_string()
            .contains("serialization"));
        assert!(CheckpointError::Storage("io".into())
            .to_string()
            .contains("storage"));
    }

    /// **Scenario**: Checkpoint::new assigns a unique id and the given node.
    #[test]
    fn checkpoint_new_assigns_unique_ids() {
        let a: Checkpoint<i32> = Checkpoint::new("plan", 1);
        let b: Checkpoint<i32> = Checkpoint::new("plan", 2);
        assert_ne!(a.id, b.id);
        assert_eq!(a.node, "plan");
    }
}
