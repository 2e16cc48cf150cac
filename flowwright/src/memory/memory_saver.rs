//! In-memory checkpointer for tests and ephemeral runs.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::checkpointer::{Checkpoint, CheckpointError, CheckpointListItem, Checkpointer};

/// Keeps all checkpoints in a process-local map keyed by session id.
#[derive(Default)]
pub struct MemorySaver<S> {
    sessions: Mutex<HashMap<String, Vec<Checkpoint<S>>>>,
}

impl<S> MemorySaver<S> {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl<S> Checkpointer<S> for MemorySaver<S>
where
    S: Clone + Send + Sync + 'static,
{
    async fn put(
        &self,
        session_id: &str,
        checkpoint: &Checkpoint<S>,
    ) -> Result<String, CheckpointError> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|e| CheckpointError::Storage(e.to_string()))?;
        sessions
            .entry(session_id.to_string())
            .or_default()
            .push(checkpoint.clone());
        Ok(checkpoint.id.clone())
    }

    async fn get_latest(&self, session_id: &str) -> Result<Option<Checkpoint<S>>, CheckpointError> {
        let sessions = self
            .sessions
            .lock()
            .map_err(|e| CheckpointError::Storage(e.to_string()))?;
        Ok(sessions.get(session_id).and_then(|v| v.last().cloned()))
    }

    async fn list(&self, session_id: &str) -> Result<Vec<CheckpointListItem>, CheckpointError> {
        let sessions = self
            .sessions
            .lock()
            .map_err(|e| CheckpointError::Storage(e.to_string()))?;
        Ok(sessions
            .get(session_id)
            .map(|v| {
                v.iter()
                    .map(|c| CheckpointListItem {
                        checkpoint_id: c.id.clone(),
                        node: c.node.clone(),
                        created_at: c.created_at,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: put then get_latest returns the most recent checkpoint; list preserves order.
    #[tokio::test]
    async fn put_get_latest_and_list() {
        let saver: MemorySaver<i32> = MemorySaver::new();
        let first = Checkpoint::new("plan", 1);
        let second = Checkpoint::new("validate", 2);
        saver.put("sess-1", &first).await.unwrap();
        saver.put("sess-1", &second).await.unwrap();

        let latest = saver.get_latest("sess-1").await.unwrap().unwrap();
        assert_eq!(latest.state, 2);
        assert_eq!(latest.node, "validate");

        let items = saver.list("sess-1").await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].node, "plan");
        assert_eq!(items[1].node, "validate");
    }

    /// **Scenario**: Unknown session yields None / empty list.
    #[tokio::test]
    async fn unknown_session_is_empty() {
        let saver: MemorySaver<i32> = MemorySaver::new();
        assert!(saver.get_latest("nope").await.unwrap().is_none());
        assert!(saver.list("nope").await.unwrap().is_empty());
    }
}
