//! Per-invoke configuration and the cooperative cancel flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Config for one graph invoke: identifies the session and optional resume point.
///
/// **Interaction**: Passed to `CompiledStateGraph::invoke`; the session id
/// keys checkpoints and events.
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    /// Unique id for this session. Required when using a checkpointer.
    pub session_id: Option<String>,
    /// When set, the graph starts from this node instead of the START edge
    /// (resume after an interrupt or an operator restart).
    pub resume_from: Option<String>,
}

impl RunConfig {
    pub fn for_session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            resume_from: None,
        }
    }

    pub fn resuming(session_id: impl Into<String>, node: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            resume_from: Some(node.into()),
        }
    }
}

/// Cooperative cancellation flag, checked at every node boundary.
///
/// In-flight LLM/tool calls complete; the session then transitions to a
/// terminal cancelled state and is checkpointed.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: A cloned CancelFlag observes the cancel issued on the original.
    #[test]
    fn cancel_flag_shared_across_clones() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
    }
}
