//! Structured logging helpers for graph execution.

use crate::error::SessionError;

/// Log node execution start.
pub fn log_node_start(node_id: &str) {
    tracing::debug!(node_id = node_id, "node start");
}

/// Log node execution completion.
pub fn log_node_complete(node_id: &str, next: &crate::graph::Next) {
    tracing::debug!(node_id = node_id, ?next, "node complete");
}

/// Log graph execution start.
pub fn log_graph_start(session_id: &str, first_node: &str) {
    tracing::info!(session_id = session_id, first_node = first_node, "graph start");
}

/// Log graph execution error.
pub fn log_graph_error(session_id: &str, error: &SessionError) {
    tracing::error!(session_id = session_id, ?error, "graph error");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logging_functions_do_not_panic() {
        log_node_start("validate");
        log_node_complete("validate", &crate::graph::Next::Continue);
        log_graph_start("sess-1", "classify_intent");
        log_graph_error("sess-1", &SessionError::Internal("boom".into()));
    }
}
