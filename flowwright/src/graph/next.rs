//! Next-step result from a graph node.
//!
//! The run loop uses this to decide the next node or to stop; nodes with
//! conditional edges have their `Next` overridden by the router.

/// Next step after running a node.
///
/// - **Continue**: follow the node's single outgoing edge.
/// - **Node(id)**: jump to the given node.
/// - **End**: stop; return current state as final result.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Next {
    /// Follow the node's outgoing edge; if none, equivalent to End.
    Continue,
    /// Run the node with the given id next.
    Node(String),
    /// Stop and return the current state.
    End,
}
