//! Graph compilation errors.
//!
//! Raised by `StateGraph::compile` when edges reference unknown nodes or the
//! graph has no entry/exit.

use thiserror::Error;

/// Error from `StateGraph::compile`.
#[derive(Debug, Error)]
pub enum CompilationError {
    /// An edge references a node id that was never added.
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// No edge from START.
    #[error("graph has no START edge")]
    MissingStart,

    /// No path to END (neither an edge nor a conditional target).
    #[error("graph has no END edge")]
    MissingEnd,

    /// A node has both a plain outgoing edge and conditional edges.
    #[error("node has both an edge and conditional edges: {0}")]
    NodeHasBothEdgeAndConditional(String),

    /// A conditional path map targets a node that does not exist.
    #[error("conditional path map references unknown node: {0}")]
    InvalidConditionalPathMap(String),

    /// Structural problem (multiple START edges, duplicate plain edges).
    #[error("invalid graph: {0}")]
    InvalidGraph(String),
}
