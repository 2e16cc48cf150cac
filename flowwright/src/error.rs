//! Session execution error taxonomy.
//!
//! Returned by graph nodes and the session runner. Errors never bubble raw to
//! callers: the run loop normalizes them into a node-level `error` event and
//! `facts.errors[]`, and interrupts travel as `SessionError::Interrupted` so
//! the runner can checkpoint and park the session.

use thiserror::Error;

use crate::graph::GraphInterrupt;

/// Error from one session step or from the runner.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Compiler or validate node rejected structural input.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Node type unknown or anchor shape mismatched; routes to schema repair.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Pre-write hash check failed; not retried automatically.
    #[error("write conflict: expected hash {expected}, observed {observed}")]
    WriteConflict { expected: String, observed: String },

    /// Preflight budget gate tripped (ops, repairs, or retries).
    #[error("budget exceeded: {0}")]
    BudgetExceeded(String),

    /// Platform API non-2xx or timeout; excerpt is bounded.
    #[error("external error (status {status}): {excerpt}")]
    External { status: u16, excerpt: String },

    /// Unexpected failure in a node; session is parked awaiting operator resume.
    #[error("internal error: {0}")]
    Internal(String),

    /// Graph execution paused awaiting user input (HITL).
    #[error("session interrupted: {0}")]
    Interrupted(GraphInterrupt),

    /// Session was cancelled cooperatively at a node boundary.
    #[error("session cancelled")]
    Cancelled,
}

impl From<GraphInterrupt> for SessionError {
    fn from(interrupt: GraphInterrupt) -> Self {
        SessionError::Interrupted(interrupt)
    }
}

impl SessionError {
    /// Short stable code used in events and `facts.errors[]`.
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::Validation(_) => "validation",
            SessionError::SchemaMismatch(_) => "schema_mismatch",
            SessionError::WriteConflict { .. } => "write_conflict",
            SessionError::BudgetExceeded(_) => "budget_exceeded",
            SessionError::External { .. } => "external",
            SessionError::Internal(_) => "internal",
            SessionError::Interrupted(_) => "interrupted",
            SessionError::Cancelled => "cancelled",
        }
    }
}
