//! Interrupt mechanism for human-in-the-loop pauses.
//!
//! A HITL node raises an interrupt; the run loop checkpoints the pre-node
//! state and surfaces the interrupt to the runner. Resume re-runs the
//! interrupted node with the user payload injected into state.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Interrupt value raised during graph execution.
///
/// `value` carries the payload surfaced to the user (candidate targets, the
/// rendered plan, the review diff); `id` identifies the interrupt kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interrupt {
    pub value: serde_json::Value,
    pub id: Option<String>,
}

impl Interrupt {
    pub fn new(value: serde_json::Value) -> Self {
        Self { value, id: None }
    }

    pub fn with_id(value: serde_json::Value, id: impl Into<String>) -> Self {
        Self {
            value,
            id: Some(id.into()),
        }
    }
}

/// Error raised when a graph pauses on an interrupt.
///
/// Caught by the run loop, which checkpoints and returns it to the runner.
#[derive(Debug, Clone, Error)]
#[error("graph interrupted: {0:?}")]
pub struct GraphInterrupt(pub Interrupt);

impl From<Interrupt> for GraphInterrupt {
    fn from(interrupt: Interrupt) -> Self {
        GraphInterrupt(interrupt)
    }
}
