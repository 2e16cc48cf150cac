//! Graph node trait: one step in a StateGraph.
//!
//! Receives state `S`, returns updated `S` and `Next`. A node that needs to
//! pause for user input raises `SessionError::Interrupted`; the run loop
//! checkpoints and surfaces the interrupt.

use async_trait::async_trait;
use std::fmt::Debug;

use crate::error::SessionError;

use super::Next;

/// One step in a graph: state in, (state out, next step).
///
/// Writes to state are monotonic merges — a node returns the full state with
/// its additions applied; it must not discard prior facts or artifacts.
///
/// **Interaction**: Registered via `StateGraph::add_node`; driven by
/// `CompiledStateGraph::invoke`.
#[async_trait]
pub trait Node<S>: Send + Sync
where
    S: Clone + Send + Sync + Debug + 'static,
{
    /// Node id (e.g. `"classify_intent"`). Must be unique within a graph.
    fn id(&self) -> &str;

    /// One step: state in, (state out, next step).
    async fn run(&self, state: S) -> Result<(S, Next), SessionError>;
}
