//! Staged state-machine runtime: nodes, edges, compile and invoke.
//!
//! `StateGraph`: add nodes and edges (explicit or conditional), compile, then
//! invoke with state. The compiled graph checkpoints at every node boundary,
//! emits node lifecycle events, honors cooperative cancellation, and can
//! resume from a checkpoint with a user-supplied payload.

mod compile_error;
mod compiled;
mod conditional;
mod interrupt;
mod logging;
mod next;
mod node;
mod retry;
mod run_config;

pub use compile_error::CompilationError;
pub use compiled::{CompiledStateGraph, NodeEventSink, NoopEventSink};
pub use conditional::{ConditionalRouter, ConditionalRouterFn, NextEntry};
pub use interrupt::{GraphInterrupt, Interrupt};
pub use logging::{log_graph_error, log_graph_start, log_node_complete, log_node_start};
pub use next::Next;
pub use node::Node;
pub use retry::RetryPolicy;
pub use run_config::{CancelFlag, RunConfig};

/// Sentinel for graph entry: use as `from_id` in `add_edge(START, first_node_id)`.
pub const START: &str = "__start__";

/// Sentinel for graph exit: use as `to_id` in `add_edge(last_node_id, END)`.
pub const END: &str = "__end__";

mod state_graph;
pub use state_graph::StateGraph;
