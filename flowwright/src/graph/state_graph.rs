//! State graph builder: nodes + explicit edges and conditional edges.
//!
//! Add nodes with `add_node`, define edges with `add_edge(from, to)` using
//! `START` and `END`, and state-based branches with `add_conditional_edges`.
//! Then `compile` (or `compile_with_checkpointer`) to get an executable
//! [`CompiledStateGraph`]. A node must have either one outgoing edge or
//! conditional edges, not both.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::sync::Arc;

use crate::memory::Checkpointer;

use super::compile_error::CompilationError;
use super::compiled::{CompiledStateGraph, NodeEventSink};
use super::conditional::{ConditionalRouter, ConditionalRouterFn, NextEntry};
use super::node::Node;
use super::retry::RetryPolicy;
use super::{END, START};

/// Default ceiling on graph steps per invoke; guards against runaway routing.
const DEFAULT_STEP_LIMIT: usize = 256;

/// Builder for a staged state machine over state type `S`.
pub struct StateGraph<S> {
    nodes: HashMap<String, Arc<dyn Node<S>>>,
    /// Edges (from_id, to_id). One outgoing edge per node.
    edges: Vec<(String, String)>,
    /// Conditional edges: source node id -> router resolved from state at runtime.
    conditional_edges: HashMap<String, ConditionalRouter<S>>,
    /// Phase label per node, attached to emitted events.
    phase_labels: HashMap<String, String>,
    event_sink: Option<Arc<dyn NodeEventSink>>,
    retry_policy: RetryPolicy,
    step_limit: usize,
}

impl<S> Default for StateGraph<S>
where
    S: Clone + Send + Sync + Debug + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<S> StateGraph<S>
where
    S: Clone + Send + Sync + Debug + 'static,
{
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            edges: Vec::new(),
            conditional_edges: HashMap::new(),
            phase_labels: HashMap::new(),
            event_sink: None,
            retry_policy: RetryPolicy::None,
            step_limit: DEFAULT_STEP_LIMIT,
        }
    }

    /// Attaches an event sink; the run loop emits node lifecycle events to it.
    pub fn with_event_sink(mut self, sink: Arc<dyn NodeEventSink>) -> Self {
        self.event_sink = Some(sink);
        self
    }

    /// Attaches a retry policy for transient node failures.
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Overrides the step ceiling per invoke.
    pub fn with_step_limit(mut self, limit: usize) -> Self {
        self.step_limit = limit;
        self
    }

    /// Adds a node; id must be unique. Replaces if same id.
    pub fn add_node(&mut self, id: impl Into<String>, node: Arc<dyn Node<S>>) -> &mut Self {
        self.nodes.insert(id.into(), node);
        self
    }

    /// Assigns a phase label to a node (attached to its events).
    pub fn set_phase(&mut self, node_id: impl Into<String>, phase: impl Into<String>) -> &mut Self {
        self.phase_labels.insert(node_id.into(), phase.into());
        self
    }

    /// Adds an edge from `from_id` to `to_id`.
    ///
    /// Use `START` for graph entry and `END` for graph exit. Both ids (except
    /// the sentinels) must be registered via `add_node` before `compile()`.
    pub fn add_edge(&mut self, from_id: impl Into<String>, to_id: impl Into<String>) -> &mut Self {
        self.edges.push((from_id.into(), to_id.into()));
        self
    }

    /// Adds conditional edges from `source`: next node is `path(state)`,
    /// optionally translated through `path_map`.
    pub fn add_conditional_edges(
        &mut self,
        source: impl Into<String>,
        path: ConditionalRouterFn<S>,
        path_map: Option<HashMap<String, String>>,
    ) -> &mut Self {
        self.conditional_edges
            .insert(source.into(), ConditionalRouter::new(path, path_map));
        self
    }

    /// Builds the executable graph without persistence.
    pub fn compile(self) -> Result<CompiledStateGraph<S>, CompilationError> {
        self.compile_internal(None)
    }

    /// Builds the executable graph with a checkpointer; the run loop saves a
    /// checkpoint at every node boundary when the config carries a session id.
    pub fn compile_with_checkpointer(
        self,
        checkpointer: Arc<dyn Checkpointer<S>>,
    ) -> Result<CompiledStateGraph<S>, CompilationError> {
        self.compile_internal(Some(checkpointer))
    }

    fn compile_internal(
        self,
        checkpointer: Option<Arc<dyn Checkpointer<S>>>,
    ) -> Result<CompiledStateGraph<S>, CompilationError> {
        for (from, to) in &self.edges {
            if from != START && !self.nodes.contains_key(from) {
                return Err(CompilationError::NodeNotFound(from.clone()));
            }
            if to != END && !self.nodes.contains_key(to) {
                return Err(CompilationError::NodeNotFound(to.clone()));
            }
        }
        for (source, router) in &self.conditional_edges {
            if !self.nodes.contains_key(source) {
                return Err(CompilationError::NodeNotFound(source.clone()));
            }
            if let Some(ref path_map) = router.path_map {
                for target in path_map.values() {
                    if target != END && !self.nodes.contains_key(target) {
                        return Err(CompilationError::InvalidConditionalPathMap(target.clone()));
                    }
                }
            }
        }

        let start_edges: Vec<_> = self
            .edges
            .iter()
            .filter(|(f, _)| f == START)
            .map(|(_, t)| t.clone())
            .collect();
        let first = match start_edges.len() {
            0 => return Err(CompilationError::MissingStart),
            1 => start_edges.into_iter().next().expect("one start edge"),
            _ => {
                return Err(CompilationError::InvalidGraph(
                    "multiple edges from START".into(),
                ))
            }
        };

        let has_end = self.edges.iter().any(|(_, t)| t == END)
            || self.conditional_edges.values().any(|r| {
                r.path_map
                    .as_ref()
                    .map_or(true, |m| m.values().any(|v| v == END))
            });
        if !has_end {
            return Err(CompilationError::MissingEnd);
        }

        let plain_froms: Vec<_> = self
            .edges
            .iter()
            .filter(|(f, _)| f.as_str() != START)
            .map(|(f, _)| f.clone())
            .collect();
        let unique_froms: HashSet<_> = plain_froms.iter().cloned().collect();
        if unique_froms.len() != plain_froms.len() {
            return Err(CompilationError::InvalidGraph(
                "node has multiple plain outgoing edges".into(),
            ));
        }
        for source in self.conditional_edges.keys() {
            if unique_froms.contains(source) {
                return Err(CompilationError::NodeHasBothEdgeAndConditional(
                    source.clone(),
                ));
            }
        }

        let mut next_map: HashMap<String, NextEntry<S>> = self
            .edges
            .iter()
            .filter(|(f, _)| f.as_str() != START)
            .map(|(f, t)| (f.clone(), NextEntry::Unconditional(t.clone())))
            .collect();
        for (source, router) in &self.conditional_edges {
            next_map.insert(source.clone(), NextEntry::Conditional(router.clone()));
        }

        Ok(CompiledStateGraph::new(
            self.nodes,
            first,
            next_map,
            checkpointer,
            self.event_sink,
            self.phase_labels,
            self.retry_policy,
            self.step_limit,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::error::SessionError;
    use crate::graph::Next;

    #[derive(Clone, Debug)]
    struct DummyState;

    struct DummyNode(&'static str);

    #[async_trait]
    impl Node<DummyState> for DummyNode {
        fn id(&self) -> &str {
            self.0
        }
        async fn run(&self, state: DummyState) -> Result<(DummyState, Next), SessionError> {
            Ok((state, Next::Continue))
        }
    }

    /// **Scenario**: Compile fails when an edge references an unknown node.
    #[test]
    fn compile_fails_on_unknown_node() {
        let mut graph = StateGraph::<DummyState>::new();
        graph.add_node("a", Arc::new(DummyNode("a")));
        graph.add_edge(START, "a");
        graph.add_edge("a", "missing");
        match graph.compile() {
            Err(CompilationError::NodeNotFound(id)) => assert_eq!(id, "missing"),
            other => panic!("expected NodeNotFound, got {:?}", other.err()),
        }
    }

    /// **Scenario**: Compile fails without a START edge or without any path to END.
    #[test]
    fn compile_requires_start_and_end() {
        let mut graph = StateGraph::<DummyState>::new();
        graph.add_node("a", Arc::new(DummyNode("a")));
        graph.add_edge("a", END);
        assert!(matches!(
            graph.compile(),
            Err(CompilationError::MissingStart)
        ));

        let mut graph = StateGraph::<DummyState>::new();
        graph.add_node("a", Arc::new(DummyNode("a")));
        graph.add_edge(START, "a");
        assert!(matches!(graph.compile(), Err(CompilationError::MissingEnd)));
    }

    /// **Scenario**: A node with both a plain edge and conditional edges is rejected.
    #[test]
    fn compile_rejects_node_with_both_edge_kinds() {
        let mut graph = StateGraph::<DummyState>::new();
        graph.add_node("a", Arc::new(DummyNode("a")));
        graph.add_node("b", Arc::new(DummyNode("b")));
        graph.add_edge(START, "a");
        graph.add_edge("a", "b");
        graph.add_edge("b", END);
        graph.add_conditional_edges("a", Arc::new(|_| "b".to_string()), None);
        match graph.compile() {
            Err(CompilationError::NodeHasBothEdgeAndConditional(id)) => assert_eq!(id, "a"),
            other => panic!("expected NodeHasBothEdgeAndConditional, got {:?}", other.err()),
        }
    }

    /// **Scenario**: Conditional path maps must target known nodes.
    #[test]
    fn compile_rejects_invalid_path_map_target() {
        let mut graph = StateGraph::<DummyState>::new();
        graph.add_node("a", Arc::new(DummyNode("a")));
        graph.add_edge(START, "a");
        graph.add_conditional_edges(
            "a",
            Arc::new(|_| "x".to_string()),
            Some(
                [("x".to_string(), "nonexistent".to_string())]
                    .into_iter()
                    .collect(),
            ),
        );
        match graph.compile() {
            Err(CompilationError::InvalidConditionalPathMap(id)) => assert_eq!(id, "nonexistent"),
            other => panic!("expected InvalidConditionalPathMap, got {:?}", other.err()),
        }
    }
}
