//! Conditional edges: route to the next node from state.
//!
//! A source node's routing function takes the updated state and returns a
//! key; the key is looked up in an optional path map, otherwise used as the
//! next node id directly. The session graph folds its `(from, guard, to)`
//! transition table into these routers.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

/// Router function: takes a reference to state and returns a routing key.
pub type ConditionalRouterFn<S> = Arc<dyn Fn(&S) -> String + Send + Sync>;

/// Conditional edge definition: routing function plus optional path map.
#[derive(Clone)]
pub struct ConditionalRouter<S> {
    pub(super) path: ConditionalRouterFn<S>,
    /// Map from routing key to node id (or END). If None, key is the node id.
    pub(super) path_map: Option<HashMap<String, String>>,
}

impl<S> ConditionalRouter<S>
where
    S: Clone + Send + Sync + Debug + 'static,
{
    pub fn new(path: ConditionalRouterFn<S>, path_map: Option<HashMap<String, String>>) -> Self {
        Self { path, path_map }
    }

    /// Resolves the next node id from the current state.
    pub fn resolve_next(&self, state: &S) -> String {
        let key = (self.path)(state);
        self.path_map
            .as_ref()
            .and_then(|m| m.get(&key))
            .cloned()
            .unwrap_or(key)
    }
}

/// How to determine the next node after a given node runs.
///
/// `Unconditional` still respects the node's own `Next`; `Conditional`
/// overrides it — routing is a pure function of state, per the transition
/// table.
#[derive(Clone)]
pub enum NextEntry<S> {
    /// Single fixed next node (or END).
    Unconditional(String),
    /// Next node decided by the router from state.
    Conditional(ConditionalRouter<S>),
}
