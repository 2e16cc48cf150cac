//! Compiled state graph: immutable, supports invoke only.
//!
//! The run loop steps through nodes, emitting a lifecycle event around every
//! node, saving a checkpoint at every node boundary, and checking the cancel
//! flag between nodes. Interrupts checkpoint the pre-node state so resume
//! re-runs the interrupted node with the user payload injected.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use session_event::EventStatus;

use crate::error::SessionError;
use crate::memory::{Checkpoint, Checkpointer};

use super::conditional::NextEntry;
use super::logging::{log_graph_error, log_graph_start, log_node_complete, log_node_start};
use super::node::Node;
use super::retry::RetryPolicy;
use super::run_config::{CancelFlag, RunConfig};
use super::{Next, END};

/// Receives one record per node lifecycle transition.
///
/// **Interaction**: Implemented by the session event emitter; the run loop
/// calls it around every node. Payloads must reference facts/artifacts keys,
/// never raw blobs.
#[async_trait]
pub trait NodeEventSink: Send + Sync {
    async fn node_event(
        &self,
        session_id: &str,
        node: &str,
        phase: &str,
        status: EventStatus,
        duration_ms: u64,
        summary: &str,
        payload: Value,
    );
}

/// Sink that drops all events; used when no subscriber or log is attached.
pub struct NoopEventSink;

#[async_trait]
impl NodeEventSink for NoopEventSink {
    async fn node_event(
        &self,
        _session_id: &str,
        _node: &str,
        _phase: &str,
        _status: EventStatus,
        _duration_ms: u64,
        _summary: &str,
        _payload: Value,
    ) {
    }
}

/// Compiled graph: immutable structure, supports invoke only.
#[derive(Clone)]
pub struct CompiledStateGraph<S> {
    nodes: HashMap<String, Arc<dyn Node<S>>>,
    first_node_id: String,
    next_map: HashMap<String, NextEntry<S>>,
    checkpointer: Option<Arc<dyn Checkpointer<S>>>,
    event_sink: Option<Arc<dyn NodeEventSink>>,
    phase_labels: HashMap<String, String>,
    retry_policy: RetryPolicy,
    step_limit: usize,
}

impl<S> CompiledStateGraph<S>
where
    S: Clone + Send + Sync + Debug + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        nodes: HashMap<String, Arc<dyn Node<S>>>,
        first_node_id: String,
        next_map: HashMap<String, NextEntry<S>>,
        checkpointer: Option<Arc<dyn Checkpointer<S>>>,
        event_sink: Option<Arc<dyn NodeEventSink>>,
        phase_labels: HashMap<String, String>,
        retry_policy: RetryPolicy,
        step_limit: usize,
    ) -> Self {
        Self {
            nodes,
            first_node_id,
            next_map,
            checkpointer,
            event_sink,
            phase_labels,
            retry_policy,
            step_limit,
        }
    }

    /// The node an invoke would start from (entry node or resume point).
    pub fn entry_node(&self, config: &RunConfig) -> String {
        config
            .resume_from
            .clone()
            .unwrap_or_else(|| self.first_node_id.clone())
    }

    fn phase_of(&self, node_id: &str) -> &str {
        self.phase_labels.get(node_id).map(String::as_str).unwrap_or("")
    }

    async fn emit(
        &self,
        session_id: &str,
        node: &str,
        status: EventStatus,
        duration_ms: u64,
        summary: &str,
        payload: Value,
    ) {
        if let Some(sink) = &self.event_sink {
            sink.node_event(
                session_id,
                node,
                self.phase_of(node),
                status,
                duration_ms,
                summary,
                payload,
            )
            .await;
        }
    }

    async fn checkpoint(&self, config: &RunConfig, node: &str, state: &S) {
        if let (Some(cp), Some(session_id)) = (&self.checkpointer, &config.session_id) {
            let checkpoint = Checkpoint::new(node, state.clone());
            if let Err(e) = cp.put(session_id, &checkpoint).await {
                tracing::warn!(session_id = %session_id, node = %node, error = %e, "checkpoint write failed");
            }
        }
    }

    async fn execute_with_retry(
        &self,
        node: Arc<dyn Node<S>>,
        state: &S,
    ) -> Result<(S, Next), SessionError> {
        let mut attempt = 0;
        loop {
            match node.run(state.clone()).await {
                Ok(output) => return Ok(output),
                Err(e) => {
                    let transient = matches!(
                        e,
                        SessionError::External { .. } | SessionError::Internal(_)
                    );
                    if transient && self.retry_policy.should_retry(attempt) {
                        let delay = self.retry_policy.delay(attempt);
                        if delay > std::time::Duration::ZERO {
                            tokio::time::sleep(delay).await;
                        }
                        attempt += 1;
                        continue;
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Runs the graph from the entry node (or the resume point) to END.
    ///
    /// State evolves in strict node order; the checkpoint at node N reflects
    /// the cumulative effect of nodes 1..N. Returns the final state, or the
    /// interrupt/error that parked the session (already checkpointed).
    pub async fn invoke(
        &self,
        state: S,
        config: &RunConfig,
        cancel: &CancelFlag,
    ) -> Result<S, SessionError> {
        let session_id = config.session_id.clone().unwrap_or_default();
        let mut current_id = self.entry_node(config);
        let mut state = state;
        log_graph_start(&session_id, &current_id);

        let mut steps = 0usize;
        loop {
            if steps >= self.step_limit {
                let err = SessionError::Internal(format!(
                    "step limit {} exceeded at node {}",
                    self.step_limit, current_id
                ));
                self.checkpoint(config, &current_id, &state).await;
                log_graph_error(&session_id, &err);
                return Err(err);
            }
            steps += 1;

            if cancel.is_cancelled() {
                self.checkpoint(config, &current_id, &state).await;
                self.emit(
                    &session_id,
                    &current_id,
                    EventStatus::End,
                    0,
                    "cancelled at node boundary",
                    Value::Null,
                )
                .await;
                return Err(SessionError::Cancelled);
            }

            let node = match self.nodes.get(&current_id) {
                Some(n) => n.clone(),
                None => {
                    let err = SessionError::Internal(format!("unknown node: {}", current_id));
                    log_graph_error(&session_id, &err);
                    return Err(err);
                }
            };

            log_node_start(&current_id);
            self.emit(
                &session_id,
                &current_id,
                EventStatus::Start,
                0,
                "",
                Value::Null,
            )
            .await;
            let started = Instant::now();

            let (new_state, next) = match self.execute_with_retry(node, &state).await {
                Ok(output) => output,
                Err(SessionError::Interrupted(interrupt)) => {
                    // Pre-node state: resume re-runs this node with the
                    // user payload injected by the runner.
                    self.checkpoint(config, &current_id, &state).await;
                    self.emit(
                        &session_id,
                        &current_id,
                        EventStatus::Interrupt,
                        started.elapsed().as_millis() as u64,
                        interrupt
                            .0
                            .id
                            .as_deref()
                            .unwrap_or("awaiting user input"),
                        interrupt.0.value.clone(),
                    )
                    .await;
                    return Err(SessionError::Interrupted(interrupt));
                }
                Err(e) => {
                    self.checkpoint(config, &current_id, &state).await;
                    self.emit(
                        &session_id,
                        &current_id,
                        EventStatus::Error,
                        started.elapsed().as_millis() as u64,
                        &e.to_string(),
                        serde_json::json!({"code": e.code()}),
                    )
                    .await;
                    log_graph_error(&session_id, &e);
                    return Err(e);
                }
            };

            log_node_complete(&current_id, &next);
            state = new_state;

            let next_id: Option<String> = if let Some(NextEntry::Conditional(router)) =
                self.next_map.get(&current_id)
            {
                let target = router.resolve_next(&state);
                tracing::debug!(from = %current_id, to = %target, "conditional routing");
                Some(target)
            } else {
                match next {
                    Next::End => None,
                    Next::Node(id) => Some(id),
                    Next::Continue => self.next_map.get(&current_id).and_then(|e| {
                        if let NextEntry::Unconditional(id) = e {
                            Some(id.clone())
                        } else {
                            None
                        }
                    }),
                }
            };

            let resolved = next_id.unwrap_or_else(|| END.to_string());
            self.emit(
                &session_id,
                &current_id,
                EventStatus::End,
                started.elapsed().as_millis() as u64,
                "",
                serde_json::json!({"next": resolved}),
            )
            .await;
            self.checkpoint(config, &resolved, &state).await;

            if resolved == END {
                tracing::info!(session_id = %session_id, steps = steps, "graph complete");
                return Ok(state);
            }
            if !self.nodes.contains_key(&resolved) {
                let err = SessionError::Internal(format!("routed to unknown node: {}", resolved));
                log_graph_error(&session_id, &err);
                return Err(err);
            }
            current_id = resolved;
        }
    }
}
