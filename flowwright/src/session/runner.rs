//! Session runner: the ingress contract over the compiled graph.
//!
//! `start` creates and drives a session; `resume` replays from the latest
//! checkpoint with a user payload; `cancel` flips the cooperative flag.
//! Blocking callers get a long-poll bound — a timeout parks the session
//! resumable, it does not cancel it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SessionError;
use crate::graph::{CancelFlag, CompilationError, CompiledStateGraph, RunConfig};
use crate::memory::Checkpointer;
use crate::state::SessionState;

use super::transitions::build_session_graph;
use super::SessionContext;

/// Ingress options: `{auto_approve?, max_wait_secs?}`.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub auto_approve: bool,
    /// Long-poll bound for this call; defaults to the configured HITL bound.
    pub max_wait_secs: Option<u64>,
}

/// Terminal status of one driving call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Completed,
    PendingInterrupt,
    Timeout,
    Error,
    Cancelled,
}

/// Outcome returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOutcome {
    pub session_id: String,
    pub status: SessionStatus,
    /// Ids of created/updated chatflows.
    pub result_refs: Vec<String>,
    pub summary: String,
    /// Interrupt payload when status is `pending_interrupt`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupt: Option<Value>,
}

/// Owns the compiled graph, checkpointer, and per-session cancel flags.
pub struct SessionRunner {
    ctx: Arc<SessionContext>,
    graph: CompiledStateGraph<SessionState>,
    checkpointer: Arc<dyn Checkpointer<SessionState>>,
    cancels: Mutex<HashMap<String, CancelFlag>>,
}

impl SessionRunner {
    pub fn new(
        ctx: Arc<SessionContext>,
        checkpointer: Arc<dyn Checkpointer<SessionState>>,
    ) -> Result<Self, CompilationError> {
        let graph = build_session_graph(ctx.clone(), Some(checkpointer.clone()))?;
        Ok(Self {
            ctx,
            graph,
            checkpointer,
            cancels: Mutex::new(HashMap::new()),
        })
    }

    /// Starts a new session for `requirement` and drives it until it
    /// completes, interrupts, times out, or fails.
    pub async fn start(&self, requirement: &str, options: SessionOptions) -> SessionOutcome {
        let session_id = uuid::Uuid::new_v4().to_string();
        let mut state = SessionState::new(session_id.clone(), requirement);
        state.auto_approve = options.auto_approve;
        state.runtime_mode = self.ctx.config.runtime_mode;
        let config = RunConfig::for_session(session_id);
        self.drive(state, config, options.max_wait_secs).await
    }

    /// Resumes a parked session from its latest checkpoint, injecting the
    /// user payload into state so the interrupted node consumes it.
    pub async fn resume(&self, session_id: &str, payload: Value) -> SessionOutcome {
        let checkpoint = match self.checkpointer.get_latest(session_id).await {
            Ok(Some(cp)) => cp,
            Ok(None) => {
                return SessionOutcome {
                    session_id: session_id.to_string(),
                    status: SessionStatus::Error,
                    result_refs: vec![],
                    summary: "no checkpoint for session".into(),
                    interrupt: None,
                }
            }
            Err(e) => {
                return SessionOutcome {
                    session_id: session_id.to_string(),
                    status: SessionStatus::Error,
                    result_refs: vec![],
                    summary: format!("checkpoint load failed: {}", e),
                    interrupt: None,
                }
            }
        };
        let mut state = checkpoint.state;
        if state.done {
            return Self::outcome_from_state(SessionStatus::Completed, &state, None);
        }
        state.resume_payload = Some(payload);
        let config = RunConfig::resuming(session_id, checkpoint.node);
        self.drive(state, config, None).await
    }

    /// Cooperative cancel: observed at the next node boundary.
    pub fn cancel(&self, session_id: &str) {
        if let Some(flag) = self.cancels.lock().expect("cancel map").get(session_id) {
            flag.cancel();
        }
    }

    fn outcome_from_state(
        status: SessionStatus,
        state: &SessionState,
        interrupt: Option<Value>,
    ) -> SessionOutcome {
        let result_refs = state
            .fact_str("chatflow", "applied_chatflow_id")
            .map(|id| vec![id.to_string()])
            .unwrap_or_default();
        let summary = match (
            state.fact_str("evaluate", "verdict"),
            state.fact_str("chatflow", "diff"),
        ) {
            (Some(verdict), Some(diff)) => format!("{} ({})", verdict, diff),
            (Some(verdict), None) => verdict.to_string(),
            _ => format!("iteration {}", state.iteration),
        };
        SessionOutcome {
            session_id: state.session_id.clone(),
            status,
            result_refs,
            summary,
            interrupt,
        }
    }

    async fn drive(
        &self,
        state: SessionState,
        config: RunConfig,
        max_wait_secs: Option<u64>,
    ) -> SessionOutcome {
        let session_id = config.session_id.clone().unwrap_or_default();
        let cancel = CancelFlag::new();
        self.cancels
            .lock()
            .expect("cancel map")
            .insert(session_id.clone(), cancel.clone());

        let wait = Duration::from_secs(
            max_wait_secs.unwrap_or(self.ctx.config.hitl_long_poll_secs),
        );
        let snapshot = state.clone();
        let result =
            tokio::time::timeout(wait, self.graph.invoke(state, &config, &cancel)).await;

        self.cancels.lock().expect("cancel map").remove(&session_id);

        match result {
            Err(_) => SessionOutcome {
                session_id,
                status: SessionStatus::Timeout,
                result_refs: vec![],
                summary: "long-poll bound reached; session is resumable".into(),
                interrupt: None,
            },
            Ok(Ok(final_state)) => {
                Self::outcome_from_state(SessionStatus::Completed, &final_state, None)
            }
            Ok(Err(SessionError::Interrupted(interrupt))) => {
                let latest = self
                    .checkpointer
                    .get_latest(&session_id)
                    .await
                    .ok()
                    .flatten()
                    .map(|cp| cp.state)
                    .unwrap_or(snapshot);
                Self::outcome_from_state(
                    SessionStatus::PendingInterrupt,
                    &latest,
                    Some(interrupt.0.value),
                )
            }
            Ok(Err(SessionError::Cancelled)) => SessionOutcome {
                session_id,
                status: SessionStatus::Cancelled,
                result_refs: vec![],
                summary: "cancelled at node boundary".into(),
                interrupt: None,
            },
            Ok(Err(e)) => SessionOutcome {
                session_id,
                status: SessionStatus::Error,
                result_refs: vec![],
                summary: format!("{}: {}", e.code(), e),
                interrupt: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySaver;
    use crate::session::nodes::test_support::test_context;

    fn create_replies() -> Vec<&'static str> {
        vec![
            // classify_intent
            r#"{"intent": "create", "confidence": 0.9}"#,
            // plan
            "1. Add chatOpenAI\n2. Add bufferMemory\n3. Wire conversationChain\n\
             {\"goal\": \"A chatbot that remembers context\", \
              \"node_types\": [\"chatOpenAI\", \"bufferMemory\", \"conversationChain\"], \
              \"credential_types\": [\"openAIApi\"], \"data_contracts\": [], \
              \"success_criteria\": [\"remembers prior turns\"]}",
            // define_patch_scope
            r#"{"max_ops": 10, "focus_area": "conversation", "protected_nodes": []}"#,
            // compile_patch_ir
            r#"{"ops": [
                {"op": "add_node", "node_id": "chatOpenAI_0", "node_type": "chatOpenAI"},
                {"op": "add_node", "node_id": "bufferMemory_0", "node_type": "bufferMemory"},
                {"op": "add_node", "node_id": "conversationChain_0", "node_type": "conversationChain"},
                {"op": "bind_credential", "node_id": "chatOpenAI_0",
                 "credential_id": "cred-1", "credential_type": "openAIApi"},
                {"op": "connect", "source_id": "chatOpenAI_0", "source_anchor": "chatOpenAI",
                 "target_id": "conversationChain_0", "target_anchor": "model"},
                {"op": "connect", "source_id": "bufferMemory_0", "source_anchor": "bufferMemory",
                 "target_id": "conversationChain_0", "target_anchor": "memory"}
            ]}"#,
        ]
    }

    /// **Scenario**: An auto-approved CREATE session runs end to end: completed,
    /// one created chatflow, done=true checkpointed.
    #[tokio::test]
    async fn auto_approved_create_completes() {
        let (ctx, platform) = test_context(create_replies());
        let saver: Arc<MemorySaver<SessionState>> = Arc::new(MemorySaver::new());
        let runner = SessionRunner::new(ctx, saver.clone()).unwrap();

        let outcome = runner
            .start(
                "A chatbot that remembers context",
                SessionOptions {
                    auto_approve: true,
                    max_wait_secs: Some(30),
                },
            )
            .await;

        assert_eq!(outcome.status, SessionStatus::Completed, "{:?}", outcome);
        assert_eq!(outcome.result_refs.len(), 1);
        assert_eq!(
            platform.create_calls.load(std::sync::atomic::Ordering::SeqCst),
            1
        );
        let checkpoint = saver
            .get_latest(&outcome.session_id)
            .await
            .unwrap()
            .unwrap();
        assert!(checkpoint.state.done);
    }

    /// **Scenario**: Without auto_approve, the session parks at the plan
    /// interrupt and resumes to completion on approval.
    #[tokio::test]
    async fn interactive_session_pauses_and_resumes() {
        let (ctx, _) = test_context(create_replies());
        let saver: Arc<MemorySaver<SessionState>> = Arc::new(MemorySaver::new());
        let runner = SessionRunner::new(ctx, saver).unwrap();

        let outcome = runner
            .start("A chatbot that remembers context", SessionOptions::default())
            .await;
        assert_eq!(outcome.status, SessionStatus::PendingInterrupt);
        let interrupt = outcome.interrupt.unwrap();
        assert_eq!(interrupt["kind"], "plan_approval");

        // Approve the plan; the next stop is the terminal review interrupt.
        let outcome = runner
            .resume(&outcome.session_id, serde_json::json!({"approved": true}))
            .await;
        assert_eq!(outcome.status, SessionStatus::PendingInterrupt);
        assert_eq!(outcome.interrupt.as_ref().unwrap()["kind"], "review");

        let outcome = runner
            .resume(&outcome.session_id, serde_json::json!({"acknowledged": true}))
            .await;
        assert_eq!(outcome.status, SessionStatus::Completed);
    }

    /// **Scenario**: Resuming an unknown session is an error outcome, not a panic.
    #[tokio::test]
    async fn resume_unknown_session_errors() {
        let (ctx, _) = test_context(vec![]);
        let saver: Arc<MemorySaver<SessionState>> = Arc::new(MemorySaver::new());
        let runner = SessionRunner::new(ctx, saver).unwrap();
        let outcome = runner.resume("ghost", serde_json::json!({})).await;
        assert_eq!(outcome.status, SessionStatus::Error);
    }
}
