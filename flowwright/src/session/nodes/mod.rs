//! Session node implementations, one file per phase group.

mod baseline;
mod compile;
mod converge;
mod intent;
mod planning;
mod target;
mod validate;

pub use baseline::{LoadCurrentFlowNode, SummarizeCurrentFlowNode};
pub use compile::{CompileFlowDataNode, CompilePatchIrNode};
pub use converge::{ApplyPatchNode, EvaluateNode, HitlReviewNode, PreflightValidatePatchNode, TestNode};
pub use intent::{ClassifyIntentNode, HydrateContextNode};
pub use planning::{DefinePatchScopeNode, HitlPlanNode, PlanNode};
pub use target::{HitlSelectTargetNode, ResolveTargetNode};
pub use validate::{RepairSchemaNode, ValidateNode};

use std::sync::Arc;
use std::time::Instant;

use crate::error::SessionError;
use crate::llm::{LlmEngine, LlmReply};
use crate::message::Message;
use crate::metrics::{record_node_metrics, NodeMetrics};
use crate::state::SessionState;
use crate::tools::ToolDef;

use super::phase_of;

/// Primary fact/artifact domain for this session graph.
pub(crate) const DOMAIN: &str = "chatflow";
/// Patch-iteration counters and scope facts.
pub(crate) const PATCH: &str = "patch";
/// Validation outcome facts.
pub(crate) const VALIDATION: &str = "validation";

/// Runs one completion and records its metrics under the node's phase.
pub(crate) async fn complete_and_record(
    llm: &Arc<dyn LlmEngine>,
    state: &mut SessionState,
    node_id: &str,
    messages: &[Message],
    tools: Option<&[ToolDef]>,
) -> Result<LlmReply, SessionError> {
    let started = Instant::now();
    let reply = llm.complete(messages, tools).await.map_err(SessionError::from)?;
    record_node_metrics(
        state,
        node_id,
        phase_of(node_id),
        &NodeMetrics {
            input_tokens: reply.input_tokens,
            output_tokens: reply.output_tokens,
            duration_ms: started.elapsed().as_millis() as u64,
            ..Default::default()
        },
    );
    Ok(reply)
}

/// True when this session is an UPDATE of an existing chatflow.
pub(crate) fn is_update(state: &SessionState) -> bool {
    state.fact_str(DOMAIN, "intent") == Some("update")
}
