//! The session graph: an 18-node, six-phase state machine that takes a
//! natural-language requirement to a validated platform write.
//!
//! Nodes live one phase-group per file under [`nodes`]; routing is a
//! declarative `(from, guard, to)` transition table in [`transitions`],
//! folded into conditional routers at build time. [`SessionRunner`] owns the
//! compiled graph, checkpointer, and event log, and implements the ingress
//! contract (start / resume / cancel with a HITL long-poll bound).

mod context;
pub mod nodes;
mod prompts;
mod runner;
mod transitions;

pub use context::SessionContext;
pub use runner::{SessionOptions, SessionOutcome, SessionRunner, SessionStatus};
pub use transitions::{build_session_graph, Transition, TRANSITIONS};

/// Node ids, in graph order.
pub mod node_ids {
    pub const CLASSIFY_INTENT: &str = "classify_intent";
    pub const HYDRATE_CONTEXT: &str = "hydrate_context";
    pub const RESOLVE_TARGET: &str = "resolve_target";
    pub const HITL_SELECT_TARGET: &str = "hitl_select_target";
    pub const LOAD_CURRENT_FLOW: &str = "load_current_flow";
    pub const SUMMARIZE_CURRENT_FLOW: &str = "summarize_current_flow";
    pub const PLAN: &str = "plan";
    pub const HITL_PLAN: &str = "hitl_plan";
    pub const DEFINE_PATCH_SCOPE: &str = "define_patch_scope";
    pub const COMPILE_PATCH_IR: &str = "compile_patch_ir";
    pub const COMPILE_FLOW_DATA: &str = "compile_flow_data";
    pub const VALIDATE: &str = "validate";
    pub const REPAIR_SCHEMA: &str = "repair_schema";
    pub const PREFLIGHT_VALIDATE_PATCH: &str = "preflight_validate_patch";
    pub const APPLY_PATCH: &str = "apply_patch";
    pub const TEST: &str = "test";
    pub const EVALUATE: &str = "evaluate";
    pub const HITL_REVIEW: &str = "hitl_review";

    pub const ALL: [&str; 18] = [
        CLASSIFY_INTENT,
        HYDRATE_CONTEXT,
        RESOLVE_TARGET,
        HITL_SELECT_TARGET,
        LOAD_CURRENT_FLOW,
        SUMMARIZE_CURRENT_FLOW,
        PLAN,
        HITL_PLAN,
        DEFINE_PATCH_SCOPE,
        COMPILE_PATCH_IR,
        COMPILE_FLOW_DATA,
        VALIDATE,
        REPAIR_SCHEMA,
        PREFLIGHT_VALIDATE_PATCH,
        APPLY_PATCH,
        TEST,
        EVALUATE,
        HITL_REVIEW,
    ];
}

use crate::tools::Phase;

/// Budget phase each node's tokens and events are attributed to.
pub fn phase_of(node_id: &str) -> Phase {
    use node_ids::*;
    match node_id {
        CLASSIFY_INTENT | HYDRATE_CONTEXT | RESOLVE_TARGET | HITL_SELECT_TARGET
        | LOAD_CURRENT_FLOW | SUMMARIZE_CURRENT_FLOW => Phase::Discover,
        PLAN | HITL_PLAN | DEFINE_PATCH_SCOPE => Phase::Plan,
        COMPILE_PATCH_IR | COMPILE_FLOW_DATA | VALIDATE | REPAIR_SCHEMA => Phase::Patch,
        PREFLIGHT_VALIDATE_PATCH | APPLY_PATCH => Phase::Converge,
        TEST => Phase::Test,
        _ => Phase::Evaluate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: All 18 nodes have a phase; the split matches the staged design.
    #[test]
    fn phases_cover_all_nodes() {
        for node in node_ids::ALL {
            let _ = phase_of(node);
        }
        assert_eq!(phase_of(node_ids::PLAN), Phase::Plan);
        assert_eq!(phase_of(node_ids::COMPILE_PATCH_IR), Phase::Patch);
        assert_eq!(phase_of(node_ids::APPLY_PATCH), Phase::Converge);
        assert_eq!(phase_of(node_ids::TEST), Phase::Test);
        assert_eq!(phase_of(node_ids::HITL_REVIEW), Phase::Evaluate);
    }
}
