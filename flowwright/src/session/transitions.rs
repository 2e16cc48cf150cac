//! The session state machine as data: a `(from, guard, to)` table folded
//! into conditional routers at build time.
//!
//! Guards are pure functions of facts; transitions for one source node are
//! evaluated in table order and the first match wins. CREATE sessions skip
//! phases B and C because `hydrate_context` routes straight to `plan`;
//! schema repair loops E→D at most once (the `compile_retries` guard).

use std::sync::Arc;

use crate::graph::{
    CompilationError, CompiledStateGraph, ConditionalRouterFn, StateGraph, END, START,
};
use crate::memory::Checkpointer;
use crate::state::SessionState;

use super::nodes::{
    ApplyPatchNode, ClassifyIntentNode, CompileFlowDataNode, CompilePatchIrNode,
    DefinePatchScopeNode, EvaluateNode, HitlPlanNode, HitlReviewNode, HitlSelectTargetNode,
    HydrateContextNode, LoadCurrentFlowNode, PlanNode, PreflightValidatePatchNode,
    RepairSchemaNode, ResolveTargetNode, SummarizeCurrentFlowNode, TestNode, ValidateNode,
};
use super::{node_ids, phase_of, SessionContext};

/// Guard over session facts.
pub type Guard = fn(&SessionState) -> bool;

/// One row of the transition table.
pub struct Transition {
    pub from: &'static str,
    pub guard: Guard,
    pub to: &'static str,
}

fn always(_: &SessionState) -> bool {
    true
}

fn intent_is_update(s: &SessionState) -> bool {
    s.fact_str("chatflow", "intent") == Some("update")
}

fn target_selected(s: &SessionState) -> bool {
    s.fact_str("chatflow", "target_chatflow_id").is_some()
}

fn plan_revision_requested(s: &SessionState) -> bool {
    s.fact_bool("plan", "revision_requested") == Some(true)
}

fn validation_ok(s: &SessionState) -> bool {
    s.fact_bool("validation", "ok") == Some(true)
}

fn can_repair_schema(s: &SessionState) -> bool {
    s.fact_str("validation", "failure_type") == Some("schema_mismatch")
        && s.fact_u64("patch", "repairs_used").unwrap_or(0)
            < s.fact_u64("patch", "max_repairs").unwrap_or(2)
        && s.fact_u64("patch", "compile_retries").unwrap_or(0) < 1
}

fn schema_repaired(s: &SessionState) -> bool {
    s.fact_bool("patch", "repaired") == Some(true)
}

fn preflight_ok(s: &SessionState) -> bool {
    s.fact_bool("preflight", "ok") == Some(true)
}

fn apply_applied(s: &SessionState) -> bool {
    s.fact_str("apply", "status") == Some("applied")
}

fn apply_conflict(s: &SessionState) -> bool {
    s.fact_str("apply", "status") == Some("conflict")
}

fn verdict_iterate(s: &SessionState) -> bool {
    // The iteration ceiling is folded into the verdict by the evaluate node.
    s.fact_str("evaluate", "verdict") == Some("iterate")
}

/// The full transition table. Order matters within one `from`.
pub const TRANSITIONS: &[Transition] = &[
    Transition { from: node_ids::CLASSIFY_INTENT, guard: always, to: node_ids::HYDRATE_CONTEXT },
    Transition { from: node_ids::HYDRATE_CONTEXT, guard: intent_is_update, to: node_ids::RESOLVE_TARGET },
    Transition { from: node_ids::HYDRATE_CONTEXT, guard: always, to: node_ids::PLAN },
    Transition { from: node_ids::RESOLVE_TARGET, guard: always, to: node_ids::HITL_SELECT_TARGET },
    Transition { from: node_ids::HITL_SELECT_TARGET, guard: target_selected, to: node_ids::LOAD_CURRENT_FLOW },
    Transition { from: node_ids::HITL_SELECT_TARGET, guard: always, to: node_ids::PLAN },
    Transition { from: node_ids::LOAD_CURRENT_FLOW, guard: always, to: node_ids::SUMMARIZE_CURRENT_FLOW },
    Transition { from: node_ids::SUMMARIZE_CURRENT_FLOW, guard: always, to: node_ids::PLAN },
    Transition { from: node_ids::PLAN, guard: always, to: node_ids::HITL_PLAN },
    Transition { from: node_ids::HITL_PLAN, guard: plan_revision_requested, to: node_ids::PLAN },
    Transition { from: node_ids::HITL_PLAN, guard: always, to: node_ids::DEFINE_PATCH_SCOPE },
    Transition { from: node_ids::DEFINE_PATCH_SCOPE, guard: always, to: node_ids::COMPILE_PATCH_IR },
    Transition { from: node_ids::COMPILE_PATCH_IR, guard: always, to: node_ids::COMPILE_FLOW_DATA },
    Transition { from: node_ids::COMPILE_FLOW_DATA, guard: always, to: node_ids::VALIDATE },
    Transition { from: node_ids::VALIDATE, guard: validation_ok, to: node_ids::PREFLIGHT_VALIDATE_PATCH },
    Transition { from: node_ids::VALIDATE, guard: can_repair_schema, to: node_ids::REPAIR_SCHEMA },
    Transition { from: node_ids::VALIDATE, guard: always, to: node_ids::HITL_REVIEW },
    Transition { from: node_ids::REPAIR_SCHEMA, guard: schema_repaired, to: node_ids::COMPILE_PATCH_IR },
    Transition { from: node_ids::REPAIR_SCHEMA, guard: always, to: node_ids::HITL_REVIEW },
    Transition { from: node_ids::PREFLIGHT_VALIDATE_PATCH, guard: preflight_ok, to: node_ids::APPLY_PATCH },
    Transition { from: node_ids::PREFLIGHT_VALIDATE_PATCH, guard: always, to: node_ids::HITL_REVIEW },
    Transition { from: node_ids::APPLY_PATCH, guard: apply_applied, to: node_ids::TEST },
    Transition { from: node_ids::APPLY_PATCH, guard: apply_conflict, to: node_ids::HITL_REVIEW },
    Transition { from: node_ids::APPLY_PATCH, guard: always, to: node_ids::EVALUATE },
    Transition { from: node_ids::TEST, guard: always, to: node_ids::EVALUATE },
    Transition { from: node_ids::EVALUATE, guard: verdict_iterate, to: node_ids::PLAN },
    Transition { from: node_ids::EVALUATE, guard: always, to: node_ids::HITL_REVIEW },
    Transition { from: node_ids::HITL_REVIEW, guard: always, to: END },
];

/// Builds the compiled session graph: all 18 nodes wired per the table.
pub fn build_session_graph(
    ctx: Arc<SessionContext>,
    checkpointer: Option<Arc<dyn Checkpointer<SessionState>>>,
) -> Result<CompiledStateGraph<SessionState>, CompilationError> {
    let mut graph = StateGraph::<SessionState>::new();

    graph.add_node(node_ids::CLASSIFY_INTENT, Arc::new(ClassifyIntentNode::new(ctx.clone())));
    graph.add_node(node_ids::HYDRATE_CONTEXT, Arc::new(HydrateContextNode::new(ctx.clone())));
    graph.add_node(node_ids::RESOLVE_TARGET, Arc::new(ResolveTargetNode::new(ctx.clone())));
    graph.add_node(node_ids::HITL_SELECT_TARGET, Arc::new(HitlSelectTargetNode::new(ctx.clone())));
    graph.add_node(node_ids::LOAD_CURRENT_FLOW, Arc::new(LoadCurrentFlowNode::new(ctx.clone())));
    graph.add_node(node_ids::SUMMARIZE_CURRENT_FLOW, Arc::new(SummarizeCurrentFlowNode::new()));
    graph.add_node(node_ids::PLAN, Arc::new(PlanNode::new(ctx.clone())));
    graph.add_node(node_ids::HITL_PLAN, Arc::new(HitlPlanNode::new(ctx.clone())));
    graph.add_node(node_ids::DEFINE_PATCH_SCOPE, Arc::new(DefinePatchScopeNode::new(ctx.clone())));
    graph.add_node(node_ids::COMPILE_PATCH_IR, Arc::new(CompilePatchIrNode::new(ctx.clone())));
    graph.add_node(node_ids::COMPILE_FLOW_DATA, Arc::new(CompileFlowDataNode::new(ctx.clone())));
    graph.add_node(node_ids::VALIDATE, Arc::new(ValidateNode::new(ctx.clone())));
    graph.add_node(node_ids::REPAIR_SCHEMA, Arc::new(RepairSchemaNode::new(ctx.clone())));
    graph.add_node(
        node_ids::PREFLIGHT_VALIDATE_PATCH,
        Arc::new(PreflightValidatePatchNode::new(ctx.clone())),
    );
    graph.add_node(node_ids::APPLY_PATCH, Arc::new(ApplyPatchNode::new(ctx.clone())));
    graph.add_node(node_ids::TEST, Arc::new(TestNode::new(ctx.clone())));
    graph.add_node(node_ids::EVALUATE, Arc::new(EvaluateNode::new(ctx.clone())));
    graph.add_node(node_ids::HITL_REVIEW, Arc::new(HitlReviewNode::new(ctx.clone())));

    for node in node_ids::ALL {
        graph.set_phase(node, phase_of(node).as_str());
    }

    graph.add_edge(START, node_ids::CLASSIFY_INTENT);

    // Fold the table: one plain edge per single-alternative source, one
    // ordered router per branching source.
    let mut by_source: Vec<(&'static str, Vec<&Transition>)> = Vec::new();
    for transition in TRANSITIONS {
        match by_source.iter_mut().find(|(from, _)| *from == transition.from) {
            Some((_, list)) => list.push(transition),
            None => by_source.push((transition.from, vec![transition])),
        }
    }
    for (from, transitions) in by_source {
        if transitions.len() == 1 {
            graph.add_edge(from, transitions[0].to);
            continue;
        }
        let table: Vec<(Guard, String)> = transitions
            .iter()
            .map(|t| (t.guard, t.to.to_string()))
            .collect();
        let router: ConditionalRouterFn<SessionState> = Arc::new(move |state| {
            table
                .iter()
                .find(|(guard, _)| guard(state))
                .map(|(_, to)| to.clone())
                .unwrap_or_else(|| END.to_string())
        });
        graph.add_conditional_edges(from, router, None);
    }

    let graph = graph.with_event_sink(ctx.emitter.clone());
    match checkpointer {
        Some(cp) => graph.compile_with_checkpointer(cp),
        None => graph.compile(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// **Scenario**: Every transition references a known node (or END) and every
    /// source ends with an unconditional fallback.
    #[test]
    fn table_is_well_formed() {
        for transition in TRANSITIONS {
            assert!(node_ids::ALL.contains(&transition.from), "{}", transition.from);
            assert!(
                transition.to == END || node_ids::ALL.contains(&transition.to),
                "{}",
                transition.to
            );
        }
        // The last row for each source must be the `always` fallback.
        let mut last_for: std::collections::HashMap<&str, &Transition> =
            std::collections::HashMap::new();
        for t in TRANSITIONS {
            last_for.insert(t.from, t);
        }
        for (from, t) in last_for {
            assert!(t.guard as usize == always as usize, "{} lacks a fallback", from);
        }
    }

    /// **Scenario**: The documented routing decisions hold — CREATE skips target
    /// resolution, schema mismatch routes to repair, the verdict drives the loop.
    #[test]
    fn documented_routes() {
        let route = |from: &str, state: &SessionState| -> String {
            TRANSITIONS
                .iter()
                .filter(|t| t.from == from)
                .find(|t| (t.guard)(state))
                .map(|t| t.to.to_string())
                .expect("fallback row")
        };

        let mut create = SessionState::new("s", "r");
        create.set_fact("chatflow", "intent", json!("create"));
        assert_eq!(route(node_ids::HYDRATE_CONTEXT, &create), node_ids::PLAN);

        let mut update = SessionState::new("s", "r");
        update.set_fact("chatflow", "intent", json!("update"));
        assert_eq!(
            route(node_ids::HYDRATE_CONTEXT, &update),
            node_ids::RESOLVE_TARGET
        );

        let mut selected = SessionState::new("s", "r");
        selected.set_fact("chatflow", "target_chatflow_id", json!("cf-1"));
        assert_eq!(
            route(node_ids::HITL_SELECT_TARGET, &selected),
            node_ids::LOAD_CURRENT_FLOW
        );
        let chose_create = SessionState::new("s", "r");
        assert_eq!(route(node_ids::HITL_SELECT_TARGET, &chose_create), node_ids::PLAN);

        let mut mismatch = SessionState::new("s", "r");
        mismatch.set_fact("validation", "ok", json!(false));
        mismatch.set_fact("validation", "failure_type", json!("schema_mismatch"));
        mismatch.set_fact("patch", "repairs_used", json!(0));
        mismatch.set_fact("patch", "max_repairs", json!(2));
        mismatch.set_fact("patch", "compile_retries", json!(0));
        assert_eq!(route(node_ids::VALIDATE, &mismatch), node_ids::REPAIR_SCHEMA);

        // A second mismatch after the one allowed retry surfaces to review.
        mismatch.set_fact("patch", "compile_retries", json!(1));
        assert_eq!(route(node_ids::VALIDATE, &mismatch), node_ids::HITL_REVIEW);

        let mut structural = SessionState::new("s", "r");
        structural.set_fact("validation", "ok", json!(false));
        structural.set_fact("validation", "failure_type", json!("structural"));
        assert_eq!(route(node_ids::VALIDATE, &structural), node_ids::HITL_REVIEW);

        let mut iterate = SessionState::new("s", "r");
        iterate.set_fact("evaluate", "verdict", json!("iterate"));
        assert_eq!(route(node_ids::EVALUATE, &iterate), node_ids::PLAN);
        let mut done = SessionState::new("s", "r");
        done.set_fact("evaluate", "verdict", json!("done"));
        assert_eq!(route(node_ids::EVALUATE, &done), node_ids::HITL_REVIEW);

        let mut conflict = SessionState::new("s", "r");
        conflict.set_fact("apply", "status", json!("conflict"));
        assert_eq!(route(node_ids::APPLY_PATCH, &conflict), node_ids::HITL_REVIEW);
    }
}
