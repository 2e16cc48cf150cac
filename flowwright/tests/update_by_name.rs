//! End-to-end UPDATE: "Add a flight-price custom tool" to "Trip Planner".

mod common;

use common::{harness, trip_planner_baseline};
use flowwright::flow::{FlowGraph, Handle};
use flowwright::memory::Checkpointer;
use flowwright::session::{SessionOptions, SessionStatus};

fn replies() -> Vec<&'static str> {
    vec![
        r#"{"intent": "update", "target_name": "Trip Planner", "confidence": 0.9}"#,
        "1. Add a customTool node with the flight-price lookup\n\
         2. Wire it into the agent's tools anchor\n\
         {\"goal\": \"Add a flight-price custom tool\", \
          \"node_types\": [\"customTool\", \"toolAgent\"], \
          \"credential_types\": [], \"data_contracts\": [], \
          \"success_criteria\": [\"agent can quote flight prices\"]}",
        r#"{"max_ops": 6, "focus_area": "agent tools", "protected_nodes": ["chatOpenAI_0"]}"#,
        r#"{"ops": [
            {"op": "add_node", "node_id": "customTool_0", "node_type": "customTool",
             "params": {
                "name": "flight_price",
                "description": "Look up current flight prices",
                "code": "const price = await fetchPrice($from, $to); return String(price);",
                "schema": "{\"from\": \"string\", \"to\": \"string\"}"
             }},
            {"op": "connect", "source_id": "customTool_0", "source_anchor": "customTool",
             "target_id": "toolAgent_0", "target_anchor": "tools"}
        ]}"#,
    ]
}

/// **Scenario**: The UPDATE seed case — resolve_target finds the flow,
/// load_current_flow fires once, and the compiled flow differs from the
/// baseline by exactly one customTool node and one edge into
/// `toolAgent.tools`.
#[tokio::test]
async fn update_adds_single_tool_node() {
    let types = ["chatOpenAI", "toolAgent", "customTool"];
    let h = harness(replies(), &types, &types);
    h.platform.seed_chatflow(
        "cf-1",
        "Trip Planner",
        trip_planner_baseline().to_value(),
    );

    let outcome = h
        .runner
        .start(
            "Add a flight-price custom tool to Trip Planner",
            SessionOptions {
                auto_approve: true,
                max_wait_secs: Some(30),
            },
        )
        .await;
    assert_eq!(outcome.status, SessionStatus::Completed, "{:?}", outcome);
    assert_eq!(outcome.result_refs, vec!["cf-1".to_string()]);

    // One list for resolution; one get at load, one get for the write guard.
    assert_eq!(h.platform.list_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(h.platform.get_calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    assert_eq!(h.platform.update_calls.load(std::sync::atomic::Ordering::SeqCst), 1);

    let stored = h.platform.stored_flow("cf-1").unwrap();
    let flow = FlowGraph::from_value(&stored).unwrap();
    assert_eq!(flow.nodes.len(), 3);
    assert_eq!(flow.edges.len(), 2);

    let tool = flow.node("customTool_0").unwrap();
    let code = tool.data.inputs["code"].as_str().unwrap();
    assert!(!code.is_empty());
    assert!(tool.data.inputs.get("schema").is_some());

    let new_edge = flow
        .edges
        .iter()
        .find(|e| e.source == "customTool_0")
        .unwrap();
    let target = Handle::parse(&new_edge.target_handle).unwrap();
    assert_eq!(target.node_id, "toolAgent_0");
    assert_eq!(target.name, "tools");

    // The recorded diff matches the single-node, single-edge delta.
    let checkpoint = h
        .saver
        .get_latest(&outcome.session_id)
        .await
        .unwrap()
        .unwrap();
    // The tools anchor wiring also lands in toolAgent_0's inputs.
    assert_eq!(
        checkpoint.state.fact_str("chatflow", "diff"),
        Some("nodes +1/-0, edges +1/-0, params changed 1")
    );
    assert!(
        checkpoint
            .state
            .fact_u64("chatflow", "candidate_count")
            .unwrap()
            >= 1
    );
}
