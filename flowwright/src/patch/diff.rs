//! Diff summary: a pure function of baseline and compiled flow.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::flow::FlowGraph;

/// Human-readable delta between two flows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub nodes_added: Vec<String>,
    pub nodes_removed: Vec<String>,
    pub edges_added: usize,
    pub edges_removed: usize,
    /// `node_id.param` entries whose value changed or appeared.
    pub params_changed: Vec<String>,
}

impl DiffSummary {
    pub fn is_empty(&self) -> bool {
        self.nodes_added.is_empty()
            && self.nodes_removed.is_empty()
            && self.edges_added == 0
            && self.edges_removed == 0
            && self.params_changed.is_empty()
    }

    pub fn render(&self) -> String {
        format!(
            "nodes +{}/-{}, edges +{}/-{}, params changed {}",
            self.nodes_added.len(),
            self.nodes_removed.len(),
            self.edges_added,
            self.edges_removed,
            self.params_changed.len()
        )
    }
}

/// Computes the delta from `base` (None = empty flow) to `result`.
pub fn compute_diff(base: Option<&FlowGraph>, result: &FlowGraph) -> DiffSummary {
    let empty = FlowGraph::default();
    let base = base.unwrap_or(&empty);

    let base_nodes: HashSet<&str> = base.nodes.iter().map(|n| n.id.as_str()).collect();
    let result_nodes: HashSet<&str> = result.nodes.iter().map(|n| n.id.as_str()).collect();

    let mut nodes_added: Vec<String> = result_nodes
        .difference(&base_nodes)
        .map(|s| s.to_string())
        .collect();
    nodes_added.sort();
    let mut nodes_removed: Vec<String> = base_nodes
        .difference(&result_nodes)
        .map(|s| s.to_string())
        .collect();
    nodes_removed.sort();

    let edge_key = |e: &crate::flow::FlowEdge| {
        format!("{}→{}", e.source_handle, e.target_handle)
    };
    let base_edges: HashSet<String> = base.edges.iter().map(edge_key).collect();
    let result_edges: HashSet<String> = result.edges.iter().map(edge_key).collect();
    let edges_added = result_edges.difference(&base_edges).count();
    let edges_removed = base_edges.difference(&result_edges).count();

    let base_inputs: HashMap<&str, &serde_json::Map<String, serde_json::Value>> = base
        .nodes
        .iter()
        .map(|n| (n.id.as_str(), &n.data.inputs))
        .collect();
    let mut params_changed = Vec::new();
    for node in &result.nodes {
        let Some(base_node_inputs) = base_inputs.get(node.id.as_str()) else {
            continue; // New node: counted under nodes_added, not param churn.
        };
        for (key, value) in &node.data.inputs {
            if base_node_inputs.get(key) != Some(value) {
                params_changed.push(format!("{}.{}", node.id, key));
            }
        }
    }
    params_changed.sort();

    DiffSummary {
        nodes_added,
        nodes_removed,
        edges_added,
        edges_removed,
        params_changed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{FlowEdge, FlowNode, NodeSchema, Position};

    fn node(id: &str) -> FlowNode {
        let schema = NodeSchema {
            name: "calculator".into(),
            version: Some(1),
            label: "Calculator".into(),
            category: "Tools".into(),
            base_classes: vec!["Tool".into()],
            input_anchors: vec![],
            input_params: vec![],
            output_anchors: vec![],
            credential: None,
            hash: String::new(),
        };
        FlowNode::from_schema(id, &schema, Position::default())
    }

    /// **Scenario**: Diff of a flow against itself is empty; additions are reported.
    #[test]
    fn diff_reports_additions() {
        let mut base = FlowGraph::default();
        base.nodes.push(node("calc_0"));

        assert!(compute_diff(Some(&base), &base).is_empty());

        let mut result = base.clone();
        result.nodes.push(node("calc_1"));
        result.edges.push(FlowEdge {
            source: "calc_0".into(),
            source_handle: "calc_0-output-calculator-Tool".into(),
            target: "calc_1".into(),
            target_handle: "calc_1-input-tool-Tool".into(),
        });
        let diff = compute_diff(Some(&base), &result);
        assert_eq!(diff.nodes_added, vec!["calc_1"]);
        assert_eq!(diff.edges_added, 1);
        assert_eq!(diff.render(), "nodes +1/-0, edges +1/-0, params changed 0");
    }

    /// **Scenario**: Param changes on pre-existing nodes are listed as node.param.
    #[test]
    fn diff_reports_param_changes() {
        let mut base = FlowGraph::default();
        base.nodes.push(node("calc_0"));
        let mut result = base.clone();
        result.nodes[0]
            .data
            .inputs
            .insert("precision".into(), serde_json::json!(4));
        let diff = compute_diff(Some(&base), &result);
        assert_eq!(diff.params_changed, vec!["calc_0.precision"]);
    }

    /// **Scenario**: None base means diff against the empty flow.
    #[test]
    fn none_base_is_empty_flow() {
        let mut result = FlowGraph::default();
        result.nodes.push(node("calc_0"));
        let diff = compute_diff(None, &result);
        assert_eq!(diff.nodes_added, vec!["calc_0"]);
    }
}
