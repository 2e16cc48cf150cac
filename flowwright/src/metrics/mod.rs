//! Per-node metrics capture and per-phase token budgets.
//!
//! Every node records a `NodeMetrics` into the `debug` bucket; phase budgets
//! are evaluated at phase end — violations are counted, never aborting. The
//! hard gates (retries, repairs, op counts) live in the preflight node.

use serde::{Deserialize, Serialize};

use crate::state::SessionState;
use crate::tools::Phase;

/// Metrics captured for one node execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeMetrics {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub duration_ms: u64,
    pub tool_call_count: u32,
    pub cache_hits: u32,
    pub repair_events: u32,
}

impl NodeMetrics {
    pub fn tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Records a node's metrics into `debug.metrics.<node>` and accumulates the
/// phase token totals under `debug.metrics.phase_tokens:<phase>`.
pub fn record_node_metrics(
    state: &mut SessionState,
    node: &str,
    phase: Phase,
    metrics: &NodeMetrics,
) {
    let value = serde_json::to_value(metrics).unwrap_or_default();
    state.record_debug("metrics", node, value);

    let key = format!("phase_tokens:{}", phase.as_str());
    let prior = state
        .debug
        .get("metrics", &key)
        .and_then(|v| v.as_u64())
        .unwrap_or(0);
    state.record_debug(
        "metrics",
        key,
        serde_json::json!(prior + metrics.tokens() as u64),
    );
}

/// Tokens spent in a phase so far this session.
pub fn phase_tokens(state: &SessionState, phase: Phase) -> u64 {
    state
        .debug
        .get("metrics", &format!("phase_tokens:{}", phase.as_str()))
        .and_then(|v| v.as_u64())
        .unwrap_or(0)
}

/// Per-phase token budgets; evaluated at phase end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseBudgets {
    pub discover: u64,
    pub plan: u64,
    pub patch: u64,
    pub test: u64,
    pub evaluate: u64,
    /// Applied to phases without an explicit budget.
    pub default: u64,
}

impl Default for PhaseBudgets {
    fn default() -> Self {
        Self {
            discover: 15_000,
            plan: 8_000,
            patch: 20_000,
            test: 10_000,
            evaluate: 5_000,
            default: 25_000,
        }
    }
}

impl PhaseBudgets {
    pub fn budget_for(&self, phase: Phase) -> u64 {
        match phase {
            Phase::Discover => self.discover,
            Phase::Plan => self.plan,
            Phase::Patch => self.patch,
            Phase::Test => self.test,
            Phase::Evaluate => self.evaluate,
            Phase::Converge => self.default,
        }
    }

    /// Checks the phase's spend; on violation, bumps
    /// `facts.metrics.budget_violations` and logs. Never aborts.
    pub fn check_phase(&self, state: &mut SessionState, phase: Phase) {
        let spent = phase_tokens(state, phase);
        let budget = self.budget_for(phase);
        if spent > budget {
            let count = state
                .fact_u64("metrics", "budget_violations")
                .unwrap_or(0);
            state.set_fact(
                "metrics",
                "budget_violations",
                serde_json::json!(count + 1),
            );
            tracing::warn!(
                phase = phase.as_str(),
                spent = spent,
                budget = budget,
                "phase token budget exceeded"
            );
        }
    }
}
