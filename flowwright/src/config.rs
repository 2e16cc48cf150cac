//! Environment-driven configuration.
//!
//! `Config::from_env()` loads `.env` (existing environment wins) and parses
//! every knob the runtime exposes: persistence DSNs, drift policy, runtime
//! mode, per-phase token budgets, and the per-iteration hard budgets.

use std::path::PathBuf;

use crate::knowledge::DriftPolicy;
use crate::metrics::PhaseBudgets;
use crate::state::RuntimeMode;

/// Hard per-iteration budgets enforced by the preflight gate.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationBudgets {
    pub max_total_retries_per_iter: u32,
    pub max_schema_repairs_per_iter: u32,
    pub max_patch_ops_create: u32,
    pub max_patch_ops_update: u32,
    /// Schema-store fetch budget per patch iteration.
    pub schema_fetch_budget: u32,
}

impl Default for IterationBudgets {
    fn default() -> Self {
        Self {
            max_total_retries_per_iter: 2,
            max_schema_repairs_per_iter: 2,
            max_patch_ops_create: 20,
            max_patch_ops_update: 12,
            schema_fetch_budget: 10,
        }
    }
}

impl IterationBudgets {
    /// Op ceiling for the given intent.
    pub fn max_ops_for(&self, is_update: bool) -> u32 {
        if is_update {
            self.max_patch_ops_update
        } else {
            self.max_patch_ops_create
        }
    }
}

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub platform_base_url: String,
    pub platform_api_key: Option<String>,
    /// SQLite path for checkpoints; None keeps them in memory.
    pub checkpoint_db: Option<PathBuf>,
    /// SQLite path for the session event log; None keeps it in memory.
    pub events_db: Option<PathBuf>,
    /// SQLite path for the pattern store; None disables patterns.
    pub pattern_db: Option<PathBuf>,
    /// Directory holding the knowledge snapshots.
    pub snapshot_dir: Option<PathBuf>,
    pub drift_policy: DriftPolicy,
    pub runtime_mode: RuntimeMode,
    /// Save successful CREATE flows back as patterns.
    pub pattern_auto_save: bool,
    pub iteration_ceiling: u32,
    pub hitl_long_poll_secs: u64,
    pub budgets: IterationBudgets,
    pub phase_budgets: PhaseBudgets,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            platform_base_url: "http://localhost:3000".into(),
            platform_api_key: None,
            checkpoint_db: None,
            events_db: None,
            pattern_db: None,
            snapshot_dir: None,
            drift_policy: DriftPolicy::default(),
            runtime_mode: RuntimeMode::default(),
            pattern_auto_save: true,
            iteration_ceiling: 4,
            hitl_long_poll_secs: 300,
            budgets: IterationBudgets::default(),
            phase_budgets: PhaseBudgets::default(),
        }
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_var(key).and_then(|v| v.parse().ok())
}

impl Config {
    /// Loads `.env` (existing environment wins) and reads `FLOWWRIGHT_*` vars
    /// over the defaults.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let defaults = Config::default();

        let mut budgets = IterationBudgets::default();
        if let Some(v) = env_parse("FLOWWRIGHT_MAX_TOTAL_RETRIES_PER_ITER") {
            budgets.max_total_retries_per_iter = v;
        }
        if let Some(v) = env_parse("FLOWWRIGHT_MAX_SCHEMA_REPAIRS_PER_ITER") {
            budgets.max_schema_repairs_per_iter = v;
        }
        if let Some(v) = env_parse("FLOWWRIGHT_MAX_PATCH_OPS_CREATE") {
            budgets.max_patch_ops_create = v;
        }
        if let Some(v) = env_parse("FLOWWRIGHT_MAX_PATCH_OPS_UPDATE") {
            budgets.max_patch_ops_update = v;
        }
        if let Some(v) = env_parse("FLOWWRIGHT_SCHEMA_FETCH_BUDGET") {
            budgets.schema_fetch_budget = v;
        }

        let mut phase_budgets = PhaseBudgets::default();
        if let Some(v) = env_parse("FLOWWRIGHT_PHASE_BUDGET_DISCOVER") {
            phase_budgets.discover = v;
        }
        if let Some(v) = env_parse("FLOWWRIGHT_PHASE_BUDGET_PLAN") {
            phase_budgets.plan = v;
        }
        if let Some(v) = env_parse("FLOWWRIGHT_PHASE_BUDGET_PATCH") {
            phase_budgets.patch = v;
        }
        if let Some(v) = env_parse("FLOWWRIGHT_PHASE_BUDGET_TEST") {
            phase_budgets.test = v;
        }
        if let Some(v) = env_parse("FLOWWRIGHT_PHASE_BUDGET_EVALUATE") {
            phase_budgets.evaluate = v;
        }
        if let Some(v) = env_parse("FLOWWRIGHT_PHASE_BUDGET_DEFAULT") {
            phase_budgets.default = v;
        }

        Self {
            platform_base_url: env_var("FLOWWRIGHT_PLATFORM_URL")
                .unwrap_or(defaults.platform_base_url),
            platform_api_key: env_var("FLOWWRIGHT_PLATFORM_API_KEY"),
            checkpoint_db: env_var("FLOWWRIGHT_CHECKPOINT_DB").map(PathBuf::from),
            events_db: env_var("FLOWWRIGHT_EVENTS_DB").map(PathBuf::from),
            pattern_db: env_var("FLOWWRIGHT_PATTERN_DB").map(PathBuf::from),
            snapshot_dir: env_var("FLOWWRIGHT_SNAPSHOT_DIR").map(PathBuf::from),
            drift_policy: env_parse("FLOWWRIGHT_DRIFT_POLICY").unwrap_or(defaults.drift_policy),
            runtime_mode: match env_var("FLOWWRIGHT_RUNTIME_MODE").as_deref() {
                Some("compat-legacy") => RuntimeMode::CompatLegacy,
                _ => RuntimeMode::CapabilityFirst,
            },
            pattern_auto_save: env_var("FLOWWRIGHT_PATTERN_AUTO_SAVE")
                .map(|v| v != "0" && v.to_lowercase() != "false")
                .unwrap_or(defaults.pattern_auto_save),
            iteration_ceiling: env_parse("FLOWWRIGHT_ITERATION_CEILING")
                .unwrap_or(defaults.iteration_ceiling),
            hitl_long_poll_secs: env_parse("FLOWWRIGHT_HITL_LONG_POLL_SECS")
                .unwrap_or(defaults.hitl_long_poll_secs),
            budgets,
            phase_budgets,
        }
    }
}
