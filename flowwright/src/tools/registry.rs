//! Namespaced tool catalogue with per-phase visibility.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::envelope::{wrap, ToolError, ToolResult};

use super::{DomainToolset, Phase, ToolDef};

/// Future returned by a tool function.
pub type ToolFuture = Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send>>;

/// A tool implementation: JSON args in, raw JSON (or error) out. The raw
/// value is wrapped through the envelope by the registry, never returned as-is.
pub type ToolFn = Arc<dyn Fn(Value) -> ToolFuture + Send + Sync>;

/// Registration error.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("tool already registered: {0}")]
    Collision(String),
}

struct ToolEntry {
    namespace: String,
    name: String,
    def: ToolDef,
    phases: HashSet<Phase>,
    func: ToolFn,
}

impl ToolEntry {
    fn qualified(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }
}

/// Tool catalogue: registration, phase-filtered defs, dual-key execution.
#[derive(Default)]
pub struct ToolRegistry {
    entries: Vec<ToolEntry>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one tool under `namespace`. The LLM-visible name is
    /// `namespace.name`; collisions are rejected.
    pub fn register(
        &mut self,
        namespace: &str,
        def: ToolDef,
        phases: &[Phase],
        func: ToolFn,
    ) -> Result<(), RegistryError> {
        let qualified = format!("{}.{}", namespace, def.name);
        if self.entries.iter().any(|e| e.qualified() == qualified) {
            return Err(RegistryError::Collision(qualified));
        }
        self.entries.push(ToolEntry {
            namespace: namespace.to_string(),
            name: def.name.clone(),
            def,
            phases: phases.iter().copied().collect(),
            func,
        });
        Ok(())
    }

    /// Registers a domain's whole toolset.
    pub fn register_domain(&mut self, toolset: DomainToolset) -> Result<(), RegistryError> {
        let namespace = toolset.namespace;
        for (def, phases, func) in toolset.tools {
            self.register(&namespace, def, &phases, func)?;
        }
        Ok(())
    }

    /// Tool definitions visible in `phase`, with namespaced names. Strict:
    /// a tool registered only for `patch` is never offered to `discover`.
    pub fn tool_defs(&self, phase: Phase) -> Vec<ToolDef> {
        self.entries
            .iter()
            .filter(|e| e.phases.contains(&phase))
            .map(|e| ToolDef {
                name: e.qualified(),
                description: e.def.description.clone(),
                parameters: e.def.parameters.clone(),
            })
            .collect()
    }

    /// Executor map for `phase`, dual-keyed: both `"domain.name"` and bare
    /// `"name"` resolve. Ambiguous bare names collapse to the
    /// first-registered tool.
    pub fn executor(&self, phase: Phase) -> HashMap<String, ToolFn> {
        let mut map: HashMap<String, ToolFn> = HashMap::new();
        for entry in self.entries.iter().filter(|e| e.phases.contains(&phase)) {
            map.insert(entry.qualified(), entry.func.clone());
            map.entry(entry.name.clone())
                .or_insert_with(|| entry.func.clone());
        }
        map
    }

    /// One-line-per-tool context string for prompts.
    pub fn context(&self, phase: Phase) -> String {
        self.entries
            .iter()
            .filter(|e| e.phases.contains(&phase))
            .map(|e| format!("- {}: {}", e.qualified(), e.def.description))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Invokes a tool by qualified or bare name (any phase) and wraps the
    /// result through the envelope.
    pub async fn call(&self, tool_name: &str, args: Value) -> ToolResult {
        let entry = self
            .entries
            .iter()
            .find(|e| e.qualified() == tool_name)
            .or_else(|| self.entries.iter().find(|e| e.name == tool_name));
        let Some(entry) = entry else {
            return wrap(
                tool_name,
                Err(ToolError::new("not_found", format!("unknown tool: {}", tool_name))),
            );
        };
        let raw = (entry.func)(args).await;
        wrap(&entry.qualified(), raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_tool(tag: &'static str) -> ToolFn {
        Arc::new(move |args: Value| {
            Box::pin(async move { Ok(serde_json::json!({"tag": tag, "args": args})) })
                as ToolFuture
        })
    }

    fn def(name: &str) -> ToolDef {
        ToolDef::new(name, format!("{} tool", name), serde_json::json!({"type": "object"}))
    }

    /// **Scenario**: Names exposed to the LLM are namespaced; collisions rejected.
    #[test]
    fn namespacing_and_collision() {
        let mut registry = ToolRegistry::new();
        registry
            .register("platform", def("list_chatflows"), &[Phase::Discover], echo_tool("a"))
            .unwrap();
        let err = registry
            .register("platform", def("list_chatflows"), &[Phase::Plan], echo_tool("b"))
            .unwrap_err();
        assert!(matches!(err, RegistryError::Collision(_)));

        let defs = registry.tool_defs(Phase::Discover);
        assert_eq!(defs[0].name, "platform.list_chatflows");
    }

    /// **Scenario**: Phase filtering is strict — a patch-only tool never shows in discover.
    #[test]
    fn phase_filtering_is_strict() {
        let mut registry = ToolRegistry::new();
        registry
            .register("patching", def("compile"), &[Phase::Patch], echo_tool("c"))
            .unwrap();
        assert!(registry.tool_defs(Phase::Discover).is_empty());
        assert_eq!(registry.tool_defs(Phase::Patch).len(), 1);
        assert!(!registry.executor(Phase::Discover).contains_key("compile"));
    }

    /// **Scenario**: The executor is dual-keyed, and ambiguous bare names collapse
    /// to the first-registered tool.
    #[tokio::test]
    async fn dual_key_executor_first_registered_wins() {
        let mut registry = ToolRegistry::new();
        registry
            .register("alpha", def("search"), &[Phase::Discover], echo_tool("alpha"))
            .unwrap();
        registry
            .register("beta", def("search"), &[Phase::Discover], echo_tool("beta"))
            .unwrap();

        let exec = registry.executor(Phase::Discover);
        assert!(exec.contains_key("alpha.search"));
        assert!(exec.contains_key("beta.search"));
        let bare = exec.get("search").unwrap();
        let raw = bare(serde_json::json!({})).await.unwrap();
        assert_eq!(raw["tag"], "alpha");
    }

    /// **Scenario**: call() wraps results through the envelope; unknown tools fail cleanly.
    #[tokio::test]
    async fn call_wraps_through_envelope() {
        let mut registry = ToolRegistry::new();
        registry
            .register("platform", def("get_chatflow"), &[Phase::Discover], {
                Arc::new(|_args: Value| {
                    Box::pin(async {
                        Ok(serde_json::json!({"id": "cf-1", "name": "Bot", "kind": "Chatflow"}))
                    }) as ToolFuture
                })
            })
            .unwrap();

        let result = registry
            .call("platform.get_chatflow", serde_json::json!({"id": "cf-1"}))
            .await;
        assert!(result.ok);
        assert_eq!(result.summary, "Chatflow 'Bot' (id=cf-1).");

        let missing = registry.call("nope.missing", serde_json::json!({})).await;
        assert!(!missing.ok);
        assert!(missing.summary.contains("failed"));
    }

    /// **Scenario**: context() renders one line per visible tool.
    #[test]
    fn context_lists_tools() {
        let mut registry = ToolRegistry::new();
        registry
            .register("platform", def("predict"), &[Phase::Test], echo_tool("p"))
            .unwrap();
        let ctx = registry.context(Phase::Test);
        assert!(ctx.contains("platform.predict"));
        assert!(registry.context(Phase::Plan).is_empty());
    }
}
