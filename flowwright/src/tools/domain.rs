//! Domain capability: the pluggable shape the graph consumes.
//!
//! No graph node knows a specific domain; it goes through this trait and the
//! registry. The chatflow domain is the first implementation; an HR-system
//! domain would implement the same shape and register its own toolset.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::envelope::ToolError;
use crate::error::SessionError;
use crate::flow::FlowGraph;
use crate::knowledge::{CredentialStore, NodeSchemaStore};
use crate::patch::{validate_flow_data, PatchOp};
use crate::platform::PlatformClient;
use crate::state::Bucket;

use super::{Phase, ToolDef, ToolFn, ToolFuture};

/// A domain's tool contributions: `(def, phases, implementation)` triples
/// registered under one namespace.
pub struct DomainToolset {
    pub namespace: String,
    pub tools: Vec<(ToolDef, Vec<Phase>, ToolFn)>,
}

/// Capability shape every domain implements. Each method returns tagged
/// result records (plain JSON) the graph stores and summarizes.
#[async_trait]
pub trait DomainCapability: Send + Sync {
    fn domain(&self) -> &str;

    /// Local context for the discover phase (counts, fingerprints). No network.
    async fn discover(&self) -> Result<Value, SessionError>;

    /// Lowers the model's structured plan output into IR ops.
    fn compile_ops(&self, plan_output: &Value) -> Result<Vec<PatchOp>, SessionError>;

    /// Validates the proposed artifact; returns a `{valid, errors}` report.
    fn validate(&self, artifacts: &Bucket) -> Result<Value, SessionError>;

    /// Bounded test inputs for the proposed artifact: one happy path, one edge case.
    fn generate_tests(&self, plan_text: &str) -> Vec<String>;

    /// Derives a verdict record from test results.
    fn evaluate(&self, test_results: &Value) -> Value;
}

/// The chatflow domain.
pub struct ChatflowCapability {
    schemas: Arc<NodeSchemaStore>,
    credentials: Arc<CredentialStore>,
}

impl ChatflowCapability {
    pub fn new(schemas: Arc<NodeSchemaStore>, credentials: Arc<CredentialStore>) -> Self {
        Self {
            schemas,
            credentials,
        }
    }
}

#[async_trait]
impl DomainCapability for ChatflowCapability {
    fn domain(&self) -> &str {
        "chatflow"
    }

    async fn discover(&self) -> Result<Value, SessionError> {
        Ok(serde_json::json!({
            "domain": "chatflow",
            "node_type_count": self.schemas.len(),
            "schema_fingerprint": self.schemas.fingerprint(),
            "credential_count": self.credentials.len(),
        }))
    }

    fn compile_ops(&self, plan_output: &Value) -> Result<Vec<PatchOp>, SessionError> {
        PatchOp::parse_list(plan_output)
            .map_err(|e| SessionError::Validation(format!("unparsable IR op list: {}", e)))
    }

    fn validate(&self, artifacts: &Bucket) -> Result<Value, SessionError> {
        let proposed = artifacts
            .get("chatflow", "proposed_flow_data")
            .ok_or_else(|| SessionError::Validation("no proposed flow to validate".into()))?;
        let flow = FlowGraph::from_value(proposed)
            .map_err(|e| SessionError::Validation(format!("proposed flow unparsable: {}", e)))?;
        let errors = validate_flow_data(&flow, &self.credentials);
        Ok(crate::patch::validation_report(&errors))
    }

    fn generate_tests(&self, plan_text: &str) -> Vec<String> {
        let goal = plan_text.lines().next().unwrap_or("the requirement").trim();
        vec![
            format!("Happy path: ask the flow to perform its goal: {}", goal),
            "Edge case: send an empty message and expect a graceful reply.".to_string(),
        ]
    }

    fn evaluate(&self, test_results: &Value) -> Value {
        let statuses: Vec<u64> = test_results
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|r| r.get("status").and_then(|s| s.as_u64()))
                    .collect()
            })
            .unwrap_or_default();
        let all_ok = !statuses.is_empty() && statuses.iter().all(|s| (200..300).contains(s));
        serde_json::json!({
            "domain": "chatflow",
            "verdict": if all_ok { "done" } else { "iterate" },
            "test_statuses": statuses,
        })
    }
}

/// Local knowledge lookups exposed as LLM-callable tools, namespaced
/// `knowledge.*`. Templates are consulted only through this explicit search,
/// never implicitly.
pub fn knowledge_toolset(templates: Arc<crate::knowledge::TemplateStore>) -> DomainToolset {
    let search_templates: ToolFn = Arc::new(move |args: Value| {
        let templates = templates.clone();
        Box::pin(async move {
            let query = args
                .get("query")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ToolError::new("invalid_args", "query is required"))?;
            let hits: Vec<Value> = templates
                .search(query)
                .into_iter()
                .take(5)
                .map(|t| {
                    serde_json::json!({
                        "id": t.id,
                        "name": t.name,
                        "description": t.description,
                    })
                })
                .collect();
            Ok(Value::Array(hits))
        }) as ToolFuture
    });

    DomainToolset {
        namespace: "knowledge".into(),
        tools: vec![(
            ToolDef::new(
                "search_templates",
                "Search the local template catalogue by keywords",
                serde_json::json!({
                    "type": "object",
                    "properties": {"query": {"type": "string"}},
                    "required": ["query"],
                }),
            ),
            vec![Phase::Discover, Phase::Plan],
            search_templates,
        )],
    }
}

/// Platform REST endpoints exposed as LLM-callable tools, namespaced
/// `platform.*`. The guarded write (`apply_patch`) is deliberately absent:
/// writes go through the WriteGuard node, never through a model tool call.
pub fn platform_toolset(client: Arc<dyn PlatformClient>) -> DomainToolset {
    let object_schema = serde_json::json!({"type": "object", "properties": {}});
    let id_schema = serde_json::json!({
        "type": "object",
        "properties": {"id": {"type": "string"}},
        "required": ["id"],
    });

    let list_client = client.clone();
    let list_chatflows: ToolFn = Arc::new(move |_args: Value| {
        let client = list_client.clone();
        Box::pin(async move {
            let flows = client
                .list_chatflows()
                .await
                .map_err(|e| ToolError::new("platform", e.to_string()))?;
            serde_json::to_value(flows).map_err(|e| ToolError::new("encode", e.to_string()))
        }) as ToolFuture
    });

    let get_client = client.clone();
    let get_chatflow: ToolFn = Arc::new(move |args: Value| {
        let client = get_client.clone();
        Box::pin(async move {
            let id = args
                .get("id")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ToolError::new("invalid_args", "id is required"))?
                .to_string();
            let flow = client
                .get_chatflow(&id)
                .await
                .map_err(|e| ToolError::new("platform", e.to_string()))?;
            Ok(serde_json::json!({
                "id": flow.id,
                "name": flow.name,
                "kind": "Chatflow",
                "flowData": flow.flow_data,
            }))
        }) as ToolFuture
    });

    let creds_client = client.clone();
    let list_credentials: ToolFn = Arc::new(move |_args: Value| {
        let client = creds_client.clone();
        Box::pin(async move {
            let creds = client
                .list_credentials()
                .await
                .map_err(|e| ToolError::new("platform", e.to_string()))?;
            serde_json::to_value(creds).map_err(|e| ToolError::new("encode", e.to_string()))
        }) as ToolFuture
    });

    let predict_client = client.clone();
    let predict: ToolFn = Arc::new(move |args: Value| {
        let client = predict_client.clone();
        Box::pin(async move {
            let id = args
                .get("id")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ToolError::new("invalid_args", "id is required"))?
                .to_string();
            let question = args
                .get("question")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            let outcome = client
                .predict(&id, &question)
                .await
                .map_err(|e| ToolError::new("platform", e.to_string()))?;
            serde_json::to_value(outcome).map_err(|e| ToolError::new("encode", e.to_string()))
        }) as ToolFuture
    });

    DomainToolset {
        namespace: "platform".into(),
        tools: vec![
            (
                ToolDef::new(
                    "list_chatflows",
                    "List chatflows on the platform",
                    object_schema.clone(),
                ),
                vec![Phase::Discover],
                list_chatflows,
            ),
            (
                ToolDef::new("get_chatflow", "Fetch one chatflow by id", id_schema.clone()),
                vec![Phase::Discover, Phase::Plan],
                get_chatflow,
            ),
            (
                ToolDef::new(
                    "list_credentials",
                    "List credentials available on the platform",
                    object_schema,
                ),
                vec![Phase::Discover, Phase::Plan],
                list_credentials,
            ),
            (
                ToolDef::new(
                    "predict",
                    "Send a test question to a chatflow",
                    serde_json::json!({
                        "type": "object",
                        "properties": {
                            "id": {"type": "string"},
                            "question": {"type": "string"}
                        },
                        "required": ["id", "question"],
                    }),
                ),
                vec![Phase::Test],
                predict,
            ),
        ],
    }
}
