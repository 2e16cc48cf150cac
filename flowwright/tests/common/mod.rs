//! Shared harness for session integration tests: scripted engine, seeded
//! mock platform, and a runner over an in-memory checkpointer.
#![allow(dead_code)]

use std::sync::Arc;

use serde_json::json;

use flowwright::config::Config;
use flowwright::events::{MemoryEventLog, SessionEventEmitter};
use flowwright::knowledge::{normalize_schema, CredentialStore, NodeSchemaStore, TemplateStore};
use flowwright::llm::MockEngine;
use flowwright::memory::MemorySaver;
use flowwright::platform::MockPlatform;
use flowwright::session::{SessionContext, SessionRunner};
use flowwright::state::SessionState;
use flowwright::tools::{knowledge_toolset, platform_toolset, ToolRegistry};

pub struct Harness {
    pub runner: SessionRunner,
    pub platform: Arc<MockPlatform>,
    pub saver: Arc<MemorySaver<SessionState>>,
    pub schemas: Arc<NodeSchemaStore>,
    pub log: Arc<MemoryEventLog>,
}

/// Platform-shaped schema payloads for the scenarios.
pub fn raw_schema(name: &str) -> serde_json::Value {
    match name {
        "chatOpenAI" => json!({
            "name": "chatOpenAI",
            "label": "ChatOpenAI",
            "version": 2,
            "category": "Chat Models",
            "baseClasses": ["ChatOpenAI", "BaseChatModel"],
            "inputAnchors": [],
            "inputParams": [
                {"name": "modelName", "type": "string", "default": "gpt-4o"},
                {"name": "temperature", "type": "number", "optional": true}
            ],
            "outputAnchors": [
                {"name": "chatOpenAI", "types": ["ChatOpenAI", "BaseChatModel"]}
            ],
            "credential": {"name": "credential", "acceptedTypes": ["openAIApi"]}
        }),
        "bufferMemory" => json!({
            "name": "bufferMemory",
            "label": "Buffer Memory",
            "version": 1,
            "category": "Memory",
            "baseClasses": ["BufferMemory", "BaseMemory"],
            "inputAnchors": [],
            "inputParams": [],
            "outputAnchors": [
                {"name": "bufferMemory", "types": ["BufferMemory", "BaseMemory"]}
            ]
        }),
        "conversationChain" => json!({
            "name": "conversationChain",
            "label": "Conversation Chain",
            "version": 1,
            "category": "Chains",
            "baseClasses": ["ConversationChain", "BaseChain"],
            "inputAnchors": [
                {"name": "model", "acceptedTypes": ["BaseChatModel"]},
                {"name": "memory", "acceptedTypes": ["BaseMemory"]}
            ],
            "inputParams": [],
            "outputAnchors": [
                {"name": "conversationChain", "types": ["ConversationChain", "BaseChain"]}
            ]
        }),
        "toolAgent" => json!({
            "name": "toolAgent",
            "label": "Tool Agent",
            "version": 1,
            "category": "Agents",
            "baseClasses": ["AgentExecutor"],
            "inputAnchors": [
                {"name": "model", "acceptedTypes": ["BaseChatModel"]},
                {"name": "tools", "acceptedTypes": ["Tool"], "optional": true}
            ],
            "inputParams": [],
            "outputAnchors": [
                {"name": "toolAgent", "types": ["AgentExecutor"]}
            ]
        }),
        "customTool" => json!({
            "name": "customTool",
            "label": "Custom Tool",
            "version": 1,
            "category": "Tools",
            "baseClasses": ["Tool"],
            "inputAnchors": [],
            "inputParams": [
                {"name": "name", "type": "string"},
                {"name": "description", "type": "string", "optional": true},
                {"name": "code", "type": "code"},
                {"name": "schema", "type": "json", "optional": true}
            ],
            "outputAnchors": [{"name": "customTool", "types": ["Tool"]}]
        }),
        "pdfLoader" => json!({
            "name": "pdfLoader",
            "label": "PDF Loader",
            "version": 1,
            "category": "Document Loaders",
            "baseClasses": ["Document"],
            "inputAnchors": [],
            "inputParams": [],
            "outputAnchors": [{"name": "pdfLoader", "types": ["Document"]}]
        }),
        "vectorStore" => json!({
            "name": "vectorStore",
            "label": "In-Memory Vector Store",
            "version": 1,
            "category": "Vector Stores",
            "baseClasses": ["VectorStoreRetriever"],
            "inputAnchors": [
                {"name": "document", "acceptedTypes": ["Document"]},
                {"name": "embeddings", "acceptedTypes": ["Embeddings"], "optional": true}
            ],
            "inputParams": [],
            "outputAnchors": [
                {"name": "vectorStore", "types": ["VectorStoreRetriever"]}
            ]
        }),
        other => panic!("no raw schema for {}", other),
    }
}

/// Builds a harness: the given node types in the LOCAL store, everything
/// seeded on the platform side too (so repairs can succeed).
pub fn harness(replies: Vec<&str>, local_types: &[&str], platform_types: &[&str]) -> Harness {
    let platform = Arc::new(MockPlatform::new());
    platform.seed_credential("cred-1", "OpenAI Key", "openAIApi");
    for name in platform_types {
        platform.seed_node_schema(name, raw_schema(name));
    }

    let schemas = Arc::new(NodeSchemaStore::new(platform.clone()));
    for name in local_types {
        schemas.insert(normalize_schema(&raw_schema(name)).expect("seed schema"));
    }
    let credentials = Arc::new(CredentialStore::new(platform.clone()));
    credentials.insert(flowwright::flow::Credential {
        id: "cred-1".into(),
        name: "OpenAI Key".into(),
        kind: "openAIApi".into(),
    });

    let templates = Arc::new(TemplateStore::new());
    let mut registry = ToolRegistry::new();
    registry
        .register_domain(platform_toolset(platform.clone()))
        .expect("register platform tools");
    registry
        .register_domain(knowledge_toolset(templates.clone()))
        .expect("register knowledge tools");

    let log = Arc::new(MemoryEventLog::new());
    let emitter = Arc::new(SessionEventEmitter::new(log.clone(), 0));
    let ctx = SessionContext::new(
        Arc::new(MockEngine::from_texts(replies)),
        platform.clone(),
        schemas.clone(),
        credentials,
        templates,
        None,
        Arc::new(registry),
        emitter,
        Arc::new(Config::default()),
    );

    let saver = Arc::new(MemorySaver::new());
    let runner = SessionRunner::new(ctx, saver.clone()).expect("session graph compiles");
    Harness {
        runner,
        platform,
        saver,
        schemas,
        log,
    }
}

/// Baseline "Trip Planner" flow: a chat model wired into a tool agent.
pub fn trip_planner_baseline() -> flowwright::flow::FlowGraph {
    use flowwright::flow::{FlowEdge, FlowGraph, FlowNode, Handle, Position};

    let chat_schema = normalize_schema(&raw_schema("chatOpenAI")).expect("chatOpenAI schema");
    let agent_schema = normalize_schema(&raw_schema("toolAgent")).expect("toolAgent schema");

    let mut flow = FlowGraph::default();
    flow.nodes.push(FlowNode::from_schema(
        "chatOpenAI_0",
        &chat_schema,
        Position::default(),
    ));
    flow.nodes.push(FlowNode::from_schema(
        "toolAgent_0",
        &agent_schema,
        Position { x: 440.0, y: 140.0 },
    ));
    flow.node_mut("chatOpenAI_0")
        .expect("chat node")
        .bind_credential("cred-1");

    let source = Handle::output(
        "chatOpenAI_0",
        "chatOpenAI",
        vec!["ChatOpenAI".into(), "BaseChatModel".into()],
    );
    let target = Handle::input("toolAgent_0", "model", vec!["BaseChatModel".into()]);
    flow.edges.push(FlowEdge {
        source: "chatOpenAI_0".into(),
        source_handle: source.encode(),
        target: "toolAgent_0".into(),
        target_handle: target.encode(),
    });
    flow.node_mut("toolAgent_0").expect("agent node").data.inputs.insert(
        "model".into(),
        serde_json::Value::String("{{chatOpenAI_0.data.instance}}".into()),
    );
    flow
}
