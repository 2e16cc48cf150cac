//! Shared dependencies injected into session nodes.

use std::sync::Arc;

use crate::config::Config;
use crate::events::SessionEventEmitter;
use crate::knowledge::{CredentialStore, NodeSchemaStore, PatternStore, TemplateStore};
use crate::llm::LlmEngine;
use crate::patch::PatchCompiler;
use crate::platform::PlatformClient;
use crate::tools::{ChatflowCapability, DomainCapability, ToolRegistry};

/// Everything a session node may need, behind one Arc.
pub struct SessionContext {
    pub llm: Arc<dyn LlmEngine>,
    pub platform: Arc<dyn PlatformClient>,
    pub schemas: Arc<NodeSchemaStore>,
    pub credentials: Arc<CredentialStore>,
    pub templates: Arc<TemplateStore>,
    pub patterns: Option<Arc<PatternStore>>,
    pub registry: Arc<ToolRegistry>,
    pub capability: Arc<dyn DomainCapability>,
    pub compiler: Arc<PatchCompiler>,
    pub emitter: Arc<SessionEventEmitter>,
    pub config: Arc<Config>,
}

impl SessionContext {
    /// Wires the chatflow domain over the given engine, platform, and stores.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        llm: Arc<dyn LlmEngine>,
        platform: Arc<dyn PlatformClient>,
        schemas: Arc<NodeSchemaStore>,
        credentials: Arc<CredentialStore>,
        templates: Arc<TemplateStore>,
        patterns: Option<Arc<PatternStore>>,
        registry: Arc<ToolRegistry>,
        emitter: Arc<SessionEventEmitter>,
        config: Arc<Config>,
    ) -> Arc<Self> {
        let capability: Arc<dyn DomainCapability> = Arc::new(ChatflowCapability::new(
            schemas.clone(),
            credentials.clone(),
        ));
        let compiler = Arc::new(PatchCompiler::new(schemas.clone(), credentials.clone()));
        Arc::new(Self {
            llm,
            platform,
            schemas,
            credentials,
            templates,
            patterns,
            registry,
            capability,
            compiler,
            emitter,
            config,
        })
    }
}
