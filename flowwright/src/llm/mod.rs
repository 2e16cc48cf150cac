//! LLM engine abstraction for the session graph's LLM nodes.
//!
//! Nodes depend on a callable that returns assistant text, optional tool
//! calls, and token usage; this module defines the trait, a scripted mock,
//! and an OpenAI-compatible engine. Token streaming to callers is out of
//! scope — `complete` is a single-call API.

mod json;
mod mock;
mod openai;

pub use json::extract_json;
pub use mock::MockEngine;
pub use openai::OpenAiEngine;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::SessionError;
use crate::message::Message;
use crate::tools::ToolDef;

/// Error from an LLM completion.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("engine returned no choices")]
    NoChoices,
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl From<LlmError> for SessionError {
    fn from(e: LlmError) -> Self {
        SessionError::External {
            status: 0,
            excerpt: e.to_string(),
        }
    }
}

/// One tool invocation requested by the model.
///
/// `name` matches a namespaced registry entry; `arguments` is the raw JSON
/// argument string as returned by the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub name: String,
    pub arguments: String,
    pub id: Option<String>,
}

/// Completion result: assistant text, tool calls, and token counts.
///
/// **Interaction**: Returned by `LlmEngine::complete`; the metrics scope
/// records the token counts per node and phase.
#[derive(Debug, Clone, Default)]
pub struct LlmReply {
    pub text: String,
    pub tool_calls: Vec<ToolCallRequest>,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// LLM engine: given messages and optional tool definitions, returns a reply.
///
/// Tool-call names in the reply match the namespaced tool registry.
#[async_trait]
pub trait LlmEngine: Send + Sync {
    async fn complete(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDef]>,
    ) -> Result<LlmReply, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: LlmError converts into SessionError::External with the message preserved.
    #[test]
    fn llm_error_converts_to_external() {
        let err: SessionError = LlmError::RequestFailed("boom".into()).into();
        match err {
            SessionError::External { excerpt, .. } => assert!(excerpt.contains("boom")),
            other => panic!("expected External, got {:?}", other),
        }
    }

    /// **Scenario**: ToolCallRequest round-trips through serde.
    #[test]
    fn tool_call_request_serde_roundtrip() {
        let call = ToolCallRequest {
            name: "platform.list_chatflows".into(),
            arguments: "{}".into(),
            id: Some("call-1".into()),
        };
        let json = serde_json::to_string(&call).unwrap();
        let back: ToolCallRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, call.name);
        assert_eq!(back.id, call.id);
    }
}
