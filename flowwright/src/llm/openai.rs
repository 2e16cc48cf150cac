//! OpenAI-compatible engine implementing [`LlmEngine`].
//!
//! Non-streaming Chat Completions: one request, one reply with text, tool
//! calls, and usage. Requires `OPENAI_API_KEY` (or explicit config with a
//! custom base URL for compatible providers).

use async_trait::async_trait;
use tracing::debug;

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionMessageToolCalls, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage, ChatCompletionTool,
        ChatCompletionToolChoiceOption, ChatCompletionTools, CreateChatCompletionRequestArgs,
        FunctionObject, ToolChoiceOptions,
    },
    Client,
};

use crate::message::Message;
use crate::tools::ToolDef;

use super::{LlmEngine, LlmError, LlmReply, ToolCallRequest};

/// OpenAI Chat Completions engine.
pub struct OpenAiEngine {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: Option<f32>,
}

impl OpenAiEngine {
    /// Builds the engine with default config (API key from `OPENAI_API_KEY`).
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            model: model.into(),
            temperature: None,
        }
    }

    /// Builds the engine with custom config (API key, base URL).
    pub fn with_config(config: OpenAIConfig, model: impl Into<String>) -> Self {
        Self {
            client: Client::with_config(config),
            model: model.into(),
            temperature: None,
        }
    }

    /// Sets temperature (0–2). Lower is more deterministic.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Maps the transcript to request messages. Tool summaries travel as user
    /// messages so compatible providers need no tool_call_id bookkeeping.
    fn messages_to_request(messages: &[Message]) -> Vec<ChatCompletionRequestMessage> {
        messages
            .iter()
            .map(|m| match m {
                Message::System(s) => ChatCompletionRequestMessage::System(
                    ChatCompletionRequestSystemMessage::from(s.as_str()),
                ),
                Message::User(s) => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessage::from(s.as_str()),
                ),
                Message::Assistant(s) => {
                    ChatCompletionRequestMessage::Assistant((s.as_str()).into())
                }
                Message::Tool { name, summary } => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessage::from(
                        format!("[tool {}] {}", name, summary).as_str(),
                    ),
                ),
            })
            .collect()
    }
}

#[async_trait]
impl LlmEngine for OpenAiEngine {
    async fn complete(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDef]>,
    ) -> Result<LlmReply, LlmError> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(self.model.clone());
        args.messages(Self::messages_to_request(messages));

        if let Some(tools) = tools {
            let chat_tools: Vec<ChatCompletionTools> = tools
                .iter()
                .map(|t| {
                    ChatCompletionTools::Function(ChatCompletionTool {
                        function: FunctionObject {
                            name: t.name.clone(),
                            description: Some(t.description.clone()),
                            parameters: Some(t.parameters.clone()),
                            ..Default::default()
                        },
                    })
                })
                .collect();
            args.tools(chat_tools);
            args.tool_choice(ChatCompletionToolChoiceOption::Mode(ToolChoiceOptions::Auto));
        }
        if let Some(t) = self.temperature {
            args.temperature(t);
        }

        let request = args
            .build()
            .map_err(|e| LlmError::RequestFailed(format!("request build failed: {}", e)))?;

        debug!(
            model = %self.model,
            message_count = messages.len(),
            tools_count = tools.map(|t| t.len()).unwrap_or(0),
            "chat completion"
        );

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let usage = response.usage.as_ref();
        let input_tokens = usage.map(|u| u.prompt_tokens).unwrap_or(0);
        let output_tokens = usage.map(|u| u.completion_tokens).unwrap_or(0);

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or(LlmError::NoChoices)?;
        let msg = choice.message;
        let tool_calls: Vec<ToolCallRequest> = msg
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .filter_map(|tc| {
                if let ChatCompletionMessageToolCalls::Function(f) = tc {
                    Some(ToolCallRequest {
                        name: f.function.name,
                        arguments: f.function.arguments,
                        id: Some(f.id),
                    })
                } else {
                    None
                }
            })
            .collect();

        Ok(LlmReply {
            text: msg.content.unwrap_or_default(),
            tool_calls,
            input_tokens,
            output_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Builder constructs without panicking.
    #[test]
    fn builder_constructs() {
        let config = OpenAIConfig::new().with_api_key("test-key");
        let _ = OpenAiEngine::with_config(config, "gpt-4o-mini").with_temperature(0.2);
    }

    /// **Scenario**: complete() against an unreachable base returns an error.
    #[tokio::test]
    async fn unreachable_base_returns_error() {
        let config = OpenAIConfig::new()
            .with_api_key("test-key")
            .with_api_base("https://127.0.0.1:1");
        let engine = OpenAiEngine::with_config(config, "gpt-4o-mini");
        let result = engine.complete(&[Message::user("Hello")], None).await;
        assert!(result.is_err());
    }
}
