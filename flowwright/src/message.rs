//! Message types for the LLM-visible transcript.
//!
//! Roles: System (first in the list), User, Assistant, Tool. Tool messages
//! carry the envelope summary string only — never a raw payload — and are
//! clamped at construction so no single tool summary exceeds
//! [`MAX_TOOL_SUMMARY_CHARS`] in context.

use serde::{Deserialize, Serialize};

/// Hard cap on a single tool summary injected into LLM context.
pub const MAX_TOOL_SUMMARY_CHARS: usize = 4000;

/// A single message in the session transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    /// System prompt; typically placed first in the message list.
    System(String),
    /// User input (the requirement, HITL revisions).
    User(String),
    /// Model reply (plan text, IR JSON, classification JSON).
    Assistant(String),
    /// Tool result summary; the full payload lives in artifacts/debug.
    Tool { name: String, summary: String },
}

impl Message {
    /// Creates a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::System(content.into())
    }

    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::User(content.into())
    }

    /// Creates an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant(content.into())
    }

    /// Creates a tool message, clamping the summary with a visible marker.
    pub fn tool(name: impl Into<String>, summary: impl Into<String>) -> Self {
        Self::Tool {
            name: name.into(),
            summary: clamp_visible(summary.into(), MAX_TOOL_SUMMARY_CHARS),
        }
    }

    /// The textual content of this message regardless of role.
    pub fn content(&self) -> &str {
        match self {
            Message::System(c) | Message::User(c) | Message::Assistant(c) => c,
            Message::Tool { summary, .. } => summary,
        }
    }

    /// Role label used when rendering prompts and debugging.
    pub fn role(&self) -> &'static str {
        match self {
            Message::System(_) => "system",
            Message::User(_) => "user",
            Message::Assistant(_) => "assistant",
            Message::Tool { .. } => "tool",
        }
    }
}

/// Truncates `s` to `max` characters, appending an `...[N chars truncated]`
/// marker when anything was cut. The marker counts against nothing; truncation
/// is always visible.
pub fn clamp_visible(s: String, max: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max {
        return s;
    }
    let kept: String = s.chars().take(max).collect();
    format!("{}...[{} chars truncated]", kept, char_count - max)
}
