//! Scripted mock engine for tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::message::Message;
use crate::tools::ToolDef;

use super::{LlmEngine, LlmError, LlmReply};

/// Returns scripted replies in order; errors when the script runs dry.
///
/// **Interaction**: Stands in for the real engine in graph tests; `calls()`
/// lets tests assert how many completions a session consumed.
pub struct MockEngine {
    replies: Mutex<VecDeque<LlmReply>>,
    calls: AtomicUsize,
}

impl MockEngine {
    pub fn new(replies: Vec<LlmReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Convenience: a script of plain text replies.
    pub fn from_texts(texts: Vec<&str>) -> Self {
        Self::new(
            texts
                .into_iter()
                .map(|t| LlmReply {
                    text: t.to_string(),
                    tool_calls: vec![],
                    input_tokens: 10,
                    output_tokens: 5,
                })
                .collect(),
        )
    }

    /// Number of completions consumed so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmEngine for MockEngine {
    async fn complete(
        &self,
        _messages: &[Message],
        _tools: Option<&[ToolDef]>,
    ) -> Result<LlmReply, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.replies
            .lock()
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?
            .pop_front()
            .ok_or_else(|| LlmError::RequestFailed("mock script exhausted".into()))
    }
}
