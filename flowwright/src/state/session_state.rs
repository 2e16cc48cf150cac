//! SessionState and the four state buckets.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::message::Message;

/// Hard cap on raw JSON allowed inside any transcript message.
pub const MAX_RAW_JSON_CHARS: usize = 500;

/// Process-wide routing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuntimeMode {
    /// Route through domain capabilities (default).
    #[default]
    CapabilityFirst,
    /// Legacy routing for callers that predate capabilities.
    CompatLegacy,
}

/// One state bucket: domain → key → value, merged by per-domain shallow union.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bucket(pub HashMap<String, Map<String, Value>>);

impl Bucket {
    pub fn get(&self, domain: &str, key: &str) -> Option<&Value> {
        self.0.get(domain).and_then(|m| m.get(key))
    }

    pub fn set(&mut self, domain: &str, key: impl Into<String>, value: Value) {
        self.0.entry(domain.to_string()).or_default().insert(key.into(), value);
    }

    /// Per-domain shallow union: keys from `other` win within each domain.
    pub fn merge(&mut self, other: &Bucket) {
        for (domain, entries) in &other.0 {
            let target = self.0.entry(domain.clone()).or_default();
            for (k, v) in entries {
                target.insert(k.clone(), v.clone());
            }
        }
    }

    pub fn domain(&self, domain: &str) -> Option<&Map<String, Value>> {
        self.0.get(domain)
    }
}

/// One end-to-end attempt to satisfy a requirement.
///
/// Created on intake, checkpointed at every node boundary, terminal when
/// `done=true` or parked on an interrupt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub requirement: String,
    #[serde(default)]
    pub runtime_mode: RuntimeMode,
    /// Strictly non-decreasing across the session.
    #[serde(default)]
    pub iteration: u32,
    #[serde(default)]
    pub done: bool,
    /// Every HITL interrupt auto-resumes with `approved` when set.
    #[serde(default)]
    pub auto_approve: bool,
    /// User payload injected by the runner before re-running an interrupted node.
    #[serde(default)]
    pub resume_payload: Option<Value>,
    /// LLM-visible transcript. No raw JSON blob over 500 chars, ever.
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Scalar metadata; selected keys may be rendered into prompts.
    #[serde(default)]
    pub facts: Bucket,
    /// Large payloads (flows, IR, reports). Never in prompts.
    #[serde(default)]
    pub artifacts: Bucket,
    /// Metrics and raw tool payloads, audit only.
    #[serde(default)]
    pub debug: Bucket,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>, requirement: impl Into<String>) -> Self {
        let requirement = requirement.into();
        let mut state = Self {
            session_id: session_id.into(),
            requirement: requirement.clone(),
            runtime_mode: RuntimeMode::default(),
            iteration: 0,
            done: false,
            auto_approve: false,
            resume_payload: None,
            messages: Vec::new(),
            facts: Bucket::default(),
            artifacts: Bucket::default(),
            debug: Bucket::default(),
        };
        state.messages.push(Message::user(requirement));
        state
    }

    /// Appends a message, enforcing the raw-JSON invariant in debug builds.
    pub fn push_message(&mut self, message: Message) {
        debug_assert!(
            raw_json_blob_len(message.content()) <= MAX_RAW_JSON_CHARS,
            "message carries a raw JSON blob over {} chars",
            MAX_RAW_JSON_CHARS
        );
        self.messages.push(message);
    }

    /// Appends a tool summary to the transcript (clamped by `Message::tool`).
    pub fn push_tool_summary(&mut self, tool_name: &str, summary: &str) {
        self.messages.push(Message::tool(tool_name, summary));
    }

    pub fn fact(&self, domain: &str, key: &str) -> Option<&Value> {
        self.facts.get(domain, key)
    }

    pub fn fact_str(&self, domain: &str, key: &str) -> Option<&str> {
        self.fact(domain, key).and_then(Value::as_str)
    }

    pub fn fact_u64(&self, domain: &str, key: &str) -> Option<u64> {
        self.fact(domain, key).and_then(Value::as_u64)
    }

    pub fn fact_bool(&self, domain: &str, key: &str) -> Option<bool> {
        self.fact(domain, key).and_then(Value::as_bool)
    }

    pub fn set_fact(&mut self, domain: &str, key: impl Into<String>, value: Value) {
        self.facts.set(domain, key, value);
    }

    pub fn artifact(&self, domain: &str, key: &str) -> Option<&Value> {
        self.artifacts.get(domain, key)
    }

    pub fn set_artifact(&mut self, domain: &str, key: impl Into<String>, value: Value) {
        self.artifacts.set(domain, key, value);
    }

    pub fn record_debug(&mut self, domain: &str, key: impl Into<String>, value: Value) {
        self.debug.set(domain, key, value);
    }

    /// Appends a normalized error record to `facts.session.errors`.
    pub fn record_error(&mut self, code: &str, detail: &str) {
        let entry = serde_json::json!({"code": code, "detail": detail});
        let errors = self
            .facts
            .0
            .entry("session".to_string())
            .or_default()
            .entry("errors".to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(arr) = errors {
            arr.push(entry);
        }
    }

    /// Advances the iteration counter (monotonic).
    pub fn next_iteration(&mut self) {
        self.iteration = self.iteration.saturating_add(1);
    }

    /// Marks the session terminal. `done=true` is never unset.
    pub fn mark_done(&mut self) {
        self.done = true;
    }

    /// Takes the resume payload, if any (consumed exactly once by a HITL node).
    pub fn take_resume_payload(&mut self) -> Option<Value> {
        self.resume_payload.take()
    }
}

/// Length of the longest balanced JSON object/array inside `text` that
/// actually parses as JSON, or 0 when none does.
///
/// Used to enforce the invariant that no transcript message carries a raw
/// payload over [`MAX_RAW_JSON_CHARS`] chars of JSON.
pub fn raw_json_blob_len(text: &str) -> usize {
    let bytes = text.as_bytes();
    let mut longest = 0usize;
    let mut i = 0usize;
    while i < bytes.len() {
        let open = bytes[i];
        if open == b'{' || open == b'[' {
            if let Some(end) = balanced_end(bytes, i) {
                let candidate = &text[i..=end];
                if candidate.len() > longest
                    && serde_json::from_str::<Value>(candidate).is_ok()
                {
                    longest = candidate.len();
                }
                // Skip past this region; nested regions are shorter.
                i = end + 1;
                continue;
            }
        }
        i += 1;
    }
    longest
}

/// Index of the byte closing the bracket opened at `start`, honoring strings
/// and escapes. None when unbalanced.
fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}
