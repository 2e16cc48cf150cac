//! Session state: the single state type that flows through the graph.
//!
//! State is trifurcated into LLM-visible `messages`, selective scalar
//! `facts`, large `artifacts` (never in prompts), and audit-only `debug`.
//! All writes are monotonic merges; `iteration` never decreases and
//! `done=true` is terminal.

mod session_state;

pub use session_state::{
    raw_json_blob_len, Bucket, RuntimeMode, SessionState, MAX_RAW_JSON_CHARS,
};
