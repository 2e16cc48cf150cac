//! Lenient JSON extraction from model output.
//!
//! LLM nodes that require structured output (intent classification, patch
//! scope, the IR op list) accept plain JSON, fenced JSON, or JSON embedded
//! in prose; the first parseable object or array wins.

use serde_json::Value;

/// Extracts the first JSON object or array from `text`.
///
/// Tries, in order: the whole text, the content of a ``` fence, and the
/// first balanced `{...}`/`[...]` region that parses.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        if v.is_object() || v.is_array() {
            return Some(v);
        }
    }

    if let Some(fenced) = fenced_block(trimmed) {
        if let Ok(v) = serde_json::from_str::<Value>(fenced.trim()) {
            if v.is_object() || v.is_array() {
                return Some(v);
            }
        }
    }

    let bytes = trimmed.as_bytes();
    let mut i = 0usize;
    while i < bytes.len() {
        if bytes[i] == b'{' || bytes[i] == b'[' {
            if let Some(end) = balanced_end(bytes, i) {
                if let Ok(v) = serde_json::from_str::<Value>(&trimmed[i..=end]) {
                    return Some(v);
                }
                i = end + 1;
                continue;
            }
        }
        i += 1;
    }
    None
}

fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after = &text[start + 3..];
    // Skip a language tag like `json` on the fence line.
    let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after[body_start..];
    let end = body.find("```")?;
    Some(&body[..end])
}

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
