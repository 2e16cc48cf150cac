//! Edge handle encoding: `{nodeId}-{direction}-{name}-{types joined by |}`.
//!
//! The compiler composes handle strings; the validator parses them back.
//! Anchor names and types never contain `-`, so the direction marker is the
//! first unambiguous split point.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Anchor direction within a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Input => "input",
            Direction::Output => "output",
        }
    }
}

/// Error from parsing a handle string.
#[derive(Debug, Error, PartialEq)]
pub enum HandleParseError {
    #[error("handle has no direction marker: {0}")]
    MissingDirection(String),
    #[error("handle has no anchor/type segment: {0}")]
    MissingAnchor(String),
}

/// Parsed form of an edge handle.
#[derive(Debug, Clone, PartialEq)]
pub struct Handle {
    pub node_id: String,
    pub direction: Direction,
    pub name: String,
    /// Type disjunction (pipe-joined on the wire).
    pub types: Vec<String>,
}

impl Handle {
    pub fn output(node_id: impl Into<String>, name: impl Into<String>, types: Vec<String>) -> Self {
        Self {
            node_id: node_id.into(),
            direction: Direction::Output,
            name: name.into(),
            types,
        }
    }

    pub fn input(node_id: impl Into<String>, name: impl Into<String>, types: Vec<String>) -> Self {
        Self {
            node_id: node_id.into(),
            direction: Direction::Input,
            name: name.into(),
            types,
        }
    }

    /// Encodes to the wire form `{nodeId}-{direction}-{name}-{types|...}`.
    pub fn encode(&self) -> String {
        format!(
            "{}-{}-{}-{}",
            self.node_id,
            self.direction.as_str(),
            self.name,
            self.types.join("|")
        )
    }

    /// Parses a wire handle back into its parts.
    pub fn parse(s: &str) -> Result<Self, HandleParseError> {
        let (node_id, direction, rest) = if let Some(idx) = s.find("-output-") {
            (&s[..idx], Direction::Output, &s[idx + "-output-".len()..])
        } else if let Some(idx) = s.find("-input-") {
            (&s[..idx], Direction::Input, &s[idx + "-input-".len()..])
        } else {
            return Err(HandleParseError::MissingDirection(s.to_string()));
        };
        let (name, types) = rest
            .rsplit_once('-')
            .ok_or_else(|| HandleParseError::MissingAnchor(s.to_string()))?;
        if name.is_empty() || node_id.is_empty() {
            return Err(HandleParseError::MissingAnchor(s.to_string()));
        }
        Ok(Self {
            node_id: node_id.to_string(),
            direction,
            name: name.to_string(),
            types: types
                .split('|')
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: encode/parse round-trips for single and disjunctive types.
    #[test]
    fn handle_roundtrip() {
        let handle = Handle::output(
            "chatOpenAI_0",
            "chatOpenAI",
            vec!["ChatOpenAI".into(), "BaseChatModel".into()],
        );
        let wire = handle.encode();
        assert_eq!(
            wire,
            "chatOpenAI_0-output-chatOpenAI-ChatOpenAI|BaseChatModel"
        );
        assert_eq!(Handle::parse(&wire).unwrap(), handle);

        let input = Handle::input("conversationChain_0", "model", vec!["BaseChatModel".into()]);
        assert_eq!(Handle::parse(&input.encode()).unwrap(), input);
    }

    /// **Scenario**: Node ids containing hyphens parse correctly (first marker wins).
    #[test]
    fn node_id_with_hyphen_parses() {
        let handle = Handle::output("buffer-memory_1", "bufferMemory", vec!["BaseMemory".into()]);
        let parsed = Handle::parse(&handle.encode()).unwrap();
        assert_eq!(parsed.node_id, "buffer-memory_1");
        assert_eq!(parsed.name, "bufferMemory");
    }

    /// **Scenario**: Malformed handles are rejected with the right error.
    #[test]
    fn malformed_handles_rejected() {
        assert_eq!(
            Handle::parse("no_marker_here"),
            Err(HandleParseError::MissingDirection("no_marker_here".into()))
        );
        assert!(matches!(
            Handle::parse("node-output-"),
            Err(HandleParseError::MissingAnchor(_))
        ));
    }
}
