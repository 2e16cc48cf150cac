//! Tool registry and domain capability.
//!
//! Tools are namespaced (`domain.name`), registered with the phases they may
//! appear in, and every invocation is wrapped through the envelope. The
//! registry is the only seam between graph nodes and concrete domains.

mod domain;
mod registry;

pub use domain::{
    knowledge_toolset, platform_toolset, ChatflowCapability, DomainCapability, DomainToolset,
};
pub use registry::{RegistryError, ToolFn, ToolFuture, ToolRegistry};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Session phases a tool can be exposed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Discover,
    Plan,
    Patch,
    Test,
    Evaluate,
    Converge,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Discover => "discover",
            Phase::Plan => "plan",
            Phase::Patch => "patch",
            Phase::Test => "test",
            Phase::Evaluate => "evaluate",
            Phase::Converge => "converge",
        }
    }

    pub const ALL: [Phase; 6] = [
        Phase::Discover,
        Phase::Plan,
        Phase::Patch,
        Phase::Test,
        Phase::Evaluate,
        Phase::Converge,
    ];
}

impl std::str::FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "discover" => Ok(Phase::Discover),
            "plan" => Ok(Phase::Plan),
            "patch" => Ok(Phase::Patch),
            "test" => Ok(Phase::Test),
            "evaluate" => Ok(Phase::Evaluate),
            "converge" => Ok(Phase::Converge),
            other => Err(format!("unknown phase: {}", other)),
        }
    }
}

/// Tool definition exposed to the LLM: name, description, JSON-Schema params.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    /// JSON Schema for arguments.
    pub parameters: Value,
}

impl ToolDef {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Phase round-trips through as_str/FromStr for all variants.
    #[test]
    fn phase_str_roundtrip() {
        for phase in Phase::ALL {
            let parsed: Phase = phase.as_str().parse().unwrap();
            assert_eq!(parsed, phase);
        }
        assert!("deploy".parse::<Phase>().is_err());
    }
}
