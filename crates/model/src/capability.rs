//! Model capability identifiers

use anyhow::{bail, Result};

/// Prefix of the joined error when capabilities are missing
pub const DOES_NOT_SUPPORT: &str = "does not support";

/// A feature a caller may require of a model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Text completion, absent on pooling-only embedders
    Completion,
    /// Tool calling through the template's `tools` variable
    Tools,
    /// Fill-in-the-middle through the template's `suffix` variable
    Insert,
}

impl Capability {
    /// The wire name of the capability
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Completion => "completion",
            Capability::Tools => "tools",
            Capability::Insert => "insert",
        }
    }

    /// Parse a capability name
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "completion" => Ok(Capability::Completion),
            "tools" => Ok(Capability::Tools),
            "insert" => Ok(Capability::Insert),
            _ => bail!("unknown capability: {s}"),
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
