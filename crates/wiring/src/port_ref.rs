use serde::{Deserialize, Serialize};
use std::fmt;

/// A `module.port` terminal reference.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct PortRef {
    pub module: String,
    pub port: String,
}

impl PortRef {
    pub fn new(module: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            port: port.into(),
        }
    }

    /// Split at the first `.`. Both halves must be non-empty; the port part
    /// may itself contain further dots.
    pub fn parse(reference: &str) -> Option<Self> {
        let dot = reference.find('.')?;
        if dot == 0 || dot + 1 >= reference.len() {
            return None;
        }
        Some(Self {
            module: reference[..dot].to_string(),
            port: reference[dot + 1..].to_string(),
        })
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.port)
    }
}
