//! Typed errors for the config-update boundary and the per-block tick pass.

use thiserror::Error;

use crate::block::{BlockId, Status};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Every violation found in one value, not just the first.
    #[error("invalid {what}: {}", .violations.join("; "))]
    Invalid {
        what: &'static str,
        violations: Vec<String>,
    },
}

impl ConfigError {
    pub fn violations(&self) -> &[String] {
        match self {
            Self::Invalid { violations, .. } => violations,
        }
    }
}

/// A block whose committed state cannot be advanced.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TickError {
    #[error("block {block}: remaining volume is not a finite number while {status:?}")]
    NonFiniteVolume { block: BlockId, status: Status },
    #[error("block {block}: sensor '{sensor}' is not a finite number")]
    NonFiniteSensor { block: BlockId, sensor: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_lists_every_violation() {
        let err = ConfigError::Invalid {
            what: "irrigation config",
            violations: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.to_string(), "invalid irrigation config: a; b");
        assert_eq!(err.violations().len(), 2);
    }
}
