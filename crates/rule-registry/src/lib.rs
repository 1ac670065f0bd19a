//! Config / Rule Registry
//!
//! Holds threshold values and threat-pattern definitions. A registry is an
//! immutable snapshot: the evaluation pipeline receives it behind an `Arc`,
//! and a reload produces a new snapshot rather than mutating the one in use.

mod registry;
mod settings;

pub use registry::{AlertThresholds, RuleRegistry, ThreatPattern};
pub use settings::{PatternSettings, RuleSettings};

use thiserror::Error;

/// Errors while loading or validating the rule configuration
///
/// All of these are fatal at startup: the process does not begin monitoring
/// with an invalid rule set.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("failed to load rule configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("alert threshold `{key}` must be a positive finite number, got {value}")]
    InvalidThreshold { key: &'static str, value: f64 },

    #[error("pattern `{id}`: {reason}")]
    InvalidPattern { id: String, reason: String },

    #[error("duplicate pattern id `{0}`")]
    DuplicatePattern(String),
}
