//! Rule document loading
//!
//! The on-disk rule document is deserialized into plain settings structs and
//! then validated into a [`RuleRegistry`]. Missing required keys surface as
//! load errors, never as silent defaults.

use crate::{AlertThresholds, ConfigurationError, RuleRegistry, ThreatPattern};
use chrono::Duration;
use config::{Config, File, FileFormat};
use serde::Deserialize;
use threat_model::{MetricKind, PatternKind, Severity};
use tracing::info;

fn default_resolve_streak() -> u32 {
    2
}

fn default_channels() -> Vec<String> {
    vec!["dashboard".to_string()]
}

/// One pattern entry as written in the rule document
#[derive(Debug, Clone, Deserialize)]
pub struct PatternSettings {
    pub id: String,
    pub kind: PatternKind,
    pub metric: MetricKind,
    pub threshold: f64,
    /// Absolute clear line; defaults to `threshold` (no hysteresis)
    pub resolve_threshold: Option<f64>,
    /// Consecutive clear evaluations required before auto-resolution
    #[serde(default = "default_resolve_streak")]
    pub resolve_streak: u32,
    /// Window span for windowed kinds; ignored by threshold kinds
    #[serde(default)]
    pub time_window_secs: u64,
    pub severity: Severity,
    #[serde(default)]
    pub auto_resolve: bool,
    pub escalation_secs: u64,
    #[serde(default = "default_channels")]
    pub notification_channels: Vec<String>,
}

impl PatternSettings {
    fn into_pattern(self) -> ThreatPattern {
        let resolve_threshold = self.resolve_threshold.unwrap_or(self.threshold);
        ThreatPattern {
            id: self.id,
            kind: self.kind,
            metric: self.metric,
            threshold: self.threshold,
            resolve_threshold,
            resolve_streak: self.resolve_streak,
            time_window: Duration::seconds(self.time_window_secs as i64),
            severity: self.severity,
            auto_resolve: self.auto_resolve,
            escalation: Duration::seconds(self.escalation_secs as i64),
            notification_channels: self.notification_channels,
        }
    }
}

/// Root of the rule document
#[derive(Debug, Deserialize)]
pub struct RuleSettings {
    pub alert_thresholds: AlertThresholds,
    pub patterns: Vec<PatternSettings>,
}

impl RuleRegistry {
    /// Load and validate a rule document from a file
    pub fn from_file(path: &str) -> Result<Self, ConfigurationError> {
        let settings: RuleSettings = Config::builder()
            .add_source(File::with_name(path))
            .build()?
            .try_deserialize()?;
        let registry = Self::from_settings(settings)?;
        info!(
            "Loaded rule registry from {} ({} patterns)",
            path,
            registry.patterns().len()
        );
        Ok(registry)
    }

    /// Load and validate a TOML rule document from a string
    pub fn from_toml_str(document: &str) -> Result<Self, ConfigurationError> {
        let settings: RuleSettings = Config::builder()
            .add_source(File::from_str(document, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        Self::from_settings(settings)
    }

    /// Validate deserialized settings into a registry snapshot
    pub fn from_settings(settings: RuleSettings) -> Result<Self, ConfigurationError> {
        let patterns = settings
            .patterns
            .into_iter()
            .map(PatternSettings::into_pattern)
            .collect();
        Self::new(settings.alert_thresholds, patterns)
    }
}
