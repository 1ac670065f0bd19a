//! Rule registry and pattern definitions

use crate::ConfigurationError;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use threat_model::{Fingerprint, MetricKind, PatternKind, Severity};

/// Global alerting floor, one entry per recognized metric key
///
/// All five keys are required; a rule document missing one fails validation
/// at load time. Threshold patterns may tighten these floors but never
/// trigger below them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertThresholds {
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub disk_usage: f64,
    pub network_connections: f64,
    pub failed_login_attempts: f64,
}

impl AlertThresholds {
    /// Floor for a metric, if one is configured for it
    pub fn floor_for(&self, metric: MetricKind) -> Option<f64> {
        match metric {
            MetricKind::CpuUsage => Some(self.cpu_usage),
            MetricKind::MemoryUsage => Some(self.memory_usage),
            MetricKind::DiskUsage => Some(self.disk_usage),
            MetricKind::NetworkConnections => Some(self.network_connections),
            MetricKind::FailedLogin => Some(self.failed_login_attempts),
            MetricKind::ListeningPorts | MetricKind::ProcessCount => None,
        }
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        let entries = [
            ("cpu_usage", self.cpu_usage),
            ("memory_usage", self.memory_usage),
            ("disk_usage", self.disk_usage),
            ("network_connections", self.network_connections),
            ("failed_login_attempts", self.failed_login_attempts),
        ];
        for (key, value) in entries {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigurationError::InvalidThreshold { key, value });
            }
        }
        Ok(())
    }
}

/// One threat-pattern rule
///
/// Threshold kinds compare each sample value against `threshold` and clear
/// strictly below `resolve_threshold` (the hysteresis margin is the gap
/// between the two). Windowed kinds count qualifying samples inside
/// `time_window` and fire once the count reaches `threshold`.
#[derive(Debug, Clone)]
pub struct ThreatPattern {
    pub id: String,
    pub kind: PatternKind,
    pub metric: MetricKind,
    pub threshold: f64,
    pub resolve_threshold: f64,
    pub resolve_streak: u32,
    pub time_window: Duration,
    pub severity: Severity,
    pub auto_resolve: bool,
    pub escalation: Duration,
    pub notification_channels: Vec<String>,
}

impl ThreatPattern {
    /// Gap a breaching value must fall through before the condition clears
    pub fn hysteresis_margin(&self) -> f64 {
        self.threshold - self.resolve_threshold
    }

    pub fn fingerprint(&self, source_id: &str) -> Fingerprint {
        Fingerprint::new(self.id.clone(), source_id)
    }

    /// Human-readable alert description for a match on this pattern
    pub fn summary(&self, source_id: &str, value: f64) -> String {
        match self.kind {
            PatternKind::ResourceAbuse => format!(
                "High {} detected on {}: {:.1}%",
                self.metric, source_id, value
            ),
            PatternKind::NetworkAnomaly => format!(
                "Excessive {} detected on {}: {:.0}",
                self.metric, source_id, value
            ),
            PatternKind::BruteForce => format!(
                "Potential brute force attack on {}: {:.0} failed login attempts",
                source_id, value
            ),
            PatternKind::PortScan => format!(
                "Possible port scan against {}: {:.0} probes in window",
                source_id, value
            ),
            PatternKind::SuspiciousProcess => format!(
                "Unusually high {} on {}: {:.0}",
                self.metric, source_id, value
            ),
        }
    }

    fn validate(&self, thresholds: &AlertThresholds) -> Result<(), ConfigurationError> {
        let invalid = |reason: String| ConfigurationError::InvalidPattern {
            id: self.id.clone(),
            reason,
        };

        if self.id.is_empty() {
            return Err(ConfigurationError::InvalidPattern {
                id: "<empty>".to_string(),
                reason: "pattern id must not be empty".to_string(),
            });
        }
        if !self.threshold.is_finite() || self.threshold <= 0.0 {
            return Err(invalid(format!(
                "threshold must be a positive finite number, got {}",
                self.threshold
            )));
        }
        if self.kind.is_windowed() {
            if self.time_window <= Duration::zero() {
                return Err(invalid("windowed patterns need a positive time_window".into()));
            }
        } else {
            if !self.resolve_threshold.is_finite()
                || self.resolve_threshold < 0.0
                || self.resolve_threshold > self.threshold
            {
                return Err(invalid(format!(
                    "resolve_threshold {} must lie in [0, threshold {}]",
                    self.resolve_threshold, self.threshold
                )));
            }
            if self.resolve_streak == 0 {
                return Err(invalid("resolve_streak must be at least 1".into()));
            }
        }
        if self.escalation <= Duration::zero() {
            return Err(invalid("escalation time must be positive".into()));
        }
        if self.notification_channels.is_empty() {
            return Err(invalid("at least one notification channel is required".into()));
        }
        if let Some(floor) = thresholds.floor_for(self.metric) {
            if self.threshold < floor {
                return Err(invalid(format!(
                    "threshold {} is below the configured alert floor {} for {}",
                    self.threshold, floor, self.metric
                )));
            }
        }
        Ok(())
    }
}

/// Immutable-per-epoch rule snapshot
#[derive(Debug, Clone)]
pub struct RuleRegistry {
    thresholds: AlertThresholds,
    patterns: Vec<ThreatPattern>,
}

impl RuleRegistry {
    /// Build a registry, validating thresholds and every pattern
    pub fn new(
        thresholds: AlertThresholds,
        patterns: Vec<ThreatPattern>,
    ) -> Result<Self, ConfigurationError> {
        thresholds.validate()?;
        let mut seen = HashSet::new();
        for pattern in &patterns {
            if !seen.insert(pattern.id.clone()) {
                return Err(ConfigurationError::DuplicatePattern(pattern.id.clone()));
            }
            pattern.validate(&thresholds)?;
        }
        Ok(Self {
            thresholds,
            patterns,
        })
    }

    /// Built-in rule set matching the deployed defaults
    pub fn builtin() -> Self {
        let thresholds = AlertThresholds {
            cpu_usage: 80.0,
            memory_usage: 85.0,
            disk_usage: 90.0,
            network_connections: 1000.0,
            failed_login_attempts: 5.0,
        };

        let dashboard_log = vec!["dashboard".to_string(), "log".to_string()];
        let patterns = vec![
            ThreatPattern {
                id: "brute_force".to_string(),
                kind: PatternKind::BruteForce,
                metric: MetricKind::FailedLogin,
                threshold: 5.0,
                resolve_threshold: 5.0,
                resolve_streak: 2,
                time_window: Duration::minutes(10),
                severity: Severity::High,
                auto_resolve: false,
                escalation: Duration::seconds(60),
                notification_channels: vec![
                    "dashboard".to_string(),
                    "log".to_string(),
                    "email".to_string(),
                    "sms".to_string(),
                ],
            },
            ThreatPattern {
                id: "cpu_abuse".to_string(),
                kind: PatternKind::ResourceAbuse,
                metric: MetricKind::CpuUsage,
                threshold: 90.0,
                resolve_threshold: 70.0,
                resolve_streak: 2,
                time_window: Duration::zero(),
                severity: Severity::Medium,
                auto_resolve: true,
                escalation: Duration::seconds(300),
                notification_channels: dashboard_log.clone(),
            },
            ThreatPattern {
                id: "memory_abuse".to_string(),
                kind: PatternKind::ResourceAbuse,
                metric: MetricKind::MemoryUsage,
                threshold: 95.0,
                resolve_threshold: 70.0,
                resolve_streak: 2,
                time_window: Duration::zero(),
                severity: Severity::Medium,
                auto_resolve: true,
                escalation: Duration::seconds(300),
                notification_channels: dashboard_log.clone(),
            },
            ThreatPattern {
                id: "disk_abuse".to_string(),
                kind: PatternKind::ResourceAbuse,
                metric: MetricKind::DiskUsage,
                threshold: 95.0,
                resolve_threshold: 70.0,
                resolve_streak: 2,
                time_window: Duration::zero(),
                severity: Severity::Medium,
                auto_resolve: true,
                escalation: Duration::seconds(300),
                notification_channels: dashboard_log.clone(),
            },
            ThreatPattern {
                id: "connection_flood".to_string(),
                kind: PatternKind::NetworkAnomaly,
                metric: MetricKind::NetworkConnections,
                threshold: 1500.0,
                resolve_threshold: 1000.0,
                resolve_streak: 2,
                time_window: Duration::zero(),
                severity: Severity::High,
                auto_resolve: false,
                escalation: Duration::seconds(180),
                notification_channels: vec![
                    "dashboard".to_string(),
                    "log".to_string(),
                    "email".to_string(),
                ],
            },
            ThreatPattern {
                id: "port_scan".to_string(),
                kind: PatternKind::PortScan,
                metric: MetricKind::ListeningPorts,
                threshold: 50.0,
                resolve_threshold: 50.0,
                resolve_streak: 2,
                time_window: Duration::minutes(5),
                severity: Severity::High,
                auto_resolve: false,
                escalation: Duration::seconds(180),
                notification_channels: vec![
                    "dashboard".to_string(),
                    "log".to_string(),
                    "email".to_string(),
                ],
            },
            ThreatPattern {
                id: "process_surge".to_string(),
                kind: PatternKind::SuspiciousProcess,
                metric: MetricKind::ProcessCount,
                threshold: 500.0,
                resolve_threshold: 500.0,
                resolve_streak: 2,
                time_window: Duration::zero(),
                severity: Severity::Medium,
                auto_resolve: false,
                escalation: Duration::seconds(300),
                notification_channels: vec!["dashboard".to_string()],
            },
        ];

        Self::new(thresholds, patterns).expect("builtin rule set is valid")
    }

    pub fn thresholds(&self) -> &AlertThresholds {
        &self.thresholds
    }

    pub fn patterns(&self) -> &[ThreatPattern] {
        &self.patterns
    }

    /// Look a pattern up by id
    pub fn pattern(&self, id: &str) -> Option<&ThreatPattern> {
        self.patterns.iter().find(|p| p.id == id)
    }

    /// All patterns watching a given metric kind
    pub fn patterns_for(&self, metric: MetricKind) -> impl Iterator<Item = &ThreatPattern> {
        self.patterns.iter().filter(move |p| p.metric == metric)
    }

    /// True if any pattern references the given id
    pub fn contains(&self, id: &str) -> bool {
        self.patterns.iter().any(|p| p.id == id)
    }
}
