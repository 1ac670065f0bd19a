//! Threat events and the alert record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Alert severity, ordered from least to most urgent
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Numeric priority (1 = low .. 4 = critical)
    pub fn priority(&self) -> u8 {
        match self {
            Severity::Low => 1,
            Severity::Medium => 2,
            Severity::High => 3,
            Severity::Critical => 4,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(name)
    }
}

/// Closed set of threat pattern kinds
///
/// Adding a kind is a compile-time extension: every consumer matches
/// exhaustively, there is no string-keyed dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    ResourceAbuse,
    NetworkAnomaly,
    BruteForce,
    PortScan,
    SuspiciousProcess,
}

impl PatternKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternKind::ResourceAbuse => "resource_abuse",
            PatternKind::NetworkAnomaly => "network_anomaly",
            PatternKind::BruteForce => "brute_force",
            PatternKind::PortScan => "port_scan",
            PatternKind::SuspiciousProcess => "suspicious_process",
        }
    }

    /// Windowed kinds count qualifying samples over a time window;
    /// the rest compare a single value against a threshold.
    pub fn is_windowed(&self) -> bool {
        matches!(self, PatternKind::BruteForce | PatternKind::PortScan)
    }
}

impl std::fmt::Display for PatternKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one monitored condition: the same (pattern, source) pair
/// always maps to the same fingerprint, which is the deduplication key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    pub pattern_id: String,
    pub source_id: String,
}

impl Fingerprint {
    pub fn new(pattern_id: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            pattern_id: pattern_id.into(),
            source_id: source_id.into(),
        }
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.pattern_id, self.source_id)
    }
}

/// Pattern match emitted by the detector, consumed within one tick
///
/// `occurrences` is 1 for threshold matches; for windowed matches it carries
/// the in-window count at fire time, so the alert's occurrence count tracks
/// the number of underlying attempts rather than the number of events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatEvent {
    pub fingerprint: Fingerprint,
    pub kind: PatternKind,
    pub severity: Severity,
    pub observed_value: f64,
    pub occurrences: u64,
    pub timestamp: DateTime<Utc>,
}

/// "Condition cleared" signal for threshold patterns
///
/// Emitted when a previously breaching value drops below the pattern's clear
/// line. Feeds the alert manager's auto-resolve streak; never creates alerts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveCandidate {
    pub fingerprint: Fingerprint,
    pub observed_value: f64,
    pub timestamp: DateTime<Utc>,
}

/// Alert lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Open,
    Acknowledged,
    Escalated,
    Resolved,
}

impl AlertStatus {
    /// Active alerts hold the fingerprint; resolved ones are history
    pub fn is_active(&self) -> bool {
        !matches!(self, AlertStatus::Resolved)
    }
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AlertStatus::Open => "open",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Escalated => "escalated",
            AlertStatus::Resolved => "resolved",
        };
        f.write_str(name)
    }
}

/// The durable in-process alert record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub fingerprint: Fingerprint,
    pub kind: PatternKind,
    pub severity: Severity,
    pub status: AlertStatus,
    pub message: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub occurrence_count: u64,
    pub last_value: f64,
    pub escalation_deadline: DateTime<Utc>,
    pub resolve_streak: u32,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_notes: Option<String>,
}

impl Alert {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// Lifecycle transition kinds pushed to live-update subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertEventType {
    Created,
    Escalated,
    Acknowledged,
    Resolved,
}

impl std::fmt::Display for AlertEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AlertEventType::Created => "created",
            AlertEventType::Escalated => "escalated",
            AlertEventType::Acknowledged => "acknowledged",
            AlertEventType::Resolved => "resolved",
        };
        f.write_str(name)
    }
}

/// Push payload emitted on every lifecycle transition
///
/// Delivery is best-effort: subscribers may miss events and recover the
/// current state through the query interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertNotification {
    pub event: AlertEventType,
    pub alert: Alert,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
        assert_eq!(Severity::High.max(Severity::Medium), Severity::High);
    }

    #[test]
    fn test_severity_priority() {
        assert_eq!(Severity::Low.priority(), 1);
        assert_eq!(Severity::Critical.priority(), 4);
    }

    #[test]
    fn test_status_activity() {
        assert!(AlertStatus::Open.is_active());
        assert!(AlertStatus::Acknowledged.is_active());
        assert!(AlertStatus::Escalated.is_active());
        assert!(!AlertStatus::Resolved.is_active());
    }

    #[test]
    fn test_fingerprint_identity() {
        let a = Fingerprint::new("cpu_abuse", "host-a");
        let b = Fingerprint::new("cpu_abuse", "host-a");
        let c = Fingerprint::new("cpu_abuse", "host-b");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.to_string(), "cpu_abuse/host-a");
    }

    #[test]
    fn test_windowed_kinds() {
        assert!(PatternKind::BruteForce.is_windowed());
        assert!(PatternKind::PortScan.is_windowed());
        assert!(!PatternKind::ResourceAbuse.is_windowed());
        assert!(!PatternKind::NetworkAnomaly.is_windowed());
        assert!(!PatternKind::SuspiciousProcess.is_windowed());
    }
}
