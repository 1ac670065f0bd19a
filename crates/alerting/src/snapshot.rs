//! Published alert snapshot and statistics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use threat_model::{Alert, AlertStatus, Fingerprint, PatternKind, Severity};

/// Immutable view of the alert set, published once per tick
///
/// Readers query snapshots and never observe a half-applied tick: an alert
/// appears in exactly one state per snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertSnapshot {
    pub generated_at: DateTime<Utc>,
    /// Active alerts, severity descending then most recently seen first
    pub active: Vec<Alert>,
    /// Resolved history, newest first
    pub resolved: Vec<Alert>,
}

impl AlertSnapshot {
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            generated_at: now,
            active: Vec::new(),
            resolved: Vec::new(),
        }
    }

    /// Filter alerts by status and/or severity
    ///
    /// Without a status filter the active set is returned in its published
    /// order; `resolved` selects from history.
    pub fn query(
        &self,
        status: Option<AlertStatus>,
        severity: Option<Severity>,
    ) -> Vec<&Alert> {
        let source: &[Alert] = match status {
            Some(AlertStatus::Resolved) => &self.resolved,
            _ => &self.active,
        };
        source
            .iter()
            .filter(|a| status.map_or(true, |s| a.status == s))
            .filter(|a| severity.map_or(true, |s| a.severity == s))
            .collect()
    }

    /// Alert for a fingerprint: the active one, or the latest resolved
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<&Alert> {
        self.active
            .iter()
            .find(|a| &a.fingerprint == fingerprint)
            .or_else(|| self.resolved.iter().find(|a| &a.fingerprint == fingerprint))
    }

    /// Aggregate counts for the status endpoint
    pub fn stats(&self) -> AlertStats {
        let mut stats = AlertStats {
            active: self.active.len(),
            resolved: self.resolved.len(),
            ..AlertStats::default()
        };
        for alert in &self.active {
            match alert.status {
                AlertStatus::Open => stats.open += 1,
                AlertStatus::Acknowledged => stats.acknowledged += 1,
                AlertStatus::Escalated => stats.escalated += 1,
                AlertStatus::Resolved => {}
            }
            *stats.by_severity.entry(alert.severity).or_insert(0) += 1;
            *stats.by_kind.entry(alert.kind).or_insert(0) += 1;
        }
        stats
    }
}

/// Alert counts by status, severity, and kind
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertStats {
    pub active: usize,
    pub open: usize,
    pub acknowledged: usize,
    pub escalated: usize,
    pub resolved: usize,
    pub by_severity: HashMap<Severity, usize>,
    pub by_kind: HashMap<PatternKind, usize>,
}
