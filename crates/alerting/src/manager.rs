//! Alert Manager Implementation

use crate::snapshot::AlertSnapshot;
use chrono::{DateTime, Duration, Utc};
use rule_registry::RuleRegistry;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use thiserror::Error;
use threat_model::{
    Alert, AlertEventType, AlertNotification, AlertStatus, Fingerprint, PatternKind,
    ResolveCandidate, ThreatEvent,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Resolved alerts kept for trend queries
const HISTORY_CAP: usize = 1000;

/// Escalation fallback when an event references a pattern the registry
/// no longer knows (possible across a reload)
const DEFAULT_ESCALATION_SECS: i64 = 300;

/// Lifecycle action errors
#[derive(Debug, Clone, Error)]
pub enum AlertError {
    #[error("no active alert for {0}")]
    NotFound(Fingerprint),

    #[error("alert {fingerprint} cannot transition from {status}")]
    InvalidTransition {
        fingerprint: Fingerprint,
        status: AlertStatus,
    },
}

/// Owns every active alert and the resolved history
///
/// At most one active alert exists per fingerprint; threat events either
/// create that alert or reinforce it, never duplicate it.
pub struct AlertManager {
    registry: Arc<RuleRegistry>,
    active: HashMap<Fingerprint, Alert>,
    history: VecDeque<Alert>,
}

impl AlertManager {
    pub fn new(registry: Arc<RuleRegistry>) -> Self {
        Self {
            registry,
            active: HashMap::new(),
            history: VecDeque::new(),
        }
    }

    /// Swap in a new registry snapshot for policy lookups
    pub fn set_registry(&mut self, registry: Arc<RuleRegistry>) {
        self.registry = registry;
    }

    /// Consume one threat event: create or reinforce the fingerprint's alert
    ///
    /// Returns a notification only on creation; reinforcement mutates the
    /// existing alert in place. Severity never decreases while active.
    pub fn ingest(&mut self, event: ThreatEvent, now: DateTime<Utc>) -> Option<AlertNotification> {
        let (escalation, message) = match self.registry.pattern(&event.fingerprint.pattern_id) {
            Some(pattern) => (
                pattern.escalation,
                pattern.summary(&event.fingerprint.source_id, event.observed_value),
            ),
            None => (
                Duration::seconds(DEFAULT_ESCALATION_SECS),
                format!(
                    "{} detected on {}",
                    event.kind, event.fingerprint.source_id
                ),
            ),
        };

        match self.active.entry(event.fingerprint.clone()) {
            Entry::Occupied(mut occupied) => {
                let alert = occupied.get_mut();
                alert.last_seen = event.timestamp;
                alert.last_value = event.observed_value;
                alert.occurrence_count = (alert.occurrence_count + 1).max(event.occurrences);
                if event.severity > alert.severity {
                    alert.severity = event.severity;
                }
                alert.message = message;
                // a fresh breach invalidates any clear streak in progress
                alert.resolve_streak = 0;
                debug!(
                    "Alert {} reinforced (count: {})",
                    alert.fingerprint, alert.occurrence_count
                );
                None
            }
            Entry::Vacant(vacant) => {
                let alert = Alert {
                    id: Uuid::new_v4(),
                    fingerprint: event.fingerprint.clone(),
                    kind: event.kind,
                    severity: event.severity,
                    status: AlertStatus::Open,
                    message,
                    first_seen: event.timestamp,
                    last_seen: event.timestamp,
                    occurrence_count: event.occurrences,
                    last_value: event.observed_value,
                    escalation_deadline: now + escalation,
                    resolve_streak: 0,
                    acknowledged_by: None,
                    acknowledged_at: None,
                    resolved_by: None,
                    resolved_at: None,
                    resolution_notes: None,
                };
                info!(
                    "New alert created: {} (severity: {})",
                    alert.message, alert.severity
                );
                let alert = vacant.insert(alert).clone();
                Some(AlertNotification {
                    event: AlertEventType::Created,
                    alert,
                })
            }
        }
    }

    /// Consume a clear signal from the detector
    ///
    /// Only patterns flagged `auto_resolve` accumulate a streak; everything
    /// else requires an explicit acknowledge/resolve action and never
    /// auto-resolves regardless of metric behavior.
    pub fn observe_clear(
        &mut self,
        candidate: &ResolveCandidate,
        now: DateTime<Utc>,
    ) -> Option<AlertNotification> {
        let (auto_resolve, required) =
            match self.registry.pattern(&candidate.fingerprint.pattern_id) {
                Some(pattern) => (pattern.auto_resolve, pattern.resolve_streak),
                None => (false, 0),
            };
        if !auto_resolve {
            return None;
        }

        let alert = self.active.get_mut(&candidate.fingerprint)?;
        alert.resolve_streak += 1;
        alert.last_value = candidate.observed_value;
        debug!(
            "Clear observed for {} (streak {}/{})",
            alert.fingerprint, alert.resolve_streak, required
        );

        if alert.resolve_streak >= required {
            let alert = self.active.remove(&candidate.fingerprint)?;
            let notes = match alert.kind {
                PatternKind::ResourceAbuse => "Resource usage normalized",
                PatternKind::NetworkAnomaly => "Network activity normalized",
                _ => "Condition cleared",
            };
            return Some(self.archive(alert, now, "system_auto_resolve", Some(notes.to_string())));
        }
        None
    }

    /// Escalate every open alert whose deadline has passed
    ///
    /// Level-triggered and idempotent: an already-escalated alert is
    /// untouched, an acknowledged one never escalates.
    pub fn check_escalations(&mut self, now: DateTime<Utc>) -> Vec<AlertNotification> {
        let mut notifications = Vec::new();
        for alert in self.active.values_mut() {
            if alert.status == AlertStatus::Open && now >= alert.escalation_deadline {
                alert.status = AlertStatus::Escalated;
                warn!(
                    "Alert {} escalated: unacknowledged past deadline",
                    alert.fingerprint
                );
                notifications.push(AlertNotification {
                    event: AlertEventType::Escalated,
                    alert: alert.clone(),
                });
            }
        }
        notifications
    }

    /// Operator acknowledgement: open -> acknowledged
    pub fn acknowledge(
        &mut self,
        fingerprint: &Fingerprint,
        user: &str,
        now: DateTime<Utc>,
    ) -> Result<AlertNotification, AlertError> {
        let alert = self
            .active
            .get_mut(fingerprint)
            .ok_or_else(|| AlertError::NotFound(fingerprint.clone()))?;
        if alert.status != AlertStatus::Open {
            return Err(AlertError::InvalidTransition {
                fingerprint: fingerprint.clone(),
                status: alert.status,
            });
        }
        alert.status = AlertStatus::Acknowledged;
        alert.acknowledged_by = Some(user.to_string());
        alert.acknowledged_at = Some(now);
        info!("Alert {} acknowledged by {}", alert.fingerprint, user);
        Ok(AlertNotification {
            event: AlertEventType::Acknowledged,
            alert: alert.clone(),
        })
    }

    /// Operator resolution, valid from any active status
    pub fn resolve(
        &mut self,
        fingerprint: &Fingerprint,
        user: &str,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<AlertNotification, AlertError> {
        let alert = self
            .active
            .remove(fingerprint)
            .ok_or_else(|| AlertError::NotFound(fingerprint.clone()))?;
        Ok(self.archive(alert, now, user, notes))
    }

    /// Consistent snapshot of the current alert set
    ///
    /// Active alerts are ordered by severity descending, then most recently
    /// seen first; resolved history newest first.
    pub fn snapshot(&self, now: DateTime<Utc>) -> AlertSnapshot {
        let mut active: Vec<Alert> = self.active.values().cloned().collect();
        active.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then(b.last_seen.cmp(&a.last_seen))
        });
        AlertSnapshot {
            generated_at: now,
            active,
            resolved: self.history.iter().rev().cloned().collect(),
        }
    }

    /// Active alert for a fingerprint, if any
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<&Alert> {
        self.active.get(fingerprint)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    fn archive(
        &mut self,
        mut alert: Alert,
        now: DateTime<Utc>,
        user: &str,
        notes: Option<String>,
    ) -> AlertNotification {
        alert.status = AlertStatus::Resolved;
        alert.resolved_by = Some(user.to_string());
        alert.resolved_at = Some(now);
        alert.resolution_notes = notes;
        info!("Alert {} resolved by {}", alert.fingerprint, user);

        if self.history.len() >= HISTORY_CAP {
            self.history.pop_front();
        }
        self.history.push_back(alert.clone());
        AlertNotification {
            event: AlertEventType::Resolved,
            alert,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rule_registry::{AlertThresholds, ThreatPattern};
    use threat_model::{MetricKind, Severity};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap()
    }

    fn test_registry() -> Arc<RuleRegistry> {
        let thresholds = AlertThresholds {
            cpu_usage: 75.0,
            memory_usage: 85.0,
            disk_usage: 90.0,
            network_connections: 1000.0,
            failed_login_attempts: 5.0,
        };
        let patterns = vec![
            ThreatPattern {
                id: "cpu_abuse".to_string(),
                kind: PatternKind::ResourceAbuse,
                metric: MetricKind::CpuUsage,
                threshold: 80.0,
                resolve_threshold: 70.0,
                resolve_streak: 2,
                time_window: Duration::zero(),
                severity: Severity::Medium,
                auto_resolve: true,
                escalation: Duration::seconds(300),
                notification_channels: vec!["log".to_string()],
            },
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
                notification_channels: vec!["log".to_string()],
            },
        ];
        Arc::new(RuleRegistry::new(thresholds, patterns).unwrap())
    }

    fn cpu_event(value: f64, at: DateTime<Utc>) -> ThreatEvent {
        ThreatEvent {
            fingerprint: Fingerprint::new("cpu_abuse", "host-a"),
            kind: PatternKind::ResourceAbuse,
            severity: Severity::Medium,
            observed_value: value,
            occurrences: 1,
            timestamp: at,
        }
    }

    fn cpu_clear(value: f64, at: DateTime<Utc>) -> ResolveCandidate {
        ResolveCandidate {
            fingerprint: Fingerprint::new("cpu_abuse", "host-a"),
            observed_value: value,
            timestamp: at,
        }
    }

    #[test]
    fn test_creation() {
        let mut manager = AlertManager::new(test_registry());
        let notification = manager.ingest(cpu_event(85.0, t0()), t0()).unwrap();

        assert_eq!(notification.event, AlertEventType::Created);
        let alert = &notification.alert;
        assert_eq!(alert.status, AlertStatus::Open);
        assert_eq!(alert.severity, Severity::Medium);
        assert_eq!(alert.occurrence_count, 1);
        assert_eq!(alert.escalation_deadline, t0() + Duration::seconds(300));
        assert_eq!(manager.active_count(), 1);
    }

    #[test]
    fn test_dedup_within_tick() {
        let mut manager = AlertManager::new(test_registry());
        let mut created = 0;
        for i in 0..4 {
            let at = t0() + Duration::seconds(i);
            if manager.ingest(cpu_event(85.0 + i as f64, at), t0()).is_some() {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(manager.active_count(), 1);

        let alert = manager
            .get(&Fingerprint::new("cpu_abuse", "host-a"))
            .unwrap();
        // occurrence count equals the number of events
        assert_eq!(alert.occurrence_count, 4);
        assert_eq!(alert.last_value, 88.0);
        assert_eq!(alert.last_seen, t0() + Duration::seconds(3));
    }

    #[test]
    fn test_windowed_occurrences_seed_count() {
        let mut manager = AlertManager::new(test_registry());
        let event = ThreatEvent {
            fingerprint: Fingerprint::new("brute_force", "host-a"),
            kind: PatternKind::BruteForce,
            severity: Severity::High,
            observed_value: 5.0,
            occurrences: 5,
            timestamp: t0(),
        };
        let notification = manager.ingest(event, t0()).unwrap();
        assert_eq!(notification.alert.occurrence_count, 5);

        // the sixth attempt fires again with the new window count
        let event = ThreatEvent {
            fingerprint: Fingerprint::new("brute_force", "host-a"),
            kind: PatternKind::BruteForce,
            severity: Severity::High,
            observed_value: 6.0,
            occurrences: 6,
            timestamp: t0() + Duration::seconds(30),
        };
        assert!(manager.ingest(event, t0()).is_none());
        let alert = manager
            .get(&Fingerprint::new("brute_force", "host-a"))
            .unwrap();
        assert_eq!(alert.occurrence_count, 6);
    }

    #[test]
    fn test_severity_is_monotonic_while_active() {
        let mut manager = AlertManager::new(test_registry());
        manager.ingest(cpu_event(85.0, t0()), t0());

        let mut high = cpu_event(99.0, t0() + Duration::seconds(5));
        high.severity = Severity::High;
        manager.ingest(high, t0());

        let mut medium = cpu_event(82.0, t0() + Duration::seconds(10));
        medium.severity = Severity::Medium;
        manager.ingest(medium, t0());

        let alert = manager
            .get(&Fingerprint::new("cpu_abuse", "host-a"))
            .unwrap();
        assert_eq!(alert.severity, Severity::High);
    }

    #[test]
    fn test_escalation_fires_exactly_once() {
        let mut manager = AlertManager::new(test_registry());
        manager.ingest(cpu_event(85.0, t0()), t0());

        // before the deadline: nothing
        assert!(manager
            .check_escalations(t0() + Duration::seconds(299))
            .is_empty());

        let notifications = manager.check_escalations(t0() + Duration::seconds(301));
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].event, AlertEventType::Escalated);
        assert_eq!(notifications[0].alert.status, AlertStatus::Escalated);

        // idempotent on the next tick
        assert!(manager
            .check_escalations(t0() + Duration::seconds(306))
            .is_empty());
    }

    #[test]
    fn test_acknowledgement_suppresses_escalation() {
        let mut manager = AlertManager::new(test_registry());
        manager.ingest(cpu_event(85.0, t0()), t0());

        let fp = Fingerprint::new("cpu_abuse", "host-a");
        let notification = manager.acknowledge(&fp, "operator", t0()).unwrap();
        assert_eq!(notification.event, AlertEventType::Acknowledged);
        assert_eq!(notification.alert.acknowledged_by.as_deref(), Some("operator"));

        assert!(manager
            .check_escalations(t0() + Duration::seconds(600))
            .is_empty());
        assert_eq!(manager.get(&fp).unwrap().status, AlertStatus::Acknowledged);
    }

    #[test]
    fn test_acknowledge_requires_open() {
        let mut manager = AlertManager::new(test_registry());
        manager.ingest(cpu_event(85.0, t0()), t0());
        manager.check_escalations(t0() + Duration::seconds(600));

        let fp = Fingerprint::new("cpu_abuse", "host-a");
        assert!(matches!(
            manager.acknowledge(&fp, "operator", t0()),
            Err(AlertError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_acknowledge_unknown_fingerprint() {
        let mut manager = AlertManager::new(test_registry());
        let fp = Fingerprint::new("cpu_abuse", "nowhere");
        assert!(matches!(
            manager.acknowledge(&fp, "operator", t0()),
            Err(AlertError::NotFound(_))
        ));
    }

    #[test]
    fn test_auto_resolve_after_streak() {
        let mut manager = AlertManager::new(test_registry());
        manager.ingest(cpu_event(85.0, t0()), t0());

        let first = manager.observe_clear(&cpu_clear(65.0, t0() + Duration::seconds(5)), t0());
        assert!(first.is_none());

        let second = manager
            .observe_clear(&cpu_clear(60.0, t0() + Duration::seconds(10)), t0())
            .unwrap();
        assert_eq!(second.event, AlertEventType::Resolved);
        assert_eq!(second.alert.resolved_by.as_deref(), Some("system_auto_resolve"));
        assert_eq!(
            second.alert.resolution_notes.as_deref(),
            Some("Resource usage normalized")
        );
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn test_breach_resets_resolve_streak() {
        let mut manager = AlertManager::new(test_registry());
        manager.ingest(cpu_event(85.0, t0()), t0());

        manager.observe_clear(&cpu_clear(65.0, t0() + Duration::seconds(5)), t0());
        // intervening breach: streak back to zero
        manager.ingest(cpu_event(90.0, t0() + Duration::seconds(10)), t0());

        assert!(manager
            .observe_clear(&cpu_clear(64.0, t0() + Duration::seconds(15)), t0())
            .is_none());
        let resolved = manager
            .observe_clear(&cpu_clear(63.0, t0() + Duration::seconds(20)), t0());
        assert!(resolved.is_some());
    }

    #[test]
    fn test_non_auto_resolve_patterns_never_auto_resolve() {
        let mut manager = AlertManager::new(test_registry());
        let event = ThreatEvent {
            fingerprint: Fingerprint::new("brute_force", "host-a"),
            kind: PatternKind::BruteForce,
            severity: Severity::High,
            observed_value: 5.0,
            occurrences: 5,
            timestamp: t0(),
        };
        manager.ingest(event, t0());

        for i in 0..10 {
            let candidate = ResolveCandidate {
                fingerprint: Fingerprint::new("brute_force", "host-a"),
                observed_value: 0.0,
                timestamp: t0() + Duration::seconds(i),
            };
            assert!(manager.observe_clear(&candidate, t0()).is_none());
        }
        assert_eq!(manager.active_count(), 1);
    }

    #[test]
    fn test_resolution_is_terminal_new_alert_gets_new_id() {
        let mut manager = AlertManager::new(test_registry());
        let first = manager.ingest(cpu_event(85.0, t0()), t0()).unwrap();
        let fp = Fingerprint::new("cpu_abuse", "host-a");

        manager
            .resolve(&fp, "operator", Some("patched".to_string()), t0())
            .unwrap();
        assert_eq!(manager.active_count(), 0);

        let second = manager
            .ingest(cpu_event(95.0, t0() + Duration::seconds(60)), t0())
            .unwrap();
        assert_eq!(second.event, AlertEventType::Created);
        assert_ne!(second.alert.id, first.alert.id);

        // the resolved alert stays in history, untouched
        let snapshot = manager.snapshot(t0() + Duration::seconds(61));
        assert_eq!(snapshot.resolved.len(), 1);
        assert_eq!(snapshot.resolved[0].id, first.alert.id);
        assert_eq!(snapshot.resolved[0].status, AlertStatus::Resolved);
    }

    #[test]
    fn test_resolve_from_escalated() {
        let mut manager = AlertManager::new(test_registry());
        manager.ingest(cpu_event(85.0, t0()), t0());
        manager.check_escalations(t0() + Duration::seconds(600));

        let fp = Fingerprint::new("cpu_abuse", "host-a");
        let notification = manager
            .resolve(&fp, "operator", None, t0() + Duration::seconds(700))
            .unwrap();
        assert_eq!(notification.alert.status, AlertStatus::Resolved);
    }

    #[test]
    fn test_snapshot_ordering() {
        let mut manager = AlertManager::new(test_registry());

        let mut brute = ThreatEvent {
            fingerprint: Fingerprint::new("brute_force", "host-b"),
            kind: PatternKind::BruteForce,
            severity: Severity::High,
            observed_value: 5.0,
            occurrences: 5,
            timestamp: t0(),
        };
        manager.ingest(brute.clone(), t0());

        manager.ingest(cpu_event(85.0, t0() + Duration::seconds(30)), t0());

        brute.fingerprint = Fingerprint::new("brute_force", "host-c");
        brute.timestamp = t0() + Duration::seconds(60);
        manager.ingest(brute, t0());

        let snapshot = manager.snapshot(t0() + Duration::seconds(61));
        let order: Vec<_> = snapshot
            .active
            .iter()
            .map(|a| a.fingerprint.source_id.clone())
            .collect();
        // high severity first; among equals, most recently seen first
        assert_eq!(order, vec!["host-c", "host-b", "host-a"]);
    }
}
