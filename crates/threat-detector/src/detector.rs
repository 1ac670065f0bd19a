//! Sample evaluation against the rule registry

use crate::window::SampleWindow;
use rule_registry::{RuleRegistry, ThreatPattern};
use std::collections::HashMap;
use std::sync::Arc;
use threat_model::{
    Fingerprint, MetricSample, ResolveCandidate, ThreatEvent, ValidationError,
};
use tracing::{debug, warn};

/// Output of one evaluation pass
#[derive(Debug, Default)]
pub struct Detection {
    /// Pattern matches, at most one per matching pattern per sample
    pub events: Vec<ThreatEvent>,
    /// Cleared threshold conditions, feed the auto-resolve streak
    pub clears: Vec<ResolveCandidate>,
}

impl Detection {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.clears.is_empty()
    }

    fn merge(&mut self, other: Detection) {
        self.events.extend(other.events);
        self.clears.extend(other.clears);
    }
}

/// Per-fingerprint evaluation state
#[derive(Debug)]
enum PatternState {
    /// Threshold patterns latch on breach; the latch keeps clear signals
    /// flowing until a new breach re-arms the condition.
    Threshold { latched: bool, last_value: f64 },
    /// Windowed patterns track qualifying sample timestamps
    Window(SampleWindow),
}

fn fresh_state(pattern: &ThreatPattern) -> PatternState {
    if pattern.kind.is_windowed() {
        PatternState::Window(SampleWindow::new(pattern.time_window))
    } else {
        PatternState::Threshold {
            latched: false,
            last_value: 0.0,
        }
    }
}

/// Stateful per-fingerprint evaluator
///
/// Pattern evaluation is order-independent: patterns share no mutable state
/// beyond their own fingerprint counters.
pub struct ThreatDetector {
    registry: Arc<RuleRegistry>,
    states: HashMap<Fingerprint, PatternState>,
}

impl ThreatDetector {
    pub fn new(registry: Arc<RuleRegistry>) -> Self {
        Self {
            registry,
            states: HashMap::new(),
        }
    }

    /// Swap in a new registry snapshot; state for vanished patterns is dropped
    pub fn set_registry(&mut self, registry: Arc<RuleRegistry>) {
        self.states
            .retain(|fingerprint, _| registry.contains(&fingerprint.pattern_id));
        self.registry = registry;
    }

    /// Evaluate one sample against every pattern watching its metric kind
    ///
    /// Samples with no matching pattern produce nothing; malformed samples
    /// are rejected without touching any state.
    pub fn evaluate(&mut self, sample: &MetricSample) -> Result<Detection, ValidationError> {
        sample.validate()?;

        let registry = Arc::clone(&self.registry);
        let mut detection = Detection::default();
        for pattern in registry.patterns_for(sample.kind) {
            self.evaluate_pattern(pattern, sample, &mut detection);
        }
        Ok(detection)
    }

    /// Evaluate a batch, isolating per-sample failures
    ///
    /// One malformed sample never aborts evaluation of the others.
    pub fn evaluate_batch(&mut self, samples: &[MetricSample]) -> Detection {
        let mut detection = Detection::default();
        for sample in samples {
            match self.evaluate(sample) {
                Ok(result) => detection.merge(result),
                Err(e) => warn!("Skipping invalid sample from '{}': {}", sample.source_id, e),
            }
        }
        detection
    }

    /// Last known value for a threshold fingerprint, if any
    pub fn last_observed(&self, fingerprint: &Fingerprint) -> Option<f64> {
        match self.states.get(fingerprint)? {
            PatternState::Threshold { last_value, .. } => Some(*last_value),
            PatternState::Window(window) => Some(window.len() as f64),
        }
    }

    fn evaluate_pattern(
        &mut self,
        pattern: &ThreatPattern,
        sample: &MetricSample,
        detection: &mut Detection,
    ) {
        let fingerprint = pattern.fingerprint(&sample.source_id);
        let state = self
            .states
            .entry(fingerprint.clone())
            .or_insert_with(|| fresh_state(pattern));

        // A reload may repurpose a pattern id across kinds
        let windowed = pattern.kind.is_windowed();
        if windowed != matches!(state, PatternState::Window(_)) {
            *state = fresh_state(pattern);
        }

        match state {
            PatternState::Threshold { latched, last_value } => {
                *last_value = sample.value;
                if sample.value >= pattern.threshold {
                    *latched = true;
                    detection.events.push(ThreatEvent {
                        fingerprint,
                        kind: pattern.kind,
                        severity: pattern.severity,
                        observed_value: sample.value,
                        occurrences: 1,
                        timestamp: sample.timestamp,
                    });
                } else if *latched && sample.value < pattern.resolve_threshold {
                    detection.clears.push(ResolveCandidate {
                        fingerprint,
                        observed_value: sample.value,
                        timestamp: sample.timestamp,
                    });
                }
                // values inside the hysteresis band emit nothing
            }
            PatternState::Window(window) => {
                if sample.value <= 0.0 {
                    return;
                }
                match window.observe(sample.timestamp) {
                    Some(count) if count >= pattern.threshold as usize => {
                        detection.events.push(ThreatEvent {
                            fingerprint,
                            kind: pattern.kind,
                            severity: pattern.severity,
                            observed_value: count as f64,
                            occurrences: count as u64,
                            timestamp: sample.timestamp,
                        });
                    }
                    Some(_) => {}
                    None => {
                        debug!(
                            "Dropping late sample for {} at {}",
                            fingerprint, sample.timestamp
                        );
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use proptest::prelude::*;
    use rule_registry::AlertThresholds;
    use threat_model::{MetricKind, PatternKind, Severity};

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap()
    }

    fn test_thresholds() -> AlertThresholds {
        AlertThresholds {
            cpu_usage: 75.0,
            memory_usage: 85.0,
            disk_usage: 90.0,
            network_connections: 1000.0,
            failed_login_attempts: 5.0,
        }
    }

    /// CPU threshold 80 with clear line 70, brute force 5-in-10m
    fn test_registry() -> Arc<RuleRegistry> {
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
        Arc::new(RuleRegistry::new(test_thresholds(), patterns).unwrap())
    }

    fn cpu(value: f64, offset_secs: i64) -> MetricSample {
        MetricSample::new(
            "host-a",
            MetricKind::CpuUsage,
            value,
            base_time() + Duration::seconds(offset_secs),
        )
    }

    fn login(offset_secs: i64) -> MetricSample {
        MetricSample::new(
            "host-a",
            MetricKind::FailedLogin,
            1.0,
            base_time() + Duration::seconds(offset_secs),
        )
    }

    #[test]
    fn test_breach_emits_event() {
        let mut detector = ThreatDetector::new(test_registry());
        let detection = detector.evaluate(&cpu(85.0, 0)).unwrap();
        assert_eq!(detection.events.len(), 1);

        let event = &detection.events[0];
        assert_eq!(event.fingerprint, Fingerprint::new("cpu_abuse", "host-a"));
        assert_eq!(event.severity, Severity::Medium);
        assert_eq!(event.occurrences, 1);
        assert_eq!(event.observed_value, 85.0);
    }

    #[test]
    fn test_below_threshold_is_silent() {
        let mut detector = ThreatDetector::new(test_registry());
        for (i, value) in [10.0, 50.0, 79.9].iter().enumerate() {
            let detection = detector.evaluate(&cpu(*value, i as i64 * 5)).unwrap();
            assert!(detection.is_empty());
        }
    }

    #[test]
    fn test_hysteresis_band_neither_fires_nor_clears() {
        let mut detector = ThreatDetector::new(test_registry());
        detector.evaluate(&cpu(85.0, 0)).unwrap();

        // 72 sits between the clear line (70) and the threshold (80)
        let detection = detector.evaluate(&cpu(72.0, 5)).unwrap();
        assert!(detection.events.is_empty());
        assert!(detection.clears.is_empty());
    }

    #[test]
    fn test_clear_below_resolve_threshold() {
        let mut detector = ThreatDetector::new(test_registry());
        detector.evaluate(&cpu(85.0, 0)).unwrap();

        let detection = detector.evaluate(&cpu(65.0, 5)).unwrap();
        assert!(detection.events.is_empty());
        assert_eq!(detection.clears.len(), 1);
        assert_eq!(detection.clears[0].observed_value, 65.0);

        // keeps clearing while the condition stays low
        let detection = detector.evaluate(&cpu(60.0, 10)).unwrap();
        assert_eq!(detection.clears.len(), 1);
    }

    #[test]
    fn test_unlatched_condition_never_clears() {
        let mut detector = ThreatDetector::new(test_registry());
        let detection = detector.evaluate(&cpu(10.0, 0)).unwrap();
        assert!(detection.clears.is_empty());
    }

    #[test]
    fn test_window_fires_at_threshold() {
        let mut detector = ThreatDetector::new(test_registry());
        // 5 failed logins spread over 8 minutes
        for i in 0..4 {
            let detection = detector.evaluate(&login(i * 120)).unwrap();
            assert!(detection.events.is_empty(), "fired before threshold");
        }
        let detection = detector.evaluate(&login(480)).unwrap();
        assert_eq!(detection.events.len(), 1);

        let event = &detection.events[0];
        assert_eq!(event.occurrences, 5);
        assert_eq!(event.severity, Severity::High);
    }

    #[test]
    fn test_window_keeps_firing_while_condition_persists() {
        let mut detector = ThreatDetector::new(test_registry());
        for i in 0..5 {
            detector.evaluate(&login(i * 60)).unwrap();
        }
        // the window is not cleared after firing
        let detection = detector.evaluate(&login(300)).unwrap();
        assert_eq!(detection.events.len(), 1);
        assert_eq!(detection.events[0].occurrences, 6);
    }

    #[test]
    fn test_window_expiry_stops_firing() {
        let mut detector = ThreatDetector::new(test_registry());
        for i in 0..5 {
            detector.evaluate(&login(i * 60)).unwrap();
        }
        // 20 minutes later the burst has aged out; a single new failure
        // is not enough to fire again
        let detection = detector.evaluate(&login(1500)).unwrap();
        assert!(detection.events.is_empty());
    }

    #[test]
    fn test_late_sample_dropped() {
        let mut detector = ThreatDetector::new(test_registry());
        for i in 0..4 {
            detector.evaluate(&login(i * 60)).unwrap();
        }
        // older than the newest entry: dropped, must not fire
        let detection = detector.evaluate(&login(30)).unwrap();
        assert!(detection.events.is_empty());
    }

    #[test]
    fn test_unknown_metric_is_ignored() {
        let mut detector = ThreatDetector::new(test_registry());
        let sample = MetricSample::new("host-a", MetricKind::ProcessCount, 900.0, base_time());
        let detection = detector.evaluate(&sample).unwrap();
        assert!(detection.is_empty());
    }

    #[test]
    fn test_malformed_sample_rejected() {
        let mut detector = ThreatDetector::new(test_registry());
        let sample = MetricSample::new("host-a", MetricKind::CpuUsage, f64::NAN, base_time());
        assert!(detector.evaluate(&sample).is_err());
    }

    #[test]
    fn test_batch_isolates_bad_samples() {
        let mut detector = ThreatDetector::new(test_registry());
        let samples = vec![
            cpu(85.0, 0),
            MetricSample::new("", MetricKind::CpuUsage, 99.0, base_time()),
            MetricSample::new("host-b", MetricKind::CpuUsage, 91.0, base_time()),
        ];
        let detection = detector.evaluate_batch(&samples);
        // the empty-source sample is skipped, the other two still match
        assert_eq!(detection.events.len(), 2);
    }

    #[test]
    fn test_sources_tracked_independently() {
        let mut detector = ThreatDetector::new(test_registry());
        detector.evaluate(&cpu(85.0, 0)).unwrap();

        let other = MetricSample::new("host-b", MetricKind::CpuUsage, 40.0, base_time());
        let detection = detector.evaluate(&other).unwrap();
        assert!(detection.is_empty());

        assert_eq!(
            detector.last_observed(&Fingerprint::new("cpu_abuse", "host-a")),
            Some(85.0)
        );
        assert_eq!(
            detector.last_observed(&Fingerprint::new("cpu_abuse", "host-b")),
            Some(40.0)
        );
    }

    #[test]
    fn test_registry_swap_drops_stale_state() {
        let mut detector = ThreatDetector::new(test_registry());
        detector.evaluate(&cpu(85.0, 0)).unwrap();

        let slim = Arc::new(
            RuleRegistry::new(
                test_thresholds(),
                vec![ThreatPattern {
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
                    notification_channels: vec!["log".to_string()],
                }],
            )
            .unwrap(),
        );
        detector.set_registry(slim);
        assert_eq!(
            detector.last_observed(&Fingerprint::new("cpu_abuse", "host-a")),
            None
        );
    }

    proptest! {
        /// Values strictly below the threshold never produce an event
        #[test]
        fn prop_no_false_positive(values in proptest::collection::vec(0.0f64..79.9, 1..40)) {
            let mut detector = ThreatDetector::new(test_registry());
            for (i, value) in values.iter().enumerate() {
                let detection = detector.evaluate(&cpu(*value, i as i64 * 5)).unwrap();
                prop_assert!(detection.events.is_empty());
            }
        }
    }
}
