//! Engine composition: detector, alert manager, and notification fan-out

use alerting::{AlertError, AlertManager, AlertSnapshot};
use chrono::{DateTime, Utc};
use dispatch::Dispatcher;
use rule_registry::RuleRegistry;
use std::sync::Arc;
use threat_detector::ThreatDetector;
use threat_model::{AlertNotification, Fingerprint, MetricSample};
use tokio::sync::{broadcast, oneshot, watch};
use tracing::debug;

/// Lifecycle actions applied between ticks
pub enum EngineCommand {
    Acknowledge {
        fingerprint: Fingerprint,
        user: String,
        reply: oneshot::Sender<Result<(), AlertError>>,
    },
    Resolve {
        fingerprint: Fingerprint,
        user: String,
        notes: Option<String>,
        reply: oneshot::Sender<Result<(), AlertError>>,
    },
}

/// Counts from one evaluation pass
#[derive(Debug, Clone, Copy)]
pub struct TickSummary {
    pub samples: usize,
    pub events: usize,
    pub transitions: usize,
}

/// One evaluation pipeline: samples in, alert state changes out
///
/// All state mutation happens through [`MonitorEngine::tick`] and
/// [`MonitorEngine::apply_command`] on a single task; readers only ever see
/// the snapshot published at the end of each pass.
pub struct MonitorEngine {
    registry: Arc<RuleRegistry>,
    detector: ThreatDetector,
    manager: AlertManager,
    dispatcher: Dispatcher,
    notifications: broadcast::Sender<AlertNotification>,
    snapshots: watch::Sender<Arc<AlertSnapshot>>,
}

impl MonitorEngine {
    pub fn new(
        registry: Arc<RuleRegistry>,
        dispatcher: Dispatcher,
        notifications: broadcast::Sender<AlertNotification>,
        snapshots: watch::Sender<Arc<AlertSnapshot>>,
    ) -> Self {
        Self {
            detector: ThreatDetector::new(Arc::clone(&registry)),
            manager: AlertManager::new(Arc::clone(&registry)),
            registry,
            dispatcher,
            notifications,
            snapshots,
        }
    }

    /// Swap in a freshly loaded rule snapshot; takes effect next tick
    pub fn set_registry(&mut self, registry: Arc<RuleRegistry>) {
        self.detector.set_registry(Arc::clone(&registry));
        self.manager.set_registry(Arc::clone(&registry));
        self.registry = registry;
    }

    /// Run one evaluation pass over a batch of samples
    ///
    /// Detection, lifecycle updates, escalation checks, notification fan-out
    /// and snapshot publication happen as one unit of work; two ticks never
    /// interleave on the same fingerprint.
    pub fn tick(&mut self, samples: Vec<MetricSample>, now: DateTime<Utc>) -> TickSummary {
        let detection = self.detector.evaluate_batch(&samples);
        let event_count = detection.events.len();

        let mut notifications = Vec::new();
        for event in detection.events {
            if let Some(notification) = self.manager.ingest(event, now) {
                notifications.push(notification);
            }
        }
        for candidate in &detection.clears {
            if let Some(notification) = self.manager.observe_clear(candidate, now) {
                notifications.push(notification);
            }
        }
        notifications.extend(self.manager.check_escalations(now));

        for notification in &notifications {
            self.publish(notification);
        }
        self.publish_snapshot(now);

        TickSummary {
            samples: samples.len(),
            events: event_count,
            transitions: notifications.len(),
        }
    }

    /// Apply an operator action, then publish the updated snapshot
    pub fn apply_command(&mut self, command: EngineCommand, now: DateTime<Utc>) {
        match command {
            EngineCommand::Acknowledge {
                fingerprint,
                user,
                reply,
            } => {
                let result = self.manager.acknowledge(&fingerprint, &user, now);
                let _ = reply.send(self.finish_action(result, now));
            }
            EngineCommand::Resolve {
                fingerprint,
                user,
                notes,
                reply,
            } => {
                let result = self.manager.resolve(&fingerprint, &user, notes, now);
                let _ = reply.send(self.finish_action(result, now));
            }
        }
    }

    fn finish_action(
        &mut self,
        result: Result<AlertNotification, AlertError>,
        now: DateTime<Utc>,
    ) -> Result<(), AlertError> {
        let notification = result?;
        self.publish(&notification);
        self.publish_snapshot(now);
        Ok(())
    }

    /// Push a transition to the live feed and the pattern's channels
    ///
    /// Both paths are best-effort: a full broadcast queue or a failing
    /// channel never rolls the transition back.
    fn publish(&self, notification: &AlertNotification) {
        let _ = self.notifications.send(notification.clone());

        let channels = self
            .registry
            .pattern(&notification.alert.fingerprint.pattern_id)
            .map(|p| p.notification_channels.clone())
            .unwrap_or_else(|| vec!["dashboard".to_string()]);
        let delivered =
            self.dispatcher
                .dispatch(&channels, &notification.alert, notification.event);
        debug!(
            "Dispatched {} for {} to {}/{} channels",
            notification.event,
            notification.alert.fingerprint,
            delivered,
            channels.len()
        );
    }

    fn publish_snapshot(&self, now: DateTime<Utc>) {
        self.snapshots
            .send_replace(Arc::new(self.manager.snapshot(now)));
    }
}
