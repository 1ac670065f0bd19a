//! Tick loop, sample ingestion, and the engine handle

use crate::engine::{EngineCommand, MonitorEngine};
use alerting::{AlertError, AlertSnapshot};
use chrono::Utc;
use dispatch::Dispatcher;
use rule_registry::RuleRegistry;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use threat_model::{
    Alert, AlertNotification, AlertStatus, Fingerprint, MetricSample, Severity,
};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Evaluation cadence (default: 5 seconds)
    pub tick_interval: Duration,
    /// Queued samples tolerated between ticks
    pub sample_queue_depth: usize,
    /// Pending operator actions tolerated between ticks
    pub command_queue_depth: usize,
    /// Live-update broadcast buffer; slow subscribers miss events
    pub notification_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(5),
            sample_queue_depth: 1024,
            command_queue_depth: 32,
            notification_capacity: 256,
        }
    }
}

/// External data collector polled once per tick
pub trait Collector: Send {
    fn name(&self) -> &str;

    fn collect(&mut self) -> Vec<MetricSample>;
}

/// Concurrent-safe sample ingestion handle
///
/// Collectors call [`SampleSink::submit`] once per tick per metric; queued
/// samples are evaluated on the next tick. A full queue drops the sample
/// rather than blocking the collector.
#[derive(Clone)]
pub struct SampleSink {
    tx: mpsc::Sender<MetricSample>,
}

impl SampleSink {
    pub fn submit(&self, sample: MetricSample) {
        if self.tx.try_send(sample).is_err() {
            warn!("Sample queue full or closed, dropping sample");
        }
    }
}

/// Errors from operator actions routed through the command queue
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("monitor engine is not running")]
    EngineDown,

    #[error(transparent)]
    Alert(#[from] AlertError),
}

/// Clonable facade over the running engine
///
/// Queries read the immutable snapshot published at the end of each tick;
/// they never block the evaluation loop and never observe a half-updated
/// alert.
#[derive(Clone)]
pub struct MonitorHandle {
    sink: SampleSink,
    commands: mpsc::Sender<EngineCommand>,
    snapshots: watch::Receiver<Arc<AlertSnapshot>>,
    notifications: broadcast::Sender<AlertNotification>,
    registry: Arc<RuleRegistry>,
}

impl MonitorHandle {
    /// Ingestion handle for external collectors
    pub fn sink(&self) -> SampleSink {
        self.sink.clone()
    }

    pub fn submit(&self, sample: MetricSample) {
        self.sink.submit(sample);
    }

    /// Most recently published alert snapshot
    pub fn snapshot(&self) -> Arc<AlertSnapshot> {
        self.snapshots.borrow().clone()
    }

    /// Filtered alert listing in snapshot order
    pub fn alerts(
        &self,
        status: Option<AlertStatus>,
        severity: Option<Severity>,
    ) -> Vec<Alert> {
        let snapshot = self.snapshot();
        snapshot
            .query(status, severity)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Single alert lookup by fingerprint
    pub fn alert(&self, fingerprint: &Fingerprint) -> Option<Alert> {
        self.snapshot().get(fingerprint).cloned()
    }

    /// Subscribe to the best-effort live update feed
    pub fn subscribe(&self) -> broadcast::Receiver<AlertNotification> {
        self.notifications.subscribe()
    }

    pub fn registry(&self) -> &Arc<RuleRegistry> {
        &self.registry
    }

    /// Acknowledge an open alert
    pub async fn acknowledge(
        &self,
        fingerprint: Fingerprint,
        user: impl Into<String>,
    ) -> Result<(), CommandError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(EngineCommand::Acknowledge {
                fingerprint,
                user: user.into(),
                reply,
            })
            .await
            .map_err(|_| CommandError::EngineDown)?;
        rx.await.map_err(|_| CommandError::EngineDown)??;
        Ok(())
    }

    /// Resolve an active alert
    pub async fn resolve(
        &self,
        fingerprint: Fingerprint,
        user: impl Into<String>,
        notes: Option<String>,
    ) -> Result<(), CommandError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(EngineCommand::Resolve {
                fingerprint,
                user: user.into(),
                notes,
                reply,
            })
            .await
            .map_err(|_| CommandError::EngineDown)?;
        rx.await.map_err(|_| CommandError::EngineDown)??;
        Ok(())
    }
}

/// Owns the engine and the periodic evaluation loop
pub struct MonitorScheduler {
    engine: MonitorEngine,
    config: SchedulerConfig,
    samples: mpsc::Receiver<MetricSample>,
    commands: mpsc::Receiver<EngineCommand>,
    collectors: Vec<Box<dyn Collector>>,
}

impl MonitorScheduler {
    /// Build the scheduler and its handle
    pub fn new(
        registry: Arc<RuleRegistry>,
        dispatcher: Dispatcher,
        config: SchedulerConfig,
    ) -> (Self, MonitorHandle) {
        let (sample_tx, sample_rx) = mpsc::channel(config.sample_queue_depth);
        let (command_tx, command_rx) = mpsc::channel(config.command_queue_depth);
        let (notify_tx, _) = broadcast::channel(config.notification_capacity);
        let (snapshot_tx, snapshot_rx) =
            watch::channel(Arc::new(AlertSnapshot::empty(Utc::now())));

        let engine = MonitorEngine::new(
            Arc::clone(&registry),
            dispatcher,
            notify_tx.clone(),
            snapshot_tx,
        );
        let scheduler = Self {
            engine,
            config,
            samples: sample_rx,
            commands: command_rx,
            collectors: Vec::new(),
        };
        let handle = MonitorHandle {
            sink: SampleSink { tx: sample_tx },
            commands: command_tx,
            snapshots: snapshot_rx,
            notifications: notify_tx,
            registry,
        };
        (scheduler, handle)
    }

    /// Register a collector polled once per tick
    pub fn add_collector(&mut self, collector: Box<dyn Collector>) {
        info!("Registered collector '{}'", collector.name());
        self.collectors.push(collector);
    }

    /// Run until shutdown is signalled
    ///
    /// The in-flight tick always completes; no new tick starts after the
    /// signal. In-memory state is discarded on exit and rebuilt from the
    /// rule registry on the next start.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Monitor scheduler started (tick every {:?})",
            self.config.tick_interval
        );
        let mut interval = tokio::time::interval(self.config.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let samples = self.gather_samples();
                    let summary = self.engine.tick(samples, Utc::now());
                    if summary.transitions > 0 {
                        debug!(
                            "Tick: {} samples, {} events, {} transitions",
                            summary.samples, summary.events, summary.transitions
                        );
                    }
                }
                Some(command) = self.commands.recv() => {
                    self.engine.apply_command(command, Utc::now());
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Monitor scheduler stopped");
    }

    fn gather_samples(&mut self) -> Vec<MetricSample> {
        let mut samples = Vec::new();
        for collector in &mut self.collectors {
            samples.extend(collector.collect());
        }
        while let Ok(sample) = self.samples.try_recv() {
            samples.push(sample);
        }
        samples
    }
}
