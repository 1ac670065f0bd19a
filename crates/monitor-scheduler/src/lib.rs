//! Monitor Scheduler
//!
//! Drives the evaluation cycle: a periodic tick drains queued samples, polls
//! registered collectors, runs detection and alert lifecycle updates as one
//! logical unit of work, and publishes an immutable alert snapshot.
//! Acknowledge/resolve actions arrive over a command queue consumed between
//! ticks, which keeps every fingerprint under a single writer.

mod engine;
mod scheduler;

pub use engine::{EngineCommand, MonitorEngine, TickSummary};
pub use scheduler::{
    Collector, CommandError, MonitorHandle, MonitorScheduler, SampleSink, SchedulerConfig,
};
