//! Security Monitoring Data Model
//!
//! Shared types flowing through the monitoring pipeline:
//! - Metric samples produced by external collectors
//! - Threat events emitted by the detector
//! - Alerts owned by the alert manager

mod alert;
mod sample;

pub use alert::{
    Alert, AlertEventType, AlertNotification, AlertStatus, Fingerprint, PatternKind,
    ResolveCandidate, Severity, ThreatEvent,
};
pub use sample::{MetricKind, MetricSample, ValidationError};
