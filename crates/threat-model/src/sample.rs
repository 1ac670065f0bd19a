//! Metric samples and ingestion validation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Metric kinds reported by the external collectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// CPU usage (%)
    CpuUsage,
    /// Memory usage (%)
    MemoryUsage,
    /// Disk usage (%)
    DiskUsage,
    /// Total open network connections
    NetworkConnections,
    /// Listening ports observed on the host
    ListeningPorts,
    /// Failed login attempts reported by the auth log collector
    FailedLogin,
    /// Total running processes
    ProcessCount,
}

impl MetricKind {
    /// Stable name used in configs and log lines
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::CpuUsage => "cpu_usage",
            MetricKind::MemoryUsage => "memory_usage",
            MetricKind::DiskUsage => "disk_usage",
            MetricKind::NetworkConnections => "network_connections",
            MetricKind::ListeningPorts => "listening_ports",
            MetricKind::FailedLogin => "failed_login",
            MetricKind::ProcessCount => "process_count",
        }
    }

    /// Valid value range for this metric
    pub fn valid_range(&self) -> (f64, f64) {
        match self {
            MetricKind::CpuUsage | MetricKind::MemoryUsage | MetricKind::DiskUsage => (0.0, 100.0),
            MetricKind::NetworkConnections
            | MetricKind::ListeningPorts
            | MetricKind::FailedLogin
            | MetricKind::ProcessCount => (0.0, 1_000_000.0),
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors during sample validation
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    /// Sample arrived without a source id
    #[error("sample is missing a source id")]
    MissingSource,

    /// Value is NaN or infinite
    #[error("{kind} value {value} is not a finite number")]
    NonFinite { kind: MetricKind, value: f64 },

    /// Value out of allowed range
    #[error("{kind} value {value} is out of range [{min}, {max}]")]
    OutOfRange {
        kind: MetricKind,
        value: f64,
        min: f64,
        max: f64,
    },
}

/// A single timestamped metric reading for one source
///
/// Produced externally, immutable once created. `source_id` identifies the
/// monitored subject: a host, an IP, a user account, or a process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    pub source_id: String,
    pub kind: MetricKind,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl MetricSample {
    pub fn new(
        source_id: impl Into<String>,
        kind: MetricKind,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            kind,
            value,
            timestamp,
        }
    }

    /// Reject malformed samples before they reach the detector
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.source_id.is_empty() {
            return Err(ValidationError::MissingSource);
        }
        if !self.value.is_finite() {
            return Err(ValidationError::NonFinite {
                kind: self.kind,
                value: self.value,
            });
        }
        let (min, max) = self.kind.valid_range();
        if self.value < min || self.value > max {
            return Err(ValidationError::OutOfRange {
                kind: self.kind,
                value: self.value,
                min,
                max,
            });
        }
        Ok(())
    }
}
