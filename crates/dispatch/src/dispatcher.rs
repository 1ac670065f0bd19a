//! Channel registry and dispatch fan-out

use std::collections::HashMap;
use thiserror::Error;
use threat_model::{Alert, AlertEventType};
use tracing::{debug, info, warn};

/// Notification delivery errors
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// A pattern references a channel nobody registered
    #[error("unknown notification channel `{0}`")]
    UnknownChannel(String),

    /// The channel accepted the payload but could not deliver it
    #[error("delivery via `{channel}` failed: {reason}")]
    Delivery { channel: String, reason: String },
}

/// One delivery target (mail relay, SMS gateway, operational log, ...)
///
/// Implementations own the delivery mechanics; the engine only sees the
/// ack-or-failure result.
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &str;

    fn deliver(&self, alert: &Alert, event: AlertEventType) -> Result<(), DispatchError>;
}

/// Writes transitions to the operational log
pub struct LogChannel;

impl NotificationChannel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    fn deliver(&self, alert: &Alert, event: AlertEventType) -> Result<(), DispatchError> {
        info!(
            target: "security_alerts",
            "[{}] {} {}: {}",
            event, alert.severity, alert.fingerprint, alert.message
        );
        Ok(())
    }
}

/// Placeholder for the dashboard target
///
/// Dashboard delivery rides the live update broadcast; this channel only
/// acknowledges so patterns listing `dashboard` do not log spurious
/// failures.
pub struct DashboardChannel;

impl NotificationChannel for DashboardChannel {
    fn name(&self) -> &str {
        "dashboard"
    }

    fn deliver(&self, alert: &Alert, event: AlertEventType) -> Result<(), DispatchError> {
        debug!("Dashboard notified of {} for {}", event, alert.fingerprint);
        Ok(())
    }
}

/// Registry of named channels with failure-isolating fan-out
pub struct Dispatcher {
    channels: HashMap<String, Box<dyn NotificationChannel>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            channels: HashMap::new(),
        }
    }

    /// Dispatcher with the built-in `log` and `dashboard` channels
    pub fn with_defaults() -> Self {
        let mut dispatcher = Self::new();
        dispatcher.register(Box::new(LogChannel));
        dispatcher.register(Box::new(DashboardChannel));
        dispatcher
    }

    /// Register a channel under its own name, replacing any previous one
    pub fn register(&mut self, channel: Box<dyn NotificationChannel>) {
        let name = channel.name().to_string();
        self.channels.insert(name, channel);
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Deliver a transition to each named channel
    ///
    /// Failures are logged and skipped; returns how many deliveries
    /// succeeded.
    pub fn dispatch(
        &self,
        channel_names: &[String],
        alert: &Alert,
        event: AlertEventType,
    ) -> usize {
        let mut delivered = 0;
        for name in channel_names {
            match self.channels.get(name) {
                Some(channel) => match channel.deliver(alert, event) {
                    Ok(()) => delivered += 1,
                    Err(e) => warn!("Notification dispatch failed: {}", e),
                },
                None => warn!(
                    "Notification dispatch failed: {}",
                    DispatchError::UnknownChannel(name.clone())
                ),
            }
        }
        delivered
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::with_defaults()
    }
}
