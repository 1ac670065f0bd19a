//! Notification Dispatch
//!
//! Fan-out of alert lifecycle transitions to named notification channels.
//! Delivery is best-effort by contract: a channel failure is logged and
//! never blocks or rolls back the lifecycle transition that triggered it.

mod dispatcher;

pub use dispatcher::{DashboardChannel, DispatchError, Dispatcher, LogChannel, NotificationChannel};
