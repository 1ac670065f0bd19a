//! Alert Manager
//!
//! Owns the alert lifecycle state machine: creation and reinforcement of
//! alerts from threat events (deduplicated by fingerprint), time-based
//! escalation, auto-resolution streaks, and the published alert snapshot.

mod manager;
mod snapshot;

pub use manager::{AlertError, AlertManager};
pub use snapshot::{AlertSnapshot, AlertStats};
