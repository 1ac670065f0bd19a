//! Threat Detection Engine
//!
//! Evaluates incoming metric samples against the rule registry, keeping
//! per-fingerprint state: hysteresis latches for threshold patterns and
//! pruned timestamp windows for windowed-count patterns.

mod detector;
mod window;

pub use detector::{Detection, ThreatDetector};
