//! Pruned timestamp window for windowed-count patterns

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

/// Ordered timestamps of qualifying samples within a fixed span
///
/// Entries older than the span (relative to the newest entry) are pruned on
/// every insert. Out-of-order timestamps are rejected: a late sample for a
/// past window is dropped, never retroactively inserted.
#[derive(Debug, Clone)]
pub(crate) struct SampleWindow {
    entries: VecDeque<DateTime<Utc>>,
    span: Duration,
}

impl SampleWindow {
    pub(crate) fn new(span: Duration) -> Self {
        Self {
            entries: VecDeque::new(),
            span,
        }
    }

    /// Record a qualifying sample; returns the in-window count, or `None`
    /// if the timestamp arrived out of order and was dropped.
    pub(crate) fn observe(&mut self, timestamp: DateTime<Utc>) -> Option<usize> {
        if let Some(&newest) = self.entries.back() {
            if timestamp < newest {
                return None;
            }
        }
        self.entries.push_back(timestamp);

        let cutoff = timestamp - self.span;
        while let Some(&oldest) = self.entries.front() {
            if oldest < cutoff {
                self.entries.pop_front();
            } else {
                break;
            }
        }
        Some(self.entries.len())
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
