//! Bounded ring of operational alerts.
//!
//! Append-only and capacity-bounded: once full, the oldest entry is evicted.
//! The reaper and the stop paths push here; an external admin surface reads.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertKind::Info => write!(f, "info"),
            AlertKind::Warning => write!(f, "warning"),
            AlertKind::Error => write!(f, "error"),
        }
    }
}

/// One operational event.
#[derive(Debug, Clone, Serialize)]
pub struct SystemAlert {
    pub kind: AlertKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Capacity-bounded alert ring.
pub struct AlertRing {
    capacity: usize,
    entries: Mutex<VecDeque<SystemAlert>>,
}

impl AlertRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push(&self, kind: AlertKind, message: impl Into<String>) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.push_back(SystemAlert {
            kind,
            message: message.into(),
            at: Utc::now(),
        });
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    /// The most recent `n` alerts, oldest first.
    pub fn recent(&self, n: usize) -> Vec<SystemAlert> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let skip = entries.len().saturating_sub(n);
        entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_read_back() {
        let ring = AlertRing::new(10);
        assert!(ring.is_empty());
        ring.push(AlertKind::Info, "engine started");
        ring.push(AlertKind::Warning, "something odd");

        let recent = ring.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].kind, AlertKind::Info);
        assert_eq!(recent[1].message, "something odd");
    }

    #[test]
    fn capacity_evicts_oldest() {
        let ring = AlertRing::new(3);
        for i in 0..5 {
            ring.push(AlertKind::Info, format!("alert {i}"));
        }
        assert_eq!(ring.len(), 3);
        let recent = ring.recent(3);
        assert_eq!(recent[0].message, "alert 2");
        assert_eq!(recent[2].message, "alert 4");
    }

    #[test]
    fn recent_caps_at_requested_count() {
        let ring = AlertRing::new(10);
        for i in 0..6 {
            ring.push(AlertKind::Info, format!("alert {i}"));
        }
        let recent = ring.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].message, "alert 4");
        assert_eq!(recent[1].message, "alert 5");
    }
}
