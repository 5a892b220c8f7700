//! Throughput counters shared by the receive loop and workers.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct DispatchStats {
    events_consumed: AtomicU64,
    relevant: AtomicU64,
    matches: AtomicU64,
    triggers_fired: AtomicU64,
    errors: AtomicU64,
    reconnects: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub events_consumed: u64,
    pub relevant: u64,
    pub matches: u64,
    pub triggers_fired: u64,
    pub errors: u64,
    pub reconnects: u64,
}

impl DispatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn consumed(&self) {
        self.events_consumed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn relevant(&self) {
        self.relevant.fetch_add(1, Ordering::Relaxed);
    }

    /// A quest's conditions passed.
    pub fn matched(&self) {
        self.matches.fetch_add(1, Ordering::Relaxed);
    }

    /// A quest's commands ran without errors.
    pub fn fired(&self) {
        self.triggers_fired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reconnected(&self) -> u64 {
        self.reconnects.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            events_consumed: self.events_consumed.load(Ordering::Relaxed),
            relevant: self.relevant.load(Ordering::Relaxed),
            matches: self.matches.load(Ordering::Relaxed),
            triggers_fired: self.triggers_fired.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}
