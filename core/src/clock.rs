//! Save timestamps.
//!
//! Each save is keyed by a human-readable local timestamp. The clock is
//! injected so tests and tooling can produce deterministic keys.

use chrono::{Duration, Local, NaiveDateTime};
use std::cell::Cell;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub trait SaveClock {
    /// Timestamp for the save being written now.
    fn now(&self) -> String;
}

/// Local wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SaveClock for SystemClock {
    fn now(&self) -> String {
        Local::now().format(TIMESTAMP_FORMAT).to_string()
    }
}

/// Starts at a fixed instant and steps forward on every read.
#[derive(Debug)]
pub struct ManualClock {
    next: Cell<NaiveDateTime>,
    step: Duration,
}

impl ManualClock {
    pub fn new(start: NaiveDateTime, step: Duration) -> Self {
        Self { next: Cell::new(start), step }
    }

    /// 2024-01-01 00:00:00, one second per read.
    pub fn starting_epoch() -> Self {
        let start = NaiveDateTime::parse_from_str("2024-01-01 00:00:00", TIMESTAMP_FORMAT)
            .unwrap_or_default();
        Self::new(start, Duration::seconds(1))
    }
}

impl SaveClock for ManualClock {
    fn now(&self) -> String {
        let current = self.next.get();
        self.next.set(current + self.step);
        current.format(TIMESTAMP_FORMAT).to_string()
    }
}
