//! Time sources for cursors and audit stamps.

use chrono::{DateTime, SecondsFormat};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

/// A source of epoch-millisecond timestamps.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Returns a write stamp in epoch milliseconds.
    fn now_millis(&self) -> i64;

    /// Returns a pull cursor in epoch milliseconds.
    ///
    /// Must be at least every stamp already returned by
    /// [`now_millis`](Clock::now_millis) and below every later one.
    fn cursor_millis(&self) -> i64 {
        self.now_millis()
    }
}

/// Wall clock that never repeats or goes backwards.
///
/// Write stamps are strictly increasing, so a write stamped after a pull
/// cursor was issued always sorts after it. Cursor readings never advance
/// past the wall clock or the last stamp.
///
/// A burst of writes can push stamps ahead of wall time. Those stamps are
/// stored with the records, so a restarted server seeds its clock from the
/// largest stored stamp with [`SystemClock::starting_after`].
#[derive(Debug, Default)]
pub struct SystemClock {
    last: AtomicI64,
}

impl SystemClock {
    /// Creates a new system clock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a clock whose readings are never below `millis` and whose
    /// stamps are above it.
    pub fn starting_after(millis: i64) -> Self {
        Self {
            last: AtomicI64::new(millis),
        }
    }
}

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        let wall = chrono::Utc::now().timestamp_millis();
        let next = |prev: i64| wall.max(prev + 1);
        match self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |prev| Some(next(prev)))
        {
            Ok(prev) | Err(prev) => next(prev),
        }
    }

    fn cursor_millis(&self) -> i64 {
        let wall = chrono::Utc::now().timestamp_millis();
        self.last.fetch_max(wall, Ordering::SeqCst).max(wall)
    }
}

/// Manually driven clock for tests and deterministic replays.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Creates a clock reading `now`.
    pub fn new(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    /// Sets the current time.
    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Moves the clock forward by `millis`.
    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Formats epoch milliseconds as ISO-8601 UTC with millisecond precision.
pub fn iso8601(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}
