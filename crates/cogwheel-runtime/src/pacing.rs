//! Cadence pacing and tick statistics.
//!
//! Every command runs `execute` at most once per control period.  After a
//! step that took `elapsed`, the next step is due `max(0, period - elapsed)`
//! later: a slow step shortens the following wait and an overrun removes it,
//! but waits never stack up.
//!
//! [`CycleStats`] tracks how long each scheduler tick took and how often a
//! tick overran the period.  Overruns are counted, never punished.

use std::time::{Duration, Instant};

use serde::Serialize;

/// Delay before the next cycle given how long the current one took.
///
/// ```
/// use std::time::Duration;
/// use cogwheel_runtime::pacing::pace_delay;
///
/// let period = Duration::from_millis(20);
/// assert_eq!(pace_delay(period, Duration::from_millis(5)), Duration::from_millis(15));
/// assert_eq!(pace_delay(period, Duration::from_millis(30)), Duration::ZERO);
/// ```
pub fn pace_delay(period: Duration, elapsed: Duration) -> Duration {
    period.saturating_sub(elapsed)
}

// ────────────────────────────────────────────────────────────────────────────
// Cadence
// ────────────────────────────────────────────────────────────────────────────

/// Per-command snapshot of the current cycle.
#[derive(Debug, Clone, Default)]
pub struct Cadence {
    cycle_start: Option<Instant>,
    next_due: Option<Instant>,
    last_elapsed: Duration,
}

impl Cadence {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` when the next `execute` step may run at `now`.
    ///
    /// `tolerance` absorbs driver jitter so a tick arriving slightly early
    /// does not skip a whole period.
    pub fn is_due(&self, now: Instant, tolerance: Duration) -> bool {
        match self.next_due {
            None => true,
            Some(due) => now + tolerance >= due,
        }
    }

    /// Mark the start of an `execute` step.
    pub fn begin(&mut self, now: Instant) {
        self.cycle_start = Some(now);
    }

    /// Mark the end of an `execute` step and schedule the next one.
    pub fn finish(&mut self, now: Instant, period: Duration) {
        let started = self.cycle_start.unwrap_or(now);
        self.last_elapsed = now.saturating_duration_since(started);
        self.next_due = Some(now + pace_delay(period, self.last_elapsed));
    }

    /// Start time of the most recent step.
    pub fn cycle_start(&self) -> Option<Instant> {
        self.cycle_start
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.next_due
    }

    /// Duration of the most recent `execute` step.
    pub fn last_elapsed(&self) -> Duration {
        self.last_elapsed
    }

    /// Forget the previous cycle; the next step is due immediately.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

// ────────────────────────────────────────────────────────────────────────────
// CycleStats
// ────────────────────────────────────────────────────────────────────────────

/// Running statistics over scheduler ticks.  O(1) per record.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleStats {
    /// Total ticks recorded.
    pub ticks: u64,
    /// Duration of the last tick.
    pub last: Duration,
    /// Shortest tick, `None` before the first record.
    pub min: Option<Duration>,
    /// Longest tick.
    pub max: Duration,
    /// Sum of all tick durations.
    pub total: Duration,
    /// Ticks that took longer than the period.
    pub overruns: u64,
}

impl CycleStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one tick that took `elapsed` against a `period` budget.
    pub fn record(&mut self, elapsed: Duration, period: Duration) {
        self.ticks += 1;
        self.last = elapsed;
        self.min = Some(self.min.map_or(elapsed, |m| m.min(elapsed)));
        self.max = self.max.max(elapsed);
        self.total += elapsed;
        if elapsed > period {
            self.overruns += 1;
        }
    }

    /// Mean tick duration, zero before the first record.
    pub fn average(&self) -> Duration {
        if self.ticks == 0 {
            return Duration::ZERO;
        }
        let nanos = self.total.as_nanos() / u128::from(self.ticks);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}
