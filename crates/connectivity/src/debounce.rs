//! Debounced all-devices-absent alerting.

use std::time::{Duration, Instant};

/// Default absence threshold before an alert fires.
pub const DEFAULT_ABSENCE_THRESHOLD: Duration = Duration::from_secs(60);

/// Tracks a continuous all-absent interval and fires at most one alert per
/// interval.
///
/// The alert latches after firing: a second alert cannot fire until a
/// presence observation has reset the debouncer.
#[derive(Debug)]
pub struct AbsenceDebouncer {
    threshold: Duration,
    absent_since: Option<Instant>,
    alerted: bool,
}

impl AbsenceDebouncer {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            absent_since: None,
            alerted: false,
        }
    }

    /// Feeds one observation. Returns `Some(elapsed)` exactly when the
    /// alert should fire.
    pub fn observe(&mut self, all_absent: bool, now: Instant) -> Option<Duration> {
        if !all_absent {
            self.absent_since = None;
            self.alerted = false;
            return None;
        }

        let since = *self.absent_since.get_or_insert(now);
        let elapsed = now.duration_since(since);
        if !self.alerted && elapsed >= self.threshold {
            self.alerted = true;
            return Some(elapsed);
        }
        None
    }

    /// Elapsed time of the current absence interval, if any.
    pub fn absent_for(&self, now: Instant) -> Option<Duration> {
        self.absent_since.map(|since| now.duration_since(since))
    }
}

impl Default for AbsenceDebouncer {
    fn default() -> Self {
        Self::new(DEFAULT_ABSENCE_THRESHOLD)
    }
}
