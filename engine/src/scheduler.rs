//! Frame timing and resize coalescing.

use crate::trajectory::Bounds;
use std::time::{Duration, Instant};

/// Target frame period for the driver's render interval (~60 Hz).
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Largest step a single frame may integrate.
pub const MAX_FRAME_DT: Duration = Duration::from_millis(100);

/// Quiet period before a burst of resizes is applied.
pub const RESIZE_QUIET_PERIOD: Duration = Duration::from_millis(150);

/// Measures the real time between frames.
///
/// The first frame after construction or [`FrameClock::rebase`] integrates
/// nothing, so time spent hidden or idle is never replayed.
#[derive(Clone, Debug)]
pub struct FrameClock {
    last: Option<Instant>,
    max_dt: Duration,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new(MAX_FRAME_DT)
    }
}

impl FrameClock {
    pub fn new(max_dt: Duration) -> Self {
        Self { last: None, max_dt }
    }

    /// Seconds elapsed since the previous frame, capped at `max_dt`.
    pub fn advance(&mut self, now: Instant) -> f64 {
        let dt = match self.last {
            Some(last) => now.saturating_duration_since(last).min(self.max_dt),
            None => Duration::ZERO,
        };
        self.last = Some(now);
        dt.as_secs_f64()
    }

    /// Forget the previous frame and start measuring from `now`.
    pub fn rebase(&mut self, now: Instant) {
        self.last = Some(now);
    }
}

/// Coalesces bursts of values, releasing only the last one once no new
/// value has arrived for the quiet period.
#[derive(Clone, Debug)]
pub struct Debouncer<T> {
    quiet: Duration,
    pending: Option<(T, Instant)>,
}

/// Debouncer for canvas size changes.
pub type ResizeDebouncer = Debouncer<Bounds>;

impl Default for ResizeDebouncer {
    fn default() -> Self {
        Debouncer::new(RESIZE_QUIET_PERIOD)
    }
}

impl<T> Debouncer<T> {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            pending: None,
        }
    }

    /// Record a new value, restarting the quiet period.
    pub fn push(&mut self, value: T, now: Instant) {
        self.pending = Some((value, now));
    }

    /// Release the latest value if the quiet period has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        let ready = self
            .pending
            .as_ref()
            .is_some_and(|(_, at)| now.saturating_duration_since(*at) >= self.quiet);
        if ready {
            self.pending.take().map(|(value, _)| value)
        } else {
            None
        }
    }
}
