//! Local extrapolation of the server's betting-window countdown.
//!
//! There is exactly one timer slot. Every restart or cancellation bumps the
//! generation, and a poll carrying an older generation is ignored, so two
//! countdowns can never run side by side.

use std::time::Instant;

#[derive(Clone, Copy, Debug)]
struct Armed {
    generation: u64,
    from_secs: f64,
    started_at: Instant,
}

#[derive(Clone, Debug, Default)]
pub struct LocalCountdown {
    generation: u64,
    armed: Option<Armed>,
    frozen_at: Option<Instant>,
}

impl LocalCountdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// (Re)start counting down from `seconds` as of `now`, replacing any
    /// running countdown. Returns the new generation.
    pub fn start(&mut self, seconds: f64, now: Instant) -> u64 {
        self.generation += 1;
        self.armed = Some(Armed {
            generation: self.generation,
            from_secs: seconds.max(0.0),
            started_at: now,
        });
        self.generation
    }

    pub fn cancel(&mut self) {
        if self.armed.take().is_some() {
            self.generation += 1;
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Remaining seconds for the countdown armed at `generation`, or `None`
    /// if that countdown has since been replaced or cancelled.
    pub fn poll(&self, generation: u64, now: Instant) -> Option<f64> {
        let armed = self.armed.filter(|armed| armed.generation == generation)?;
        let at = self.frozen_at.unwrap_or(now);
        let elapsed = at.saturating_duration_since(armed.started_at).as_secs_f64();
        Some((armed.from_secs - elapsed).max(0.0))
    }

    /// Remaining seconds for whatever countdown is currently armed.
    pub fn remaining(&self, now: Instant) -> Option<f64> {
        self.poll(self.generation, now)
    }

    /// Hold the displayed value while the view is hidden. The underlying
    /// deadline keeps running; [`LocalCountdown::resume`] jumps to it.
    pub fn freeze(&mut self, now: Instant) {
        self.frozen_at.get_or_insert(now);
    }

    pub fn resume(&mut self) {
        self.frozen_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_extrapolates_from_receive_time() {
        let t0 = Instant::now();
        let mut countdown = LocalCountdown::new();
        countdown.start(4.0, t0);
        let left = countdown.remaining(t0 + Duration::from_millis(1500)).unwrap();
        assert!((left - 2.5).abs() < 1e-9);
        assert_eq!(countdown.remaining(t0 + Duration::from_secs(9)), Some(0.0));
    }

    #[test]
    fn test_stale_generation_is_ignored() {
        let t0 = Instant::now();
        let mut countdown = LocalCountdown::new();
        let first = countdown.start(5.0, t0);
        let second = countdown.start(3.0, t0 + Duration::from_secs(1));
        assert_ne!(first, second);
        assert_eq!(countdown.poll(first, t0 + Duration::from_secs(1)), None);
        assert_eq!(countdown.poll(second, t0 + Duration::from_secs(1)), Some(3.0));

        countdown.cancel();
        assert_eq!(countdown.poll(second, t0 + Duration::from_secs(1)), None);
        assert_eq!(countdown.remaining(t0 + Duration::from_secs(1)), None);
    }

    #[test]
    fn test_freeze_holds_display() {
        let t0 = Instant::now();
        let mut countdown = LocalCountdown::new();
        countdown.start(5.0, t0);
        countdown.freeze(t0 + Duration::from_secs(1));
        assert_eq!(countdown.remaining(t0 + Duration::from_secs(3)), Some(4.0));
        countdown.resume();
        assert_eq!(countdown.remaining(t0 + Duration::from_secs(3)), Some(2.0));
    }
}
