//! Round state as reported by the server.
//!
//! The server drives every transition; this module only records what it
//! said and classifies pause messages.
//!
//! ## Phases
//!
//! A round progresses through:
//! 1. **Pause** - crash overlay, then the betting window counting down
//! 2. **Started** - launch acknowledged
//! 3. **InProgress** - multiplier climbing, cash-outs accepted
//! 4. **Crashed** - the rocket flew away; back to **Pause**
//!
//! Before the first status message the phase is **Connecting**.
//!
//! ## Pause stages
//!
//! A pause carries a countdown in seconds. The value alone decides what the
//! client shows (see [`PauseStage::of`]):
//!
//! | countdown          | stage            |
//! |--------------------|------------------|
//! | `10`               | `FlewAway`       |
//! | `(5, 10)`, `> 10`  | `FlewAwayHold`   |
//! | `5`                | `Relaunch`       |
//! | `(0, 5)`           | `BettingWindow`  |
//! | `0` or absent      | `Ready`          |
//!
//! `Relaunch` also opens the betting window.

use skyrocket_types::{RoundPhase, BASE_MULTIPLIER};

/// Countdown at which the crash overlay appears.
pub const FLEW_AWAY_COUNTDOWN: f64 = 10.0;

/// Countdown at which the rocket is parked and betting opens.
pub const RELAUNCH_COUNTDOWN: f64 = 5.0;

const COUNTDOWN_EPSILON: f64 = 1e-6;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PauseStage {
    FlewAway,
    FlewAwayHold,
    Relaunch,
    BettingWindow,
    Ready,
}

impl PauseStage {
    pub fn of(countdown: f64) -> Self {
        if (countdown - FLEW_AWAY_COUNTDOWN).abs() < COUNTDOWN_EPSILON {
            PauseStage::FlewAway
        } else if (countdown - RELAUNCH_COUNTDOWN).abs() < COUNTDOWN_EPSILON {
            PauseStage::Relaunch
        } else if countdown > RELAUNCH_COUNTDOWN {
            PauseStage::FlewAwayHold
        } else if countdown > 0.0 {
            PauseStage::BettingWindow
        } else {
            PauseStage::Ready
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RoundState {
    pub phase: RoundPhase,
    pub multiplier: f64,
    /// Frozen at the crash value until the next launch.
    pub crashed_multiplier: Option<f64>,
    pub countdown: f64,
    /// Server tick counter, the cash-out reference.
    pub elapsed_ticks: u64,
    /// A `started` (or mid-round join) was seen for the current round.
    pub round_started: bool,
    /// Rounds observed by this session.
    pub round_counter: u64,
}

impl Default for RoundState {
    fn default() -> Self {
        Self {
            phase: RoundPhase::Connecting,
            multiplier: BASE_MULTIPLIER,
            crashed_multiplier: None,
            countdown: 0.0,
            elapsed_ticks: 0,
            round_started: false,
            round_counter: 0,
        }
    }
}

impl RoundState {
    pub fn enter_pause(&mut self, countdown: f64) -> PauseStage {
        self.phase = RoundPhase::Pause;
        self.multiplier = BASE_MULTIPLIER;
        self.elapsed_ticks = 0;
        self.round_started = false;
        self.countdown = countdown.max(0.0);
        PauseStage::of(self.countdown)
    }

    pub fn enter_started(&mut self, h: Option<u64>) {
        self.phase = RoundPhase::Started;
        self.multiplier = BASE_MULTIPLIER;
        self.elapsed_ticks = h.unwrap_or(0);
        self.round_started = true;
        self.crashed_multiplier = None;
        self.countdown = 0.0;
        self.round_counter += 1;
    }

    /// Join a round already in flight.
    pub fn join(&mut self, k: f64, h: Option<u64>) {
        self.enter_started(h);
        self.progress(k, h);
    }

    pub fn progress(&mut self, k: f64, h: Option<u64>) {
        self.phase = RoundPhase::InProgress;
        self.multiplier = k.max(BASE_MULTIPLIER);
        if let Some(h) = h {
            self.elapsed_ticks = h;
        }
    }

    /// Record the crash and return the final multiplier.
    pub fn crash(&mut self, k: Option<f64>) -> f64 {
        let k = k.unwrap_or(self.multiplier).max(BASE_MULTIPLIER);
        self.phase = RoundPhase::Crashed;
        self.multiplier = k;
        self.crashed_multiplier = Some(k);
        self.round_started = false;
        k
    }

    /// Back to the pre-connection state, keeping the round counter.
    pub fn reset(&mut self) {
        *self = Self {
            round_counter: self.round_counter,
            ..Self::default()
        };
    }
}
