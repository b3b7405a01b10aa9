//! Deterministic time and canned server frames for tests.

use crate::scheduler::FRAME_INTERVAL;
use crate::session::GameSession;
use serde_json::Value;
use skyrocket_types::{
    BetError, BetOutcome, BetReply, BetScope, Inbound, SeatId, ServerEvent, StatusUpdate, Wallet,
};
use std::time::{Duration, Instant};

/// A clock that only moves when told to.
#[derive(Clone, Copy, Debug)]
pub struct ManualClock {
    now: Instant,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Instant::now(),
        }
    }

    pub fn now(&self) -> Instant {
        self.now
    }

    pub fn advance(&mut self, by: Duration) -> Instant {
        self.now += by;
        self.now
    }
}

/// Tick `session` at the frame interval for `duration`.
pub fn run_frames(session: &mut GameSession, clock: &mut ManualClock, duration: Duration) {
    let frames = (duration.as_millis() / FRAME_INTERVAL.as_millis()).max(1);
    for _ in 0..frames {
        let now = clock.advance(FRAME_INTERVAL);
        session.tick(now);
    }
}

pub fn pause(countdown: f64) -> Inbound {
    Inbound::event(ServerEvent::Status(StatusUpdate::Pause { countdown }))
}

pub fn started(h: Option<u64>) -> Inbound {
    Inbound::event(ServerEvent::Status(StatusUpdate::Started { h }))
}

pub fn progress(k: f64, h: u64) -> Inbound {
    Inbound::event(ServerEvent::Status(StatusUpdate::Progress {
        k: Some(k),
        h: Some(h),
    }))
}

pub fn crash(k: Option<f64>) -> Inbound {
    Inbound::event(ServerEvent::Status(StatusUpdate::Crash { k }))
}

fn bet(seat: SeatId, outcome: BetOutcome) -> Inbound {
    Inbound::event(ServerEvent::Bet(BetReply {
        index: u64::from(seat.index()),
        outcome,
    }))
}

pub fn bet_placed(seat: SeatId, scope: Option<BetScope>) -> Inbound {
    bet(
        seat,
        BetOutcome::Placed {
            counter: Some(Value::from(1)),
            scope,
        },
    )
}

pub fn bet_cancelled(seat: SeatId) -> Inbound {
    bet(seat, BetOutcome::Cancelled)
}

pub fn bet_cashed_out(seat: SeatId, win: Option<f64>) -> Inbound {
    bet(seat, BetOutcome::CashedOut { payout: win })
}

pub fn bet_rejected(seat: SeatId, error: &str) -> Inbound {
    bet(seat, BetOutcome::Rejected(BetError::classify(error)))
}

/// Attach a wallet to any frame.
pub fn with_wallet(mut inbound: Inbound, balance: f64, currency: &str) -> Inbound {
    inbound.wallet = Some(Wallet {
        balance: Some(balance),
        currency: Some(currency.to_string()),
    });
    inbound
}
