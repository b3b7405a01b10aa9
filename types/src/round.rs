//! Round-level vocabulary shared by the protocol, the engine and the
//! presentation layer.
//!
//! Multipliers are plain `f64` values. They are always displayed with two
//! decimals and every threshold comparison goes through [`round2`] so that
//! values such as `1.999999` compare equal to a `2.00` threshold.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Lowest multiplier a round can show.
pub const BASE_MULTIPLIER: f64 = 1.0;

/// Lowest auto-cashout threshold accepted from the user.
pub const MIN_AUTO_CASHOUT: f64 = 1.01;

/// Smallest bet amount.
pub const MIN_BET_AMOUNT: f64 = 1.0;

/// Largest bet amount.
pub const MAX_BET_AMOUNT: f64 = 10_000.0;

/// Amount a seat starts with.
pub const DEFAULT_BET_AMOUNT: f64 = 100.0;

/// Round to two decimal places (the display and comparison precision).
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Format a multiplier the way it is shown everywhere, e.g. `2.35x`.
pub fn format_multiplier(value: f64) -> String {
    format!("{value:.2}x")
}

/// Phase of the current round as last reported by the server.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    /// No round message received yet.
    #[default]
    Connecting,
    /// Between rounds: crash overlay, then the betting window.
    Pause,
    /// Launch acknowledged, no multiplier tick yet.
    Started,
    /// Multiplier is climbing.
    InProgress,
    /// The rocket flew away.
    Crashed,
}

impl RoundPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoundPhase::Connecting => "connecting",
            RoundPhase::Pause => "pause",
            RoundPhase::Started => "started",
            RoundPhase::InProgress => "progress",
            RoundPhase::Crashed => "crashed",
        }
    }

    /// Whether the rocket is (or is about to be) in the air.
    pub fn is_flying(&self) -> bool {
        matches!(self, RoundPhase::Started | RoundPhase::InProgress)
    }
}

impl fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the fixed bet slots a client controls.
///
/// Seats are numbered from 1 for display; the wire protocol uses the
/// 0-based [`SeatId::index`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct SeatId(u8);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("no seat numbered {0}")]
pub struct InvalidSeat(pub u8);

impl TryFrom<u8> for SeatId {
    type Error = InvalidSeat;

    fn try_from(number: u8) -> Result<Self, Self::Error> {
        Self::from_number(number).ok_or(InvalidSeat(number))
    }
}

impl From<SeatId> for u8 {
    fn from(seat: SeatId) -> u8 {
        seat.0
    }
}

impl SeatId {
    pub const FIRST: SeatId = SeatId(1);
    pub const SECOND: SeatId = SeatId(2);

    /// Every seat, in display order.
    pub const ALL: [SeatId; 2] = [SeatId::FIRST, SeatId::SECOND];

    /// Seat for a 0-based wire index.
    pub fn from_index(index: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|seat| u64::from(seat.index()) == index)
    }

    /// Seat for a 1-based display number.
    pub fn from_number(number: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|seat| seat.0 == number)
    }

    /// 1-based display number.
    pub fn number(&self) -> u8 {
        self.0
    }

    /// 0-based wire index.
    pub fn index(&self) -> u8 {
        self.0 - 1
    }

    /// Position of this seat in per-seat arrays.
    pub fn slot(&self) -> usize {
        usize::from(self.index())
    }
}

impl fmt::Display for SeatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seat {}", self.0)
    }
}

/// Which round a server-accepted bet rides on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetScope {
    Current,
    Next,
}

impl BetScope {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "current" => Some(BetScope::Current),
            "next" => Some(BetScope::Next),
            _ => None,
        }
    }
}

/// Colour band used for the crash history trail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MultiplierBand {
    Low,
    Medium,
    High,
}

impl MultiplierBand {
    pub fn of(multiplier: f64) -> Self {
        if multiplier >= 10.0 {
            MultiplierBand::High
        } else if multiplier >= 2.0 {
            MultiplierBand::Medium
        } else {
            MultiplierBand::Low
        }
    }
}

/// Display symbol for a wallet currency code; unknown codes are shown as-is.
pub fn currency_symbol(code: &str) -> &str {
    match code {
        "INR" => "",
        "USD" => "$",
        "EUR" => "€",
        "GBP" => "£",
        "JPY" => "¥",
        "FUN" => "P",
        "BTC" => "₿",
        "ETH" => "Ξ",
        other => other,
    }
}
