//! Bounded logs of finished rounds and settled bets.

use skyrocket_types::{MultiplierBand, SeatId};
use std::collections::VecDeque;

/// Entries kept by [`RoundHistory`] and [`BetLedger`].
pub const HISTORY_CAPACITY: usize = 50;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HistoryEntry {
    pub round: u64,
    pub multiplier: f64,
    pub band: MultiplierBand,
}

/// Crash multipliers of recent rounds, newest first.
#[derive(Clone, Debug, Default)]
pub struct RoundHistory {
    entries: VecDeque<HistoryEntry>,
}

impl RoundHistory {
    pub fn push(&mut self, round: u64, multiplier: f64) {
        self.entries.push_front(HistoryEntry {
            round,
            multiplier,
            band: MultiplierBand::of(multiplier),
        });
        self.entries.truncate(HISTORY_CAPACITY);
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Settlement {
    CashedOut,
    Lost,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LedgerEntry {
    pub seat: SeatId,
    pub round: u64,
    pub amount: f64,
    pub multiplier: f64,
    /// Gross return for a cash-out, negative stake for a loss.
    pub payout: f64,
    pub outcome: Settlement,
}

impl LedgerEntry {
    /// Net result of the bet.
    pub fn profit(&self) -> f64 {
        match self.outcome {
            Settlement::CashedOut => self.payout - self.amount,
            Settlement::Lost => self.payout,
        }
    }
}

/// Bets settled during this session, newest first.
#[derive(Clone, Debug, Default)]
pub struct BetLedger {
    entries: VecDeque<LedgerEntry>,
}

impl BetLedger {
    pub fn push(&mut self, entry: LedgerEntry) {
        self.entries.push_front(entry);
        self.entries.truncate(HISTORY_CAPACITY);
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &LedgerEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of [`LedgerEntry::profit`] over the retained entries.
    pub fn net(&self) -> f64 {
        self.entries.iter().map(LedgerEntry::profit).sum()
    }
}
