//! Bet, cancel and cash-out requests plus reconciliation of server replies.
//!
//! Every user action updates the seat optimistically (marking a pending
//! request) and queues the matching wire message in the outbox. Nothing is
//! committed until the server answers with a `bet` reply.

use crate::history::{LedgerEntry, Settlement};
use crate::seat::{BetMode, ButtonState, PendingRequest, SeatBet};
use skyrocket_types::{
    round2, BetError, BetOutcome, BetScope, ClientMessage, RoundPhase, SeatId, MAX_BET_AMOUNT,
    MIN_AUTO_CASHOUT, MIN_BET_AMOUNT,
};
use thiserror::Error;
use tracing::{debug, info, warn};

/// A user action that cannot be performed in the current state.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ActionError {
    #[error("not connected to a round yet")]
    Connecting,
    #[error("{seat}: cannot do that while the button shows {state}")]
    WrongState { seat: SeatId, state: ButtonState },
    #[error("bets can only be cancelled between rounds")]
    NotInPause,
    #[error("cash-out is only possible while the multiplier is climbing")]
    NotInProgress,
    #[error("{0}: bet is live, settings are locked")]
    Locked(SeatId),
    #[error("invalid amount: {0}")]
    InvalidAmount(f64),
    #[error("auto cash-out must be at least 1.01x, got {0}")]
    ThresholdTooLow(f64),
}

/// Result of an amount edit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AmountChange {
    pub amount: f64,
    /// The requested amount exceeded the maximum and was capped.
    pub capped: bool,
}

/// What a server `bet` reply did to a seat.
#[derive(Clone, Debug, PartialEq)]
pub enum BetResolution {
    Placed {
        seat: SeatId,
        scope: Option<BetScope>,
    },
    Cancelled {
        seat: SeatId,
    },
    CashedOut {
        seat: SeatId,
        entry: LedgerEntry,
    },
    Rejected {
        seat: SeatId,
        error: BetError,
        /// Whether the seat went back to having no bet.
        reverted: bool,
    },
    Ignored {
        seat: SeatId,
    },
}

/// Owns both seats and the queue of outgoing requests.
#[derive(Debug)]
pub struct BetController {
    seats: [SeatBet; 2],
    outbox: Vec<ClientMessage>,
}

impl Default for BetController {
    fn default() -> Self {
        Self::new()
    }
}

impl BetController {
    pub fn new() -> Self {
        Self {
            seats: SeatId::ALL.map(SeatBet::new),
            outbox: Vec::new(),
        }
    }

    pub fn seat(&self, seat: SeatId) -> &SeatBet {
        &self.seats[seat.slot()]
    }

    fn seat_mut(&mut self, seat: SeatId) -> &mut SeatBet {
        &mut self.seats[seat.slot()]
    }

    pub fn seats(&self) -> impl Iterator<Item = &SeatBet> {
        self.seats.iter()
    }

    /// Requests queued since the last drain, oldest first.
    pub fn drain_outbox(&mut self) -> Vec<ClientMessage> {
        std::mem::take(&mut self.outbox)
    }

    pub fn place_bet(&mut self, seat: SeatId, phase: RoundPhase) -> Result<(), ActionError> {
        if phase == RoundPhase::Connecting {
            return Err(ActionError::Connecting);
        }
        let bet = self.seat_mut(seat);
        let state = bet.button_state();
        if state != ButtonState::Idle {
            return Err(ActionError::WrongState { seat, state });
        }
        let amount = bet.amount();
        bet.mark_pending(PendingRequest::Place);
        bet.refresh(phase);
        info!(%seat, amount, %phase, "placing bet");
        self.outbox.push(ClientMessage::bet_options(seat, amount));
        self.outbox.push(ClientMessage::place_bet(seat));
        Ok(())
    }

    pub fn cancel_bet(&mut self, seat: SeatId, phase: RoundPhase) -> Result<(), ActionError> {
        if phase != RoundPhase::Pause {
            return Err(ActionError::NotInPause);
        }
        let bet = self.seat_mut(seat);
        let state = bet.button_state();
        if !bet.placed() || bet.pending().is_some() {
            return Err(ActionError::WrongState { seat, state });
        }
        bet.mark_pending(PendingRequest::Cancel);
        bet.refresh(phase);
        info!(%seat, "cancelling bet");
        self.outbox.push(ClientMessage::cancel_bet(seat));
        Ok(())
    }

    pub fn cash_out(
        &mut self,
        seat: SeatId,
        phase: RoundPhase,
        multiplier: f64,
        h: u64,
    ) -> Result<(), ActionError> {
        if phase != RoundPhase::InProgress {
            return Err(ActionError::NotInProgress);
        }
        let bet = self.seat_mut(seat);
        let state = bet.button_state();
        if state != ButtonState::CanCashOut {
            return Err(ActionError::WrongState { seat, state });
        }
        bet.mark_cashout_requested(multiplier);
        bet.refresh(phase);
        info!(%seat, multiplier, h, "cashing out");
        self.outbox.push(ClientMessage::cash_out(seat, h));
        Ok(())
    }

    /// Fire every armed auto-cashout whose threshold `multiplier` reached.
    pub fn auto_cash_out(&mut self, phase: RoundPhase, multiplier: f64, h: u64) -> Vec<SeatId> {
        let due: Vec<SeatId> = self
            .seats
            .iter()
            .filter(|bet| bet.auto_cashout_armed() && bet.threshold_reached(multiplier))
            .map(SeatBet::seat)
            .collect();

        let mut fired = Vec::with_capacity(due.len());
        for seat in due {
            self.seat_mut(seat).fire_auto_cashout();
            match self.cash_out(seat, phase, multiplier, h) {
                Ok(()) => fired.push(seat),
                Err(err) => debug!(%seat, %err, "auto cash-out skipped"),
            }
        }
        fired
    }

    pub fn set_amount(&mut self, seat: SeatId, amount: f64) -> Result<AmountChange, ActionError> {
        if !amount.is_finite() {
            return Err(ActionError::InvalidAmount(amount));
        }
        let bet = self.seat_mut(seat);
        if bet.is_locked() {
            return Err(ActionError::Locked(seat));
        }
        let capped = amount > MAX_BET_AMOUNT;
        let amount = round2(amount.clamp(MIN_BET_AMOUNT, MAX_BET_AMOUNT));
        bet.set_amount(amount);
        debug!(%seat, amount, capped, "bet amount updated");
        Ok(AmountChange { amount, capped })
    }

    /// Scale the amount, e.g. by 2.0 or 0.5.
    pub fn adjust_amount(&mut self, seat: SeatId, factor: f64) -> Result<AmountChange, ActionError> {
        let amount = self.seat(seat).amount() * factor;
        self.set_amount(seat, amount)
    }

    pub fn set_mode(&mut self, seat: SeatId, mode: BetMode) {
        self.seat_mut(seat).set_mode(mode);
    }

    pub fn set_auto_cashout(
        &mut self,
        seat: SeatId,
        threshold: f64,
        enabled: bool,
    ) -> Result<f64, ActionError> {
        if !threshold.is_finite() {
            return Err(ActionError::ThresholdTooLow(threshold));
        }
        let threshold = round2(threshold);
        if threshold < MIN_AUTO_CASHOUT {
            return Err(ActionError::ThresholdTooLow(threshold));
        }
        self.seat_mut(seat).set_auto_cashout(threshold, enabled);
        Ok(threshold)
    }

    /// Apply a server `bet` reply for `seat`.
    pub fn apply_reply(
        &mut self,
        seat: SeatId,
        outcome: &BetOutcome,
        phase: RoundPhase,
        multiplier: f64,
        round: u64,
    ) -> BetResolution {
        let bet = self.seat_mut(seat);
        let resolution = match outcome {
            BetOutcome::Placed { counter, scope } => {
                bet.confirm_placed(counter.clone(), *scope);
                BetResolution::Placed {
                    seat,
                    scope: *scope,
                }
            }
            BetOutcome::Cancelled => {
                bet.clear();
                BetResolution::Cancelled { seat }
            }
            // Already booked when the round crashed under the request.
            BetOutcome::CashedOut { .. } if !bet.placed() => BetResolution::Ignored { seat },
            BetOutcome::CashedOut { payout } => {
                let at = bet.cashout_multiplier().unwrap_or(multiplier);
                let amount = bet.amount();
                let payout = payout.unwrap_or_else(|| round2(amount * at));
                bet.clear();
                BetResolution::CashedOut {
                    seat,
                    entry: LedgerEntry {
                        seat,
                        round,
                        amount,
                        multiplier: at,
                        payout,
                        outcome: Settlement::CashedOut,
                    },
                }
            }
            BetOutcome::Rejected(error) => {
                // A failed cash-out leaves the bet riding; recoverable errors
                // mean the server still holds the previous state.
                let reverted = if bet.pending() == Some(PendingRequest::CashOut)
                    || error.is_recoverable()
                {
                    bet.clear_pending();
                    false
                } else {
                    bet.clear();
                    true
                };
                warn!(%seat, %error, reverted, "bet rejected");
                BetResolution::Rejected {
                    seat,
                    error: error.clone(),
                    reverted,
                }
            }
            BetOutcome::Unrecognized => BetResolution::Ignored { seat },
        };
        bet.refresh(phase);
        resolution
    }

    /// Entering a pause: next-round bets now ride the coming launch.
    pub fn on_pause(&mut self, phase: RoundPhase) {
        for bet in &mut self.seats {
            bet.promote();
            bet.refresh(phase);
        }
    }

    /// A round started (or was joined): auto-cashout latches re-arm and
    /// unscoped bets confirmed before launch join it.
    pub fn on_round_start(&mut self, phase: RoundPhase) {
        for bet in &mut self.seats {
            bet.adopt_unscoped();
            bet.new_round();
            bet.refresh(phase);
        }
    }

    /// Settle the seats that rode a round which crashed at `multiplier`.
    /// A cash-out still in flight is booked at the multiplier it was
    /// requested at; the wallet update decides the balance.
    pub fn on_crash(&mut self, phase: RoundPhase, multiplier: f64, round: u64) -> Vec<LedgerEntry> {
        let mut entries = Vec::new();
        for bet in &mut self.seats {
            if bet.pending() == Some(PendingRequest::CashOut) {
                let at = bet.cashout_multiplier().unwrap_or(multiplier);
                entries.push(LedgerEntry {
                    seat: bet.seat(),
                    round,
                    amount: bet.amount(),
                    multiplier: at,
                    payout: round2(bet.amount() * at),
                    outcome: Settlement::CashedOut,
                });
                bet.clear();
            } else if bet.rides_current_round() {
                entries.push(LedgerEntry {
                    seat: bet.seat(),
                    round,
                    amount: bet.amount(),
                    multiplier,
                    payout: -bet.amount(),
                    outcome: Settlement::Lost,
                });
                bet.clear();
            }
            bet.refresh(phase);
        }
        entries
    }

    pub fn refresh(&mut self, phase: RoundPhase) {
        for bet in &mut self.seats {
            bet.refresh(phase);
        }
    }

    /// Forget requests that were in flight on a connection that is gone.
    pub fn abandon_pending(&mut self, phase: RoundPhase) {
        for bet in &mut self.seats {
            if let Some(request) = bet.pending() {
                debug!(seat = %bet.seat(), ?request, "abandoning pending request");
                bet.clear_pending();
            }
            bet.refresh(phase);
        }
        self.outbox.clear();
    }

    /// Restore editable settings without touching live bets.
    pub(crate) fn restore_settings(
        &mut self,
        seat: SeatId,
        amount: f64,
        mode: BetMode,
        threshold: f64,
        enabled: bool,
    ) {
        let bet = self.seat_mut(seat);
        if bet.is_locked() {
            return;
        }
        if amount.is_finite() {
            bet.set_amount(round2(amount.clamp(MIN_BET_AMOUNT, MAX_BET_AMOUNT)));
        }
        bet.set_mode(mode);
        if threshold.is_finite() {
            bet.set_auto_cashout(round2(threshold), enabled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn placed_outcome(scope: Option<BetScope>) -> BetOutcome {
        BetOutcome::Placed {
            counter: Some(Value::from(11)),
            scope,
        }
    }

    #[test]
    fn test_place_sends_options_then_bet() {
        let mut bets = BetController::new();
        bets.set_amount(SeatId::SECOND, 25.0).unwrap();
        bets.place_bet(SeatId::SECOND, RoundPhase::Pause).unwrap();
        assert_eq!(
            bets.drain_outbox(),
            vec![
                ClientMessage::bet_options(SeatId::SECOND, 25.0),
                ClientMessage::place_bet(SeatId::SECOND),
            ]
        );
        assert_eq!(
            bets.seat(SeatId::SECOND).button_state(),
            ButtonState::AwaitingPlacement
        );
        assert!(bets.drain_outbox().is_empty());
    }

    #[test]
    fn test_place_rejected_while_connecting_or_busy() {
        let mut bets = BetController::new();
        assert_eq!(
            bets.place_bet(SeatId::FIRST, RoundPhase::Connecting),
            Err(ActionError::Connecting)
        );
        bets.place_bet(SeatId::FIRST, RoundPhase::Pause).unwrap();
        assert_eq!(
            bets.place_bet(SeatId::FIRST, RoundPhase::Pause),
            Err(ActionError::WrongState {
                seat: SeatId::FIRST,
                state: ButtonState::AwaitingPlacement
            })
        );
    }

    #[test]
    fn test_confirmation_never_leaves_seat_idle() {
        let cases = [
            (RoundPhase::Pause, Some(BetScope::Current), ButtonState::AwaitingCancel),
            (RoundPhase::Pause, None, ButtonState::AwaitingCancel),
            (RoundPhase::Started, Some(BetScope::Current), ButtonState::CanCashOut),
            (RoundPhase::InProgress, None, ButtonState::PlacedCurrentRound),
            (RoundPhase::InProgress, Some(BetScope::Next), ButtonState::PlacedNextRound),
            (RoundPhase::Crashed, Some(BetScope::Next), ButtonState::PlacedNextRound),
        ];
        for (phase, scope, expected) in cases {
            let mut bets = BetController::new();
            bets.place_bet(SeatId::FIRST, phase).unwrap();
            let resolution =
                bets.apply_reply(SeatId::FIRST, &placed_outcome(scope), phase, 1.0, 1);
            assert_eq!(
                resolution,
                BetResolution::Placed {
                    seat: SeatId::FIRST,
                    scope
                }
            );
            let state = bets.seat(SeatId::FIRST).button_state();
            assert_eq!(state, expected, "{phase} {scope:?}");
            assert_ne!(state, ButtonState::Idle);
            assert_eq!(
                bets.seat(SeatId::FIRST).server_counter(),
                Some(&Value::from(11))
            );
        }
    }

    #[test]
    fn test_cancel_only_in_pause() {
        let mut bets = BetController::new();
        bets.place_bet(SeatId::FIRST, RoundPhase::Pause).unwrap();
        bets.apply_reply(
            SeatId::FIRST,
            &placed_outcome(Some(BetScope::Current)),
            RoundPhase::Pause,
            1.0,
            1,
        );
        bets.drain_outbox();

        assert_eq!(
            bets.cancel_bet(SeatId::FIRST, RoundPhase::InProgress),
            Err(ActionError::NotInPause)
        );
        bets.cancel_bet(SeatId::FIRST, RoundPhase::Pause).unwrap();
        assert_eq!(bets.drain_outbox(), vec![ClientMessage::cancel_bet(SeatId::FIRST)]);
        assert_eq!(
            bets.seat(SeatId::FIRST).button_state(),
            ButtonState::PlacedCurrentRound
        );

        let resolution =
            bets.apply_reply(SeatId::FIRST, &BetOutcome::Cancelled, RoundPhase::Pause, 1.0, 1);
        assert_eq!(resolution, BetResolution::Cancelled { seat: SeatId::FIRST });
        assert_eq!(bets.seat(SeatId::FIRST).button_state(), ButtonState::Idle);
    }

    #[test]
    fn test_cash_out_records_request_multiplier() {
        let mut bets = BetController::new();
        bets.place_bet(SeatId::FIRST, RoundPhase::Pause).unwrap();
        let placed = placed_outcome(Some(BetScope::Current));
        bets.apply_reply(SeatId::FIRST, &placed, RoundPhase::Pause, 1.0, 4);
        bets.refresh(RoundPhase::InProgress);
        bets.drain_outbox();

        assert_eq!(
            bets.cash_out(SeatId::FIRST, RoundPhase::Started, 1.0, 0),
            Err(ActionError::NotInProgress)
        );
        bets.cash_out(SeatId::FIRST, RoundPhase::InProgress, 2.4, 240).unwrap();
        assert_eq!(bets.drain_outbox(), vec![ClientMessage::cash_out(SeatId::FIRST, 240)]);

        let resolution = bets.apply_reply(
            SeatId::FIRST,
            &BetOutcome::CashedOut { payout: None },
            RoundPhase::InProgress,
            2.9,
            4,
        );
        let BetResolution::CashedOut { entry, .. } = resolution else {
            panic!("expected cash-out, got {resolution:?}");
        };
        assert_eq!(entry.multiplier, 2.4);
        assert_eq!(entry.payout, 240.0);
        assert_eq!(entry.round, 4);
        assert_eq!(bets.seat(SeatId::FIRST).button_state(), ButtonState::Idle);
    }

    #[test]
    fn test_error_taxonomy() {
        let reject = |error: BetError| BetOutcome::Rejected(error);

        // Non-recoverable: back to idle.
        let mut bets = BetController::new();
        bets.place_bet(SeatId::FIRST, RoundPhase::Pause).unwrap();
        let resolution = bets.apply_reply(
            SeatId::FIRST,
            &reject(BetError::InsufficientBalance),
            RoundPhase::Pause,
            1.0,
            1,
        );
        assert!(matches!(resolution, BetResolution::Rejected { reverted: true, .. }));
        assert_eq!(bets.seat(SeatId::FIRST).button_state(), ButtonState::Idle);

        // Recoverable: the placed flag survives.
        let mut bets = BetController::new();
        bets.place_bet(SeatId::FIRST, RoundPhase::Pause).unwrap();
        let placed = placed_outcome(Some(BetScope::Current));
        bets.apply_reply(SeatId::FIRST, &placed, RoundPhase::Pause, 1.0, 1);
        bets.cancel_bet(SeatId::FIRST, RoundPhase::Pause).unwrap();
        let resolution = bets.apply_reply(
            SeatId::FIRST,
            &reject(BetError::NotAcceptingBets),
            RoundPhase::Pause,
            1.0,
            1,
        );
        assert!(matches!(resolution, BetResolution::Rejected { reverted: false, .. }));
        assert!(bets.seat(SeatId::FIRST).placed());
        assert_eq!(
            bets.seat(SeatId::FIRST).button_state(),
            ButtonState::AwaitingCancel
        );

        // Unknown error while cashing out: only the pending marker goes.
        bets.refresh(RoundPhase::InProgress);
        bets.cash_out(SeatId::FIRST, RoundPhase::InProgress, 1.7, 70).unwrap();
        let resolution = bets.apply_reply(
            SeatId::FIRST,
            &reject(BetError::Other("too late".into())),
            RoundPhase::InProgress,
            1.8,
            1,
        );
        assert!(matches!(resolution, BetResolution::Rejected { reverted: false, .. }));
        assert_eq!(
            bets.seat(SeatId::FIRST).button_state(),
            ButtonState::CanCashOut
        );
    }

    #[test]
    fn test_amount_rules() {
        let mut bets = BetController::new();
        assert_eq!(
            bets.set_amount(SeatId::FIRST, 0.2).unwrap(),
            AmountChange {
                amount: 1.0,
                capped: false
            }
        );
        assert_eq!(
            bets.set_amount(SeatId::FIRST, 20_000.0).unwrap(),
            AmountChange {
                amount: 10_000.0,
                capped: true
            }
        );
        assert_eq!(bets.set_amount(SeatId::FIRST, 12.346).unwrap().amount, 12.35);
        assert_eq!(bets.adjust_amount(SeatId::FIRST, 2.0).unwrap().amount, 24.7);
        assert!(matches!(
            bets.set_amount(SeatId::FIRST, f64::NAN),
            Err(ActionError::InvalidAmount(_))
        ));

        bets.place_bet(SeatId::FIRST, RoundPhase::Pause).unwrap();
        assert_eq!(
            bets.set_amount(SeatId::FIRST, 50.0),
            Err(ActionError::Locked(SeatId::FIRST))
        );
    }

    #[test]
    fn test_threshold_rules() {
        let mut bets = BetController::new();
        assert_eq!(
            bets.set_auto_cashout(SeatId::FIRST, 1.0, true),
            Err(ActionError::ThresholdTooLow(1.0))
        );
        assert_eq!(bets.set_auto_cashout(SeatId::FIRST, 1.999, true), Ok(2.0));
        assert_eq!(bets.seat(SeatId::FIRST).auto_cashout_threshold(), 2.0);
    }

    #[test]
    fn test_crash_settles_riding_seats() {
        let mut bets = BetController::new();
        for seat in SeatId::ALL {
            bets.place_bet(seat, RoundPhase::Pause).unwrap();
            bets.apply_reply(seat, &placed_outcome(None), RoundPhase::Pause, 1.0, 2);
        }
        bets.on_round_start(RoundPhase::Started);
        bets.refresh(RoundPhase::InProgress);
        bets.cash_out(SeatId::SECOND, RoundPhase::InProgress, 1.3, 30).unwrap();

        let entries = bets.on_crash(RoundPhase::Crashed, 1.31, 2);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].seat, SeatId::FIRST);
        assert_eq!(entries[0].outcome, Settlement::Lost);
        assert_eq!(entries[0].payout, -100.0);
        for seat in SeatId::ALL {
            assert_eq!(bets.seat(seat).button_state(), ButtonState::Idle);
        }
    }

    #[test]
    fn test_crash_books_cash_out_in_flight() {
        let mut bets = BetController::new();
        bets.place_bet(SeatId::FIRST, RoundPhase::Pause).unwrap();
        bets.apply_reply(
            SeatId::FIRST,
            &placed_outcome(Some(BetScope::Current)),
            RoundPhase::Pause,
            1.0,
            4,
        );
        bets.on_round_start(RoundPhase::Started);
        bets.refresh(RoundPhase::InProgress);
        bets.cash_out(SeatId::FIRST, RoundPhase::InProgress, 2.0, 100).unwrap();

        let entries = bets.on_crash(RoundPhase::Crashed, 2.1, 4);
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.seat, SeatId::FIRST);
        assert_eq!(entry.round, 4);
        assert_eq!(entry.outcome, Settlement::CashedOut);
        assert_eq!(entry.multiplier, 2.0);
        assert_eq!(entry.payout, 200.0);
        assert_eq!(bets.seat(SeatId::FIRST).button_state(), ButtonState::Idle);

        // The late server confirmation must not book it twice.
        let late = bets.apply_reply(
            SeatId::FIRST,
            &BetOutcome::CashedOut { payout: Some(200.0) },
            RoundPhase::Crashed,
            2.1,
            4,
        );
        assert!(matches!(late, BetResolution::Ignored { .. }));
    }

    #[test]
    fn test_unscoped_bet_mid_flight_is_not_settled() {
        let mut bets = BetController::new();
        bets.refresh(RoundPhase::InProgress);
        bets.place_bet(SeatId::FIRST, RoundPhase::InProgress).unwrap();
        bets.apply_reply(SeatId::FIRST, &placed_outcome(None), RoundPhase::InProgress, 1.5, 6);
        assert_eq!(
            bets.seat(SeatId::FIRST).button_state(),
            ButtonState::PlacedCurrentRound
        );
        assert!(bets.cash_out(SeatId::FIRST, RoundPhase::InProgress, 1.5, 50).is_err());

        assert!(bets.on_crash(RoundPhase::Crashed, 1.6, 6).is_empty());
        bets.on_pause(RoundPhase::Pause);
        assert_eq!(bets.seat(SeatId::FIRST).server_scope(), Some(BetScope::Current));
        assert_eq!(bets.seat(SeatId::FIRST).button_state(), ButtonState::AwaitingCancel);
    }
}
