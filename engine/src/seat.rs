//! Per-seat bet state and the button-state table.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use skyrocket_types::{
    round2, BetScope, RoundPhase, SeatId, DEFAULT_BET_AMOUNT, MIN_AUTO_CASHOUT,
};
use std::fmt;

/// How a seat cashes out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetMode {
    #[default]
    Manual,
    Auto,
}

/// Request sent to the server and not yet answered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PendingRequest {
    Place,
    Cancel,
    CashOut,
}

/// What a seat's action button shows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ButtonState {
    /// No bet; action is BET.
    #[default]
    Idle,
    /// Bet request in flight.
    AwaitingPlacement,
    /// Bet confirmed and riding the next launch; action is CANCEL.
    AwaitingCancel,
    /// Bet confirmed for the round after the current one.
    PlacedNextRound,
    /// Disabled waiting state.
    PlacedCurrentRound,
    /// Riding the flying round; action is CASH OUT.
    CanCashOut,
}

impl ButtonState {
    pub fn label(&self) -> &'static str {
        match self {
            ButtonState::Idle => "BET",
            ButtonState::AwaitingPlacement => "PLACING",
            ButtonState::AwaitingCancel => "CANCEL",
            ButtonState::PlacedNextRound => "WAITING FOR NEXT ROUND",
            ButtonState::PlacedCurrentRound => "WAITING",
            ButtonState::CanCashOut => "CASH OUT",
        }
    }

    /// Whether pressing the button does anything.
    pub fn is_actionable(&self) -> bool {
        matches!(
            self,
            ButtonState::Idle | ButtonState::AwaitingCancel | ButtonState::CanCashOut
        )
    }
}

impl fmt::Display for ButtonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The single source of truth for [`ButtonState`].
pub fn derive_button_state(
    pending: Option<PendingRequest>,
    placed: bool,
    scope: Option<BetScope>,
    phase: RoundPhase,
) -> ButtonState {
    match (pending, placed, scope) {
        (Some(PendingRequest::Place), _, _) => ButtonState::AwaitingPlacement,
        (Some(PendingRequest::Cancel | PendingRequest::CashOut), _, _) => {
            ButtonState::PlacedCurrentRound
        }
        (None, false, _) => ButtonState::Idle,
        (None, true, Some(BetScope::Next)) => ButtonState::PlacedNextRound,
        (None, true, Some(BetScope::Current)) => match phase {
            RoundPhase::Connecting | RoundPhase::Pause => ButtonState::AwaitingCancel,
            RoundPhase::Started | RoundPhase::InProgress => ButtonState::CanCashOut,
            RoundPhase::Crashed => ButtonState::PlacedCurrentRound,
        },
        // Unscoped: cancellable before launch, otherwise parked until promoted
        (None, true, None) => match phase {
            RoundPhase::Connecting | RoundPhase::Pause => ButtonState::AwaitingCancel,
            _ => ButtonState::PlacedCurrentRound,
        },
    }
}

/// One bet slot.
///
/// The button state is cached and only ever recomputed through
/// [`SeatBet::refresh`].
#[derive(Clone, Debug, PartialEq)]
pub struct SeatBet {
    seat: SeatId,
    amount: f64,
    placed: bool,
    mode: BetMode,
    auto_cashout_enabled: bool,
    auto_cashout_threshold: f64,
    auto_cashout_fired: bool,
    server_counter: Option<Value>,
    server_scope: Option<BetScope>,
    pending: Option<PendingRequest>,
    cashout_multiplier: Option<f64>,
    button: ButtonState,
}

impl SeatBet {
    pub fn new(seat: SeatId) -> Self {
        Self {
            seat,
            amount: DEFAULT_BET_AMOUNT,
            placed: false,
            mode: BetMode::Manual,
            auto_cashout_enabled: false,
            auto_cashout_threshold: 2.0,
            auto_cashout_fired: false,
            server_counter: None,
            server_scope: None,
            pending: None,
            cashout_multiplier: None,
            button: ButtonState::Idle,
        }
    }

    pub fn seat(&self) -> SeatId {
        self.seat
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    pub fn placed(&self) -> bool {
        self.placed
    }

    pub fn mode(&self) -> BetMode {
        self.mode
    }

    pub fn auto_cashout_enabled(&self) -> bool {
        self.auto_cashout_enabled
    }

    pub fn auto_cashout_threshold(&self) -> f64 {
        self.auto_cashout_threshold
    }

    pub fn auto_cashout_fired(&self) -> bool {
        self.auto_cashout_fired
    }

    pub fn server_counter(&self) -> Option<&Value> {
        self.server_counter.as_ref()
    }

    pub fn server_scope(&self) -> Option<BetScope> {
        self.server_scope
    }

    pub fn pending(&self) -> Option<PendingRequest> {
        self.pending
    }

    /// Multiplier captured when the pending cash-out was requested.
    pub fn cashout_multiplier(&self) -> Option<f64> {
        self.cashout_multiplier
    }

    pub fn button_state(&self) -> ButtonState {
        self.button
    }

    /// Whether the bet rides the round that is (or will be) flying next.
    /// Unscoped bets only ride once promoted.
    pub fn rides_current_round(&self) -> bool {
        self.placed && self.server_scope == Some(BetScope::Current)
    }

    /// Value a cash-out would lock in right now.
    pub fn cashout_value(&self, multiplier: f64) -> Option<f64> {
        (self.button == ButtonState::CanCashOut).then(|| round2(self.amount * multiplier))
    }

    /// Amount and threshold edits are locked while a bet is live.
    pub fn is_locked(&self) -> bool {
        self.placed || self.pending.is_some()
    }

    /// Auto-cashout preconditions other than the threshold itself.
    pub fn auto_cashout_armed(&self) -> bool {
        self.mode == BetMode::Auto
            && self.auto_cashout_enabled
            && !self.auto_cashout_fired
            && self.placed
            && self.server_scope == Some(BetScope::Current)
            && self.pending.is_none()
    }

    /// Whether `multiplier` reached the threshold at display precision.
    pub fn threshold_reached(&self, multiplier: f64) -> bool {
        round2(multiplier) >= round2(self.auto_cashout_threshold)
    }

    pub fn refresh(&mut self, phase: RoundPhase) -> ButtonState {
        self.button =
            derive_button_state(self.pending, self.placed, self.server_scope, phase);
        self.button
    }

    pub(crate) fn set_amount(&mut self, amount: f64) {
        self.amount = amount;
    }

    pub(crate) fn set_mode(&mut self, mode: BetMode) {
        self.mode = mode;
    }

    pub(crate) fn set_auto_cashout(&mut self, threshold: f64, enabled: bool) {
        self.auto_cashout_threshold = threshold.max(MIN_AUTO_CASHOUT);
        self.auto_cashout_enabled = enabled;
    }

    pub(crate) fn mark_pending(&mut self, request: PendingRequest) {
        self.pending = Some(request);
    }

    pub(crate) fn mark_cashout_requested(&mut self, multiplier: f64) {
        self.pending = Some(PendingRequest::CashOut);
        self.cashout_multiplier = Some(multiplier);
    }

    pub(crate) fn fire_auto_cashout(&mut self) {
        self.auto_cashout_fired = true;
    }

    pub(crate) fn clear_pending(&mut self) {
        self.pending = None;
        self.cashout_multiplier = None;
    }

    pub(crate) fn confirm_placed(&mut self, counter: Option<Value>, scope: Option<BetScope>) {
        self.placed = true;
        self.server_counter = counter;
        self.server_scope = scope;
        self.clear_pending();
    }

    /// Promote a next-round or unscoped bet onto the round about to start.
    pub(crate) fn promote(&mut self) {
        if self.placed && self.server_scope != Some(BetScope::Current) {
            self.server_scope = Some(BetScope::Current);
        }
    }

    /// Unscoped bets confirmed before launch ride the launch.
    pub(crate) fn adopt_unscoped(&mut self) {
        if self.placed && self.server_scope.is_none() {
            self.server_scope = Some(BetScope::Current);
        }
    }

    pub(crate) fn new_round(&mut self) {
        self.auto_cashout_fired = false;
    }

    /// Drop the bet (settled, cancelled or rejected).
    pub(crate) fn clear(&mut self) {
        self.placed = false;
        self.server_counter = None;
        self.server_scope = None;
        self.clear_pending();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_table() {
        use ButtonState::*;
        use RoundPhase::*;

        let all = [Connecting, Pause, Started, InProgress, Crashed];
        for phase in all {
            assert_eq!(
                derive_button_state(Some(PendingRequest::Place), false, None, phase),
                AwaitingPlacement
            );
            assert_eq!(
                derive_button_state(Some(PendingRequest::Cancel), true, None, phase),
                PlacedCurrentRound
            );
            assert_eq!(
                derive_button_state(Some(PendingRequest::CashOut), true, None, phase),
                PlacedCurrentRound
            );
            assert_eq!(derive_button_state(None, false, None, phase), Idle);
            assert_eq!(
                derive_button_state(None, true, Some(BetScope::Next), phase),
                PlacedNextRound
            );
        }

        let current = Some(BetScope::Current);
        assert_eq!(derive_button_state(None, true, current, Connecting), AwaitingCancel);
        assert_eq!(derive_button_state(None, true, current, Pause), AwaitingCancel);
        assert_eq!(derive_button_state(None, true, current, Started), CanCashOut);
        assert_eq!(derive_button_state(None, true, current, InProgress), CanCashOut);
        assert_eq!(derive_button_state(None, true, current, Crashed), PlacedCurrentRound);

        assert_eq!(derive_button_state(None, true, None, Connecting), AwaitingCancel);
        assert_eq!(derive_button_state(None, true, None, Pause), AwaitingCancel);
        assert_eq!(derive_button_state(None, true, None, Started), PlacedCurrentRound);
        assert_eq!(derive_button_state(None, true, None, InProgress), PlacedCurrentRound);
        assert_eq!(derive_button_state(None, true, None, Crashed), PlacedCurrentRound);
    }

    #[test]
    fn test_unscoped_bet_rides_only_after_promotion() {
        let mut seat = SeatBet::new(SeatId::FIRST);
        seat.set_mode(BetMode::Auto);
        seat.set_auto_cashout(1.5, true);
        seat.confirm_placed(None, None);
        assert_eq!(seat.refresh(RoundPhase::InProgress), ButtonState::PlacedCurrentRound);
        assert!(!seat.rides_current_round());
        assert!(!seat.auto_cashout_armed());
        assert_eq!(seat.cashout_value(2.0), None);

        seat.promote();
        assert_eq!(seat.server_scope(), Some(BetScope::Current));
        assert!(seat.rides_current_round());
        assert!(seat.auto_cashout_armed());
        assert_eq!(seat.refresh(RoundPhase::InProgress), ButtonState::CanCashOut);

        // An idle seat has nothing to promote.
        let mut idle = SeatBet::new(SeatId::SECOND);
        idle.promote();
        idle.adopt_unscoped();
        assert_eq!(idle.server_scope(), None);
    }

    #[test]
    fn test_auto_cashout_arming() {
        let mut seat = SeatBet::new(SeatId::FIRST);
        seat.set_mode(BetMode::Auto);
        seat.set_auto_cashout(1.5, true);
        assert!(!seat.auto_cashout_armed());

        seat.confirm_placed(None, Some(BetScope::Next));
        assert!(!seat.auto_cashout_armed());
        seat.promote();
        assert!(seat.auto_cashout_armed());
        assert!(seat.threshold_reached(1.499_999));
        assert!(!seat.threshold_reached(1.49));

        seat.fire_auto_cashout();
        assert!(!seat.auto_cashout_armed());
        seat.new_round();
        assert!(seat.auto_cashout_armed());
    }

    #[test]
    fn test_cashout_value_only_when_riding() {
        let mut seat = SeatBet::new(SeatId::SECOND);
        seat.confirm_placed(Some(Value::from(3)), Some(BetScope::Current));
        seat.refresh(RoundPhase::Pause);
        assert_eq!(seat.cashout_value(1.45), None);
        seat.refresh(RoundPhase::InProgress);
        assert_eq!(seat.cashout_value(1.45), Some(145.0));
    }
}
