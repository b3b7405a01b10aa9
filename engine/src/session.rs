//! The per-connection game session.
//!
//! [`GameSession`] is the only owner of round state, both seats, the
//! animator, the local countdown and the session logs. It is driven from a
//! single task: server frames go through [`GameSession::handle`], frames
//! through [`GameSession::tick`], user input through the action methods.
//! Side effects flow out through the UI event queue and the request outbox.

use crate::animator::{self, Animator, AnimatorState, Backend};
use crate::bets::{ActionError, AmountChange, BetController, BetResolution};
use crate::countdown::LocalCountdown;
use crate::history::{BetLedger, RoundHistory, Settlement};
use crate::round::{PauseStage, RoundState};
use crate::seat::{BetMode, ButtonState, SeatBet};
use crate::snapshot::{SeatSnapshot, SessionSnapshot, SnapshotError, SnapshotNotice, SnapshotStore};
use crate::trajectory::Bounds;
use crate::ui::{DisplayState, SeatView, SoundCue, Toast, ToastLevel, UiEvent};
use skyrocket_types::{
    currency_symbol, format_multiplier, BetReply, BetScope, ClientMessage, Inbound, RoundPhase,
    SeatId, ServerEvent, StatusUpdate, UserProfile, Wallet, MAX_BET_AMOUNT,
};
use std::collections::VecDeque;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SessionConfig {
    pub backend: Backend,
    pub bounds: Bounds,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Smooth,
            bounds: Bounds::new(800.0, 600.0),
        }
    }
}

pub struct GameSession {
    round: RoundState,
    bets: BetController,
    animator: Box<dyn Animator>,
    countdown: LocalCountdown,
    pause_stage: Option<PauseStage>,
    history: RoundHistory,
    ledger: BetLedger,
    wallet: Wallet,
    profile: UserProfile,
    overlay: Option<String>,
    status: String,
    events: VecDeque<UiEvent>,
    snapshots: Option<SnapshotStore>,
    snapshot_on_disk: bool,
    visible: bool,
}

impl GameSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            round: RoundState::default(),
            bets: BetController::new(),
            animator: animator::select(config.backend, config.bounds),
            countdown: LocalCountdown::new(),
            pause_stage: None,
            history: RoundHistory::default(),
            ledger: BetLedger::default(),
            wallet: Wallet::default(),
            profile: UserProfile::default(),
            overlay: None,
            status: "Connecting".to_string(),
            events: VecDeque::new(),
            snapshots: None,
            snapshot_on_disk: false,
            visible: true,
        }
    }

    /// Persist snapshots to `store` and delete them at round boundaries.
    pub fn with_snapshot_store(mut self, store: SnapshotStore) -> Self {
        self.snapshots = Some(store);
        self.snapshot_on_disk = true;
        self
    }

    // ---------- Inbound ----------

    /// Apply one server frame. The wallet is applied before anything else.
    pub fn handle(&mut self, inbound: Inbound, now: Instant) {
        if let Some(wallet) = inbound.wallet {
            self.apply_wallet(wallet);
        }
        match inbound.event {
            ServerEvent::Authentication(reply) => {
                if reply.accepted {
                    self.status = "Authenticated".to_string();
                } else {
                    self.status = "Authentication rejected".to_string();
                }
            }
            ServerEvent::GameList(games) => debug!(count = games.len(), "game list received"),
            ServerEvent::Bet(reply) => self.apply_bet_reply(reply),
            ServerEvent::UserData(profile) => self.apply_profile(profile),
            ServerEvent::OptionsAck => debug!("bet options acknowledged"),
            ServerEvent::Status(update) => self.apply_status(update, now),
            ServerEvent::Unknown => debug!("ignoring unrecognized frame"),
        }
    }

    fn apply_wallet(&mut self, wallet: Wallet) {
        if let Some(balance) = wallet.balance {
            self.wallet.balance = Some(balance);
        }
        if let Some(currency) = wallet.currency {
            self.wallet.currency = Some(currency);
        }
        debug!(balance = ?self.wallet.balance, currency = ?self.wallet.currency, "wallet updated");
    }

    fn apply_profile(&mut self, profile: UserProfile) {
        if let Some(balance) = profile.balance {
            self.wallet.balance = Some(balance);
        }
        if profile.name.is_some() {
            self.profile.name = profile.name;
        }
        if profile.avatar.is_some() {
            self.profile.avatar = profile.avatar;
        }
        debug!(name = ?self.profile.name, "profile updated");
    }

    fn apply_status(&mut self, update: StatusUpdate, now: Instant) {
        match update {
            StatusUpdate::Pause { countdown } => self.on_pause(countdown, now),
            StatusUpdate::Started { h } => self.on_started(h, now),
            StatusUpdate::Progress { k, h } => self.on_progress(k, h, now),
            StatusUpdate::Crash { k } => self.on_crash(k, now),
            StatusUpdate::Unrecognized(status) => warn!(status, "ignoring unknown round status"),
        }
    }

    fn on_pause(&mut self, countdown: f64, now: Instant) {
        let previous = self.round.phase;
        let stage = self.round.enter_pause(countdown);
        if previous != RoundPhase::Pause {
            debug!(%previous, countdown, "entering pause");
            self.discard_snapshot();
        }
        self.bets.on_pause(self.round.phase);

        let entering = self.pause_stage != Some(stage);
        self.pause_stage = Some(stage);
        match stage {
            PauseStage::FlewAway | PauseStage::FlewAwayHold => {
                self.countdown.cancel();
                if let Some(crashed) = self.round.crashed_multiplier {
                    self.set_overlay(Some(format!("FLEW AWAY! {}", format_multiplier(crashed))));
                }
                self.status = "Round over".to_string();
            }
            PauseStage::Relaunch => {
                self.animator.stop();
                self.animator.reset();
                if entering {
                    self.emit(UiEvent::Sound(SoundCue::Pause));
                }
                self.open_betting_window(countdown, now);
            }
            PauseStage::BettingWindow => {
                // A missed relaunch message must not leave the rocket falling.
                if self.animator.state().crashing {
                    self.animator.stop();
                    self.animator.reset();
                }
                self.open_betting_window(countdown, now);
            }
            PauseStage::Ready => {
                self.countdown.cancel();
                self.set_overlay(None);
                self.status = "Ready to start".to_string();
            }
        }
    }

    fn open_betting_window(&mut self, countdown: f64, now: Instant) {
        self.set_overlay(None);
        let generation = self.countdown.start(countdown, now);
        debug!(countdown, generation, "betting window countdown restarted");
        self.status = "Place your bets".to_string();
    }

    fn on_started(&mut self, h: Option<u64>, now: Instant) {
        self.round.enter_started(h);
        self.pause_stage = None;
        self.countdown.cancel();
        self.set_overlay(None);
        self.animator.start(now);
        self.emit(UiEvent::Sound(SoundCue::Launch));
        self.bets.on_round_start(self.round.phase);
        self.status = "In flight".to_string();
        info!(round = self.round.round_counter, "round started");
    }

    fn on_progress(&mut self, k: Option<f64>, h: Option<u64>, now: Instant) {
        let k = k.unwrap_or(self.round.multiplier);
        if self.round.round_started {
            self.round.progress(k, h);
            self.animator.update_target(self.round.multiplier);
            self.bets.refresh(self.round.phase);
        } else {
            self.round.join(k, h);
            self.pause_stage = None;
            self.countdown.cancel();
            self.set_overlay(None);
            self.animator.start_from(self.round.multiplier, now);
            self.bets.on_round_start(self.round.phase);
            self.status = "In flight".to_string();
            info!(round = self.round.round_counter, k, "joined round in flight");
            let joined = format!("Joined mid-round at {}", format_multiplier(self.round.multiplier));
            self.toast(ToastLevel::Info, joined);
        }
        self.run_auto_cashout();
    }

    fn run_auto_cashout(&mut self) {
        let fired = self.bets.auto_cash_out(
            self.round.phase,
            self.round.multiplier,
            self.round.elapsed_ticks,
        );
        for seat in fired {
            self.emit(UiEvent::Sound(SoundCue::CashOut));
            let message = format!("{seat}: auto cash-out at {}", format_multiplier(self.round.multiplier));
            self.toast(ToastLevel::Info, message);
        }
    }

    fn on_crash(&mut self, k: Option<f64>, now: Instant) {
        if self.round.phase == RoundPhase::Crashed {
            debug!("duplicate crash ignored");
            return;
        }
        let k = self.round.crash(k);
        let round = self.round.round_counter;
        self.pause_stage = None;
        self.animator.crash(now);
        self.countdown.cancel();
        self.emit(UiEvent::Sound(SoundCue::Crash));
        self.history.push(round, k);
        for entry in self.bets.on_crash(self.round.phase, k, round) {
            match entry.outcome {
                Settlement::CashedOut => {
                    let message = format!(
                        "{}: cashed out at {} for {} (unconfirmed)",
                        entry.seat,
                        format_multiplier(entry.multiplier),
                        self.money(entry.payout)
                    );
                    self.toast(ToastLevel::Info, message);
                }
                Settlement::Lost => {
                    let message = format!("{}: lost {}", entry.seat, self.money(entry.amount));
                    self.toast(ToastLevel::Warning, message);
                }
            }
            self.ledger.push(entry);
        }
        self.discard_snapshot();
        self.status = format!("Flew away at {}", format_multiplier(k));
        info!(round, k, "round crashed");
    }

    fn apply_bet_reply(&mut self, reply: BetReply) {
        let Some(seat) = reply.seat() else {
            warn!(index = reply.index, "bet reply for unknown seat");
            return;
        };
        let resolution = self.bets.apply_reply(
            seat,
            &reply.outcome,
            self.round.phase,
            self.round.multiplier,
            self.round.round_counter,
        );
        match resolution {
            BetResolution::Placed { seat, scope } => {
                let message = if scope == Some(BetScope::Next) {
                    format!("{seat}: bet accepted for the next round")
                } else {
                    format!("{seat}: bet placed")
                };
                self.toast(ToastLevel::Success, message);
            }
            BetResolution::Cancelled { seat } => {
                self.toast(ToastLevel::Info, format!("{seat}: bet cancelled"));
            }
            BetResolution::CashedOut { seat, entry } => {
                let message = format!(
                    "{seat}: cashed out at {} for {}",
                    format_multiplier(entry.multiplier),
                    self.money(entry.payout)
                );
                self.toast(ToastLevel::Success, message);
                self.ledger.push(entry);
            }
            BetResolution::Rejected { seat, error, .. } => {
                let level = if error.is_recoverable() {
                    ToastLevel::Warning
                } else {
                    ToastLevel::Error
                };
                self.toast(level, format!("{seat}: {error}"));
            }
            BetResolution::Ignored { seat } => debug!(%seat, "unrecognized bet reply"),
        }
    }

    // ---------- Frames and lifecycle ----------

    /// Advance animation to `now`.
    pub fn tick(&mut self, now: Instant) {
        if self.visible {
            self.animator.tick(now);
        }
    }

    pub fn resize(&mut self, bounds: Bounds) {
        debug!(width = bounds.width, height = bounds.height, "resizing canvas");
        self.animator.resize(bounds);
    }

    pub fn set_visible(&mut self, visible: bool, now: Instant) {
        if self.visible == visible {
            return;
        }
        self.visible = visible;
        self.animator.set_visible(visible, now);
        if visible {
            self.countdown.resume();
        } else {
            self.countdown.freeze(now);
        }
    }

    /// Drop everything tied to the current connection and wait for the next
    /// round message. Seats keep their settings and confirmed bets.
    pub fn teardown(&mut self) {
        self.countdown.cancel();
        self.animator.stop();
        self.animator.reset();
        self.round.reset();
        self.pause_stage = None;
        self.set_overlay(None);
        self.bets.abandon_pending(self.round.phase);
        self.status = "Connecting".to_string();
        info!("session torn down");
    }

    // ---------- User actions ----------

    pub fn place_bet(&mut self, seat: SeatId) -> Result<(), ActionError> {
        self.bets.place_bet(seat, self.round.phase)
    }

    pub fn cancel_bet(&mut self, seat: SeatId) -> Result<(), ActionError> {
        self.bets.cancel_bet(seat, self.round.phase)
    }

    pub fn cash_out(&mut self, seat: SeatId) -> Result<(), ActionError> {
        self.bets.cash_out(
            seat,
            self.round.phase,
            self.round.multiplier,
            self.round.elapsed_ticks,
        )?;
        self.emit(UiEvent::Sound(SoundCue::CashOut));
        Ok(())
    }

    /// Perform whatever the seat's button currently offers.
    pub fn press(&mut self, seat: SeatId) -> Result<(), ActionError> {
        match self.bets.seat(seat).button_state() {
            ButtonState::Idle => self.place_bet(seat),
            ButtonState::AwaitingCancel => self.cancel_bet(seat),
            ButtonState::CanCashOut => self.cash_out(seat),
            state => Err(ActionError::WrongState { seat, state }),
        }
    }

    pub fn set_amount(&mut self, seat: SeatId, amount: f64) -> Result<AmountChange, ActionError> {
        let change = self.bets.set_amount(seat, amount)?;
        self.warn_if_capped(change);
        Ok(change)
    }

    pub fn adjust_amount(&mut self, seat: SeatId, factor: f64) -> Result<AmountChange, ActionError> {
        let change = self.bets.adjust_amount(seat, factor)?;
        self.warn_if_capped(change);
        Ok(change)
    }

    fn warn_if_capped(&mut self, change: AmountChange) {
        if change.capped {
            let message = format!("Maximum bet is {}", self.money(MAX_BET_AMOUNT));
            self.toast(ToastLevel::Warning, message);
        }
    }

    pub fn set_mode(&mut self, seat: SeatId, mode: BetMode) {
        self.bets.set_mode(seat, mode);
    }

    pub fn set_auto_cashout(
        &mut self,
        seat: SeatId,
        threshold: f64,
        enabled: bool,
    ) -> Result<f64, ActionError> {
        self.bets.set_auto_cashout(seat, threshold, enabled)
    }

    // ---------- Outputs ----------

    pub fn drain_events(&mut self) -> Vec<UiEvent> {
        self.events.drain(..).collect()
    }

    pub fn drain_outbox(&mut self) -> Vec<ClientMessage> {
        self.bets.drain_outbox()
    }

    pub fn phase(&self) -> RoundPhase {
        self.round.phase
    }

    pub fn multiplier(&self) -> f64 {
        self.round.multiplier
    }

    pub fn round(&self) -> &RoundState {
        &self.round
    }

    pub fn seat(&self, seat: SeatId) -> &SeatBet {
        self.bets.seat(seat)
    }

    pub fn rocket(&self) -> AnimatorState {
        self.animator.state()
    }

    pub fn history(&self) -> &RoundHistory {
        &self.history
    }

    pub fn ledger(&self) -> &BetLedger {
        &self.ledger
    }

    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    pub fn overlay(&self) -> Option<&str> {
        self.overlay.as_deref()
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn pause_stage(&self) -> Option<PauseStage> {
        self.pause_stage
    }

    pub fn countdown_generation(&self) -> u64 {
        self.countdown.generation()
    }

    /// Remaining seconds of the countdown armed at `generation`; stale
    /// generations and non-pause phases yield nothing.
    pub fn poll_countdown(&self, generation: u64, now: Instant) -> Option<f64> {
        if self.round.phase != RoundPhase::Pause {
            return None;
        }
        self.countdown.poll(generation, now)
    }

    pub fn countdown_remaining(&self, now: Instant) -> Option<f64> {
        self.poll_countdown(self.countdown.generation(), now)
    }

    /// Format an amount in the wallet currency.
    pub fn money(&self, amount: f64) -> String {
        let symbol = self
            .wallet
            .currency
            .as_deref()
            .map(currency_symbol)
            .unwrap_or("");
        format!("{symbol}{amount:.2}")
    }

    pub fn display(&self, now: Instant) -> DisplayState {
        let multiplier = self.round.multiplier;
        DisplayState {
            phase: self.round.phase,
            multiplier,
            multiplier_text: format_multiplier(multiplier),
            countdown: self.countdown_remaining(now),
            overlay: self.overlay.clone(),
            status: self.status.clone(),
            rocket: self.animator.state(),
            seats: self
                .bets
                .seats()
                .map(|bet| SeatView {
                    seat: bet.seat(),
                    amount: bet.amount(),
                    button: bet.button_state(),
                    mode: bet.mode(),
                    auto_cashout_enabled: bet.auto_cashout_enabled(),
                    auto_cashout_threshold: bet.auto_cashout_threshold(),
                    cashout_value: bet.cashout_value(multiplier),
                })
                .collect(),
            balance: self.wallet.balance,
            currency: self.wallet.currency.clone(),
        }
    }

    // ---------- Snapshots ----------

    pub fn snapshot(&self, now_ms: u64) -> SessionSnapshot {
        SessionSnapshot {
            saved_at_ms: now_ms,
            phase: self.round.phase,
            multiplier: self.round.multiplier,
            seats: self
                .bets
                .seats()
                .map(|bet| SeatSnapshot {
                    seat: bet.seat().number(),
                    amount: bet.amount(),
                    placed: bet.placed(),
                    scope: bet.server_scope(),
                    mode: bet.mode(),
                    auto_cashout_threshold: bet.auto_cashout_threshold(),
                    auto_cashout_enabled: bet.auto_cashout_enabled(),
                })
                .collect(),
            round_counter: self.round.round_counter,
        }
    }

    /// Save a snapshot if a store is attached and the session is worth
    /// remembering. Returns whether a file was written.
    pub fn save_snapshot(&mut self, now_ms: u64) -> Result<bool, SnapshotError> {
        let Some(store) = self.snapshots.as_ref() else {
            return Ok(false);
        };
        let snapshot = self.snapshot(now_ms);
        if !snapshot.worth_saving() {
            return Ok(false);
        }
        store.save(&snapshot)?;
        self.snapshot_on_disk = true;
        Ok(true)
    }

    /// Consume the stored snapshot, if any, and apply it.
    pub fn load_snapshot(&mut self, now_ms: u64) -> Option<SnapshotNotice> {
        let store = self.snapshots.as_ref()?;
        let taken = store.take(now_ms);
        self.snapshot_on_disk = false;
        match taken {
            Ok(Some(snapshot)) => self.restore(&snapshot),
            Ok(None) => None,
            Err(err) => {
                warn!(%err, "ignoring unreadable session snapshot");
                None
            }
        }
    }

    /// Apply an advisory snapshot from an earlier session.
    pub fn restore(&mut self, snapshot: &SessionSnapshot) -> Option<SnapshotNotice> {
        match snapshot.phase {
            RoundPhase::InProgress if snapshot.any_placed() => {
                let message = format!(
                    "Previous session was interrupted mid-round at {}; check your balance",
                    format_multiplier(snapshot.multiplier)
                );
                self.toast(ToastLevel::Warning, message);
                info!(multiplier = snapshot.multiplier, "previous session interrupted");
                Some(SnapshotNotice::RoundInterrupted {
                    multiplier: snapshot.multiplier,
                })
            }
            RoundPhase::Pause => {
                for saved in &snapshot.seats {
                    let Some(seat) = SeatId::from_number(saved.seat) else {
                        continue;
                    };
                    self.bets.restore_settings(
                        seat,
                        saved.amount,
                        saved.mode,
                        saved.auto_cashout_threshold,
                        saved.auto_cashout_enabled,
                    );
                }
                self.toast(ToastLevel::Info, "Restored bet settings from previous session");
                Some(SnapshotNotice::AmountsRestored)
            }
            _ => None,
        }
    }

    fn discard_snapshot(&mut self) {
        if !self.snapshot_on_disk {
            return;
        }
        let Some(store) = self.snapshots.as_ref() else {
            return;
        };
        match store.clear() {
            Ok(()) => self.snapshot_on_disk = false,
            Err(err) => warn!(%err, "failed to delete session snapshot"),
        }
    }

    // ---------- Helpers ----------

    fn emit(&mut self, event: UiEvent) {
        self.events.push_back(event);
    }

    fn toast(&mut self, level: ToastLevel, message: impl Into<String>) {
        self.emit(UiEvent::Toast(Toast::new(level, message)));
    }

    fn set_overlay(&mut self, overlay: Option<String>) {
        if self.overlay != overlay {
            self.overlay = overlay.clone();
            self.emit(UiEvent::Overlay(overlay));
        }
    }
}
