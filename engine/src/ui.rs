//! What the engine tells the presentation layer.
//!
//! Discrete happenings (sounds, toasts, overlay changes) are queued as
//! [`UiEvent`]s; continuous state is read as a [`DisplayState`] snapshot
//! once per frame.

use crate::animator::AnimatorState;
use crate::seat::{BetMode, ButtonState};
use skyrocket_types::{RoundPhase, SeatId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SoundCue {
    Launch,
    Pause,
    Crash,
    CashOut,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ToastLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Toast {
    pub level: ToastLevel,
    pub message: String,
}

impl Toast {
    pub fn new(level: ToastLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UiEvent {
    Sound(SoundCue),
    Toast(Toast),
    /// Overlay text shown (`Some`) or cleared (`None`).
    Overlay(Option<String>),
}

/// Render state for one seat.
#[derive(Clone, Debug, PartialEq)]
pub struct SeatView {
    pub seat: SeatId,
    pub amount: f64,
    pub button: ButtonState,
    pub mode: BetMode,
    pub auto_cashout_enabled: bool,
    pub auto_cashout_threshold: f64,
    /// Amount a cash-out would return right now.
    pub cashout_value: Option<f64>,
}

/// Per-frame render state.
#[derive(Clone, Debug, PartialEq)]
pub struct DisplayState {
    pub phase: RoundPhase,
    pub multiplier: f64,
    pub multiplier_text: String,
    /// Remaining betting-window seconds, while one is running.
    pub countdown: Option<f64>,
    pub overlay: Option<String>,
    pub status: String,
    pub rocket: AnimatorState,
    pub seats: Vec<SeatView>,
    pub balance: Option<f64>,
    pub currency: Option<String>,
}
