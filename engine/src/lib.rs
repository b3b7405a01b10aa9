//! Client-side core of the skyrocket crash game.
//!
//! [`GameSession`] owns everything: it consumes parsed server frames
//! ([`skyrocket_types::Inbound`]) through [`GameSession::handle`], advances
//! the rocket through [`GameSession::tick`], and exposes what a
//! presentation layer needs through [`GameSession::display`],
//! [`GameSession::drain_events`] and [`GameSession::drain_outbox`].
//!
//! The engine never performs network I/O and never reads the clock itself;
//! every time-dependent operation takes an [`std::time::Instant`].

pub mod animator;
pub mod bets;
pub mod countdown;
pub mod history;
pub mod round;
pub mod scheduler;
pub mod seat;
pub mod session;
pub mod snapshot;
pub mod trajectory;
pub mod ui;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;

pub use animator::{Animator, AnimatorState, Backend, NullAnimator, SmoothAnimator};
pub use bets::{ActionError, AmountChange, BetController, BetResolution};
pub use history::{BetLedger, HistoryEntry, LedgerEntry, RoundHistory, Settlement};
pub use round::{PauseStage, RoundState};
pub use seat::{derive_button_state, BetMode, ButtonState, PendingRequest, SeatBet};
pub use session::{GameSession, SessionConfig};
pub use snapshot::{SessionSnapshot, SnapshotError, SnapshotNotice, SnapshotStore};
pub use trajectory::{Bounds, Pose, Vec2};
pub use ui::{DisplayState, SeatView, SoundCue, Toast, ToastLevel, UiEvent};
