//! Terminal application state: the game session plus everything the
//! terminal adds around it (connection status, log pane, key bindings).

use crate::ui::{self, StarField};
use chrono::Local;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::layout::Rect;
use skyrocket_client::ConnectionEvent;
use skyrocket_engine::scheduler::ResizeDebouncer;
use skyrocket_engine::{ActionError, BetMode, Bounds, GameSession, SoundCue, Toast, ToastLevel, UiEvent};
use skyrocket_types::{ClientMessage, SeatId};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const LOG_CAPACITY: usize = 200;
pub const TOAST_TTL: Duration = Duration::from_secs(3);
pub const CUE_TTL: Duration = Duration::from_millis(600);

const AMOUNT_STEP: f64 = 10.0;
const THRESHOLD_STEP: f64 = 0.1;

#[derive(Clone, Debug, PartialEq)]
pub enum Link {
    Connecting,
    Online,
    Reconnecting { attempt: u32, delay: Duration },
    Offline { reason: String },
}

impl Link {
    pub fn label(&self) -> String {
        match self {
            Link::Connecting => "connecting".to_string(),
            Link::Online => "online".to_string(),
            Link::Reconnecting { attempt, delay } => {
                format!("reconnecting #{attempt} in {:.1}s", delay.as_secs_f64())
            }
            Link::Offline { reason } => format!("offline: {reason}"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct LogLine {
    pub at: String,
    pub level: ToastLevel,
    pub text: String,
}

pub struct App {
    pub session: GameSession,
    pub link: Link,
    pub selected: SeatId,
    pub log: VecDeque<LogLine>,
    pub toast: Option<(Toast, Instant)>,
    pub cue: Option<(SoundCue, Instant)>,
    pub stars: StarField,
    pub bounds: Bounds,
    pub verbose: bool,
    pub started: Instant,
    resize: ResizeDebouncer,
    quit: bool,
}

impl App {
    pub fn new(session: GameSession, bounds: Bounds, stars: StarField, verbose: bool, now: Instant) -> Self {
        let mut session = session;
        session.resize(bounds);
        Self {
            session,
            link: Link::Connecting,
            selected: SeatId::FIRST,
            log: VecDeque::new(),
            toast: None,
            cue: None,
            stars,
            bounds,
            verbose,
            started: now,
            resize: ResizeDebouncer::default(),
            quit: false,
        }
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    pub fn push_log(&mut self, level: ToastLevel, text: impl Into<String>) {
        if self.log.len() == LOG_CAPACITY {
            self.log.pop_front();
        }
        self.log.push_back(LogLine {
            at: Local::now().format("%H:%M:%S").to_string(),
            level,
            text: text.into(),
        });
    }

    pub fn on_connection(&mut self, event: ConnectionEvent, now: Instant) {
        match event {
            ConnectionEvent::Connected => {
                self.link = Link::Online;
                self.push_log(ToastLevel::Info, "Connected");
            }
            ConnectionEvent::Authenticated => self.push_log(ToastLevel::Success, "Authenticated"),
            ConnectionEvent::AuthenticationRejected => {
                self.session.teardown();
                self.link = Link::Offline {
                    reason: "authentication rejected".to_string(),
                };
                self.push_log(ToastLevel::Error, "Authentication rejected by server");
            }
            ConnectionEvent::GameSelected { tag } => {
                self.push_log(ToastLevel::Info, format!("Joined game {tag}"));
            }
            ConnectionEvent::GameUnavailable { tag } => {
                self.push_log(ToastLevel::Warning, format!("Game {tag} is not offered by the server"));
            }
            ConnectionEvent::Inbound(inbound) => {
                if self.verbose {
                    self.push_log(ToastLevel::Info, format!("<- {:?}", inbound.event));
                }
                self.session.handle(inbound, now);
            }
            ConnectionEvent::Reconnecting { attempt, delay } => {
                self.session.teardown();
                self.link = Link::Reconnecting { attempt, delay };
                self.push_log(
                    ToastLevel::Warning,
                    format!("Connection lost, retry {attempt} in {:.1}s", delay.as_secs_f64()),
                );
            }
            ConnectionEvent::Disconnected { refresh_required } => {
                self.session.teardown();
                let reason = if refresh_required {
                    "gave up reconnecting, restart to play"
                } else {
                    "closed"
                };
                self.link = Link::Offline {
                    reason: reason.to_string(),
                };
                self.push_log(ToastLevel::Error, format!("Disconnected: {reason}"));
            }
        }
    }

    pub fn on_terminal_event(&mut self, event: Event, now: Instant) {
        match event {
            Event::Key(key) => self.on_key(key),
            Event::Resize(cols, rows) => self.on_resize(cols, rows, now),
            Event::FocusGained => self.session.set_visible(true, now),
            Event::FocusLost => self.session.set_visible(false, now),
            _ => {}
        }
    }

    pub fn on_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        let seat = self.selected;
        let result: Result<(), ActionError> = match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.quit = true;
                Ok(())
            }
            KeyCode::Char('q') | KeyCode::Esc => {
                self.quit = true;
                Ok(())
            }
            KeyCode::Char('1') => self.press(SeatId::FIRST),
            KeyCode::Char('2') => self.press(SeatId::SECOND),
            KeyCode::Char(' ') | KeyCode::Enter => self.press(seat),
            KeyCode::Tab | KeyCode::BackTab => {
                self.selected = other_seat(seat);
                Ok(())
            }
            KeyCode::Char('+') | KeyCode::Char('=') => {
                self.session.adjust_amount(seat, 2.0).map(|_| ())
            }
            KeyCode::Char('-') => self.session.adjust_amount(seat, 0.5).map(|_| ()),
            KeyCode::Up => {
                let amount = self.session.seat(seat).amount() + AMOUNT_STEP;
                self.session.set_amount(seat, amount).map(|_| ())
            }
            KeyCode::Down => {
                let amount = self.session.seat(seat).amount() - AMOUNT_STEP;
                self.session.set_amount(seat, amount).map(|_| ())
            }
            KeyCode::Char('m') => {
                let mode = match self.session.seat(seat).mode() {
                    BetMode::Manual => BetMode::Auto,
                    BetMode::Auto => BetMode::Manual,
                };
                self.session.set_mode(seat, mode);
                Ok(())
            }
            KeyCode::Char('a') => {
                let bet = self.session.seat(seat);
                let (threshold, enabled) = (bet.auto_cashout_threshold(), bet.auto_cashout_enabled());
                self.session
                    .set_auto_cashout(seat, threshold, !enabled)
                    .map(|_| ())
            }
            KeyCode::Char(']') => self.nudge_threshold(seat, THRESHOLD_STEP),
            KeyCode::Char('[') => self.nudge_threshold(seat, -THRESHOLD_STEP),
            KeyCode::Char('v') => {
                self.verbose = !self.verbose;
                Ok(())
            }
            _ => Ok(()),
        };
        if let Err(err) = result {
            debug!(%seat, %err, "action refused");
            self.push_log(ToastLevel::Warning, err.to_string());
        }
    }

    fn press(&mut self, seat: SeatId) -> Result<(), ActionError> {
        self.selected = seat;
        self.session.press(seat)
    }

    fn nudge_threshold(&mut self, seat: SeatId, step: f64) -> Result<(), ActionError> {
        let bet = self.session.seat(seat);
        let (threshold, enabled) = (bet.auto_cashout_threshold(), bet.auto_cashout_enabled());
        self.session
            .set_auto_cashout(seat, threshold + step, enabled)
            .map(|_| ())
    }

    pub fn on_resize(&mut self, cols: u16, rows: u16, now: Instant) {
        self.resize
            .push(ui::flight_bounds(Rect::new(0, 0, cols, rows)), now);
    }

    /// Per-frame work: apply a settled resize, advance the session and
    /// turn its events into log lines.
    pub fn on_frame(&mut self, now: Instant) {
        if let Some(bounds) = self.resize.poll(now) {
            debug!(width = bounds.width, height = bounds.height, "canvas resized");
            self.bounds = bounds;
            self.session.resize(bounds);
        }
        self.session.tick(now);

        for event in self.session.drain_events() {
            match event {
                UiEvent::Toast(toast) => {
                    self.push_log(toast.level, toast.message.clone());
                    self.toast = Some((toast, now));
                }
                UiEvent::Sound(cue) => {
                    debug!(?cue, "sound cue");
                    self.cue = Some((cue, now));
                }
                UiEvent::Overlay(Some(text)) => info!(%text, "overlay shown"),
                UiEvent::Overlay(None) => {}
            }
        }

        if self
            .toast
            .as_ref()
            .is_some_and(|(_, at)| now.saturating_duration_since(*at) >= TOAST_TTL)
        {
            self.toast = None;
        }
        if self
            .cue
            .as_ref()
            .is_some_and(|(_, at)| now.saturating_duration_since(*at) >= CUE_TTL)
        {
            self.cue = None;
        }
    }

    pub fn drain_outbox(&mut self) -> Vec<ClientMessage> {
        let outbox = self.session.drain_outbox();
        if !outbox.is_empty() {
            debug!(count = outbox.len(), "flushing requests");
        }
        outbox
    }

    /// Persist bet settings on exit.
    pub fn save_snapshot(&mut self, now_ms: u64) {
        match self.session.save_snapshot(now_ms) {
            Ok(true) => info!("session snapshot saved"),
            Ok(false) => {}
            Err(err) => warn!(%err, "failed to save session snapshot"),
        }
    }
}

fn other_seat(seat: SeatId) -> SeatId {
    if seat == SeatId::FIRST {
        SeatId::SECOND
    } else {
        SeatId::FIRST
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use skyrocket_engine::mocks::{self, ManualClock};
    use skyrocket_engine::{ButtonState, SessionConfig};

    fn app(clock: &ManualClock) -> App {
        let bounds = Bounds::new(800.0, 600.0);
        let session = GameSession::new(SessionConfig::default());
        let stars = StarField::new(16, &mut StdRng::seed_from_u64(7));
        App::new(session, bounds, stars, false, clock.now())
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_quit_keys() {
        let clock = ManualClock::new();
        for event in [
            key(KeyCode::Char('q')),
            key(KeyCode::Esc),
            KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL),
        ] {
            let mut app = app(&clock);
            app.on_key(event);
            assert!(app.should_quit());
        }
        let mut app = app(&clock);
        app.on_key(key(KeyCode::Char('c')));
        assert!(!app.should_quit());
    }

    #[test]
    fn test_amount_keys_target_selected_seat() {
        let clock = ManualClock::new();
        let mut app = app(&clock);
        app.on_key(key(KeyCode::Tab));
        assert_eq!(app.selected, SeatId::SECOND);

        app.on_key(key(KeyCode::Up));
        assert_eq!(app.session.seat(SeatId::SECOND).amount(), 110.0);
        app.on_key(key(KeyCode::Char('+')));
        assert_eq!(app.session.seat(SeatId::SECOND).amount(), 220.0);
        app.on_key(key(KeyCode::Char('-')));
        app.on_key(key(KeyCode::Down));
        assert_eq!(app.session.seat(SeatId::SECOND).amount(), 100.0);
        assert_eq!(app.session.seat(SeatId::FIRST).amount(), 100.0);
    }

    #[test]
    fn test_auto_cashout_keys() {
        let clock = ManualClock::new();
        let mut app = app(&clock);
        let before = app.session.seat(SeatId::FIRST).auto_cashout_threshold();
        app.on_key(key(KeyCode::Char('a')));
        assert!(app.session.seat(SeatId::FIRST).auto_cashout_enabled());
        app.on_key(key(KeyCode::Char(']')));
        let after = app.session.seat(SeatId::FIRST).auto_cashout_threshold();
        assert!((after - (before + 0.1)).abs() < 1e-9);

        app.on_key(key(KeyCode::Char('m')));
        assert_eq!(app.session.seat(SeatId::FIRST).mode(), BetMode::Auto);
    }

    #[test]
    fn test_refused_action_is_logged() {
        let clock = ManualClock::new();
        let mut app = app(&clock);
        // No round message yet
        app.on_key(key(KeyCode::Char('1')));
        assert_eq!(app.log.len(), 1);
        assert_eq!(app.log[0].level, ToastLevel::Warning);
        assert!(app.drain_outbox().is_empty());
    }

    #[test]
    fn test_bet_key_queues_request() {
        let clock = ManualClock::new();
        let mut app = app(&clock);
        app.on_connection(ConnectionEvent::Inbound(mocks::pause(5.0)), clock.now());
        app.on_key(key(KeyCode::Char('2')));
        assert_eq!(app.selected, SeatId::SECOND);
        // bet_options then bet
        assert_eq!(app.drain_outbox().len(), 2);
        assert_eq!(
            app.session.seat(SeatId::SECOND).button_state(),
            ButtonState::AwaitingPlacement
        );
    }

    #[test]
    fn test_toasts_become_log_lines_and_expire() {
        let mut clock = ManualClock::new();
        let mut app = app(&clock);
        app.on_key(key(KeyCode::Char('1')));
        app.log.clear();

        app.on_connection(ConnectionEvent::Inbound(mocks::pause(5.0)), clock.now());
        app.on_key(key(KeyCode::Char('1')));
        app.on_connection(
            ConnectionEvent::Inbound(mocks::bet_rejected(SeatId::FIRST, "no_funds")),
            clock.now(),
        );
        app.on_frame(clock.advance(Duration::from_millis(16)));
        assert!(app.toast.is_some());
        assert!(!app.log.is_empty());

        app.on_frame(clock.advance(TOAST_TTL));
        assert!(app.toast.is_none());
    }

    #[test]
    fn test_connection_loss_tears_down_session() {
        let clock = ManualClock::new();
        let mut app = app(&clock);
        app.on_connection(ConnectionEvent::Connected, clock.now());
        assert_eq!(app.link, Link::Online);
        app.on_connection(ConnectionEvent::Inbound(mocks::pause(5.0)), clock.now());
        app.on_key(key(KeyCode::Char('1')));

        let delay = Duration::from_secs(2);
        app.on_connection(ConnectionEvent::Reconnecting { attempt: 1, delay }, clock.now());
        assert_eq!(app.link, Link::Reconnecting { attempt: 1, delay });
        assert!(app.drain_outbox().is_empty());

        app.on_connection(
            ConnectionEvent::Disconnected {
                refresh_required: true,
            },
            clock.now(),
        );
        assert!(matches!(app.link, Link::Offline { .. }));
        assert!(app.link.label().contains("restart"));
    }

    #[test]
    fn test_resize_is_debounced() {
        let mut clock = ManualClock::new();
        let mut app = app(&clock);
        let original = app.bounds;
        app.on_resize(120, 40, clock.now());
        app.on_frame(clock.advance(Duration::from_millis(16)));
        assert_eq!(app.bounds, original);

        app.on_frame(clock.advance(Duration::from_millis(200)));
        assert_eq!(app.bounds, ui::flight_bounds(Rect::new(0, 0, 120, 40)));
    }

    #[test]
    fn test_log_is_bounded() {
        let clock = ManualClock::new();
        let mut app = app(&clock);
        for i in 0..LOG_CAPACITY + 5 {
            app.push_log(ToastLevel::Info, format!("line {i}"));
        }
        assert_eq!(app.log.len(), LOG_CAPACITY);
        assert_eq!(app.log[0].text, "line 5");
    }
}
