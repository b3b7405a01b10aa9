use std::io;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::event::{DisableFocusChange, EnableFocusChange, EventStream as TermEvents};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use futures::StreamExt;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::Rect;
use ratatui::Terminal;
use skyrocket_client::{connect, ConnectionConfig, WsConnector};
use skyrocket_engine::scheduler::FRAME_INTERVAL;
use skyrocket_engine::{Backend, GameSession, SessionConfig, SnapshotStore};
use tokio::select;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

mod app;
mod config;
mod ui;

use app::App;
use config::{load_config, log_dir, save_config, snapshot_path, Args, Settings};
use ui::StarField;

const STAR_COUNT: usize = 120;

type Tui = Terminal<CrosstermBackend<io::Stdout>>;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let cfg = load_config().unwrap_or_default();
    let settings = Settings::resolve(&args, &cfg);
    save_config(&settings.persisted())?;

    // The TUI owns stdout, so logs go to a file
    let _guard = init_logging(settings.verbose)?;
    info!(endpoint = %settings.endpoint, game = %settings.game, "starting");
    let connection = settings.connection()?;

    let (cols, rows) = crossterm::terminal::size().context("query terminal size")?;
    let bounds = ui::flight_bounds(Rect::new(0, 0, cols, rows));
    let backend = if settings.animation {
        Backend::Smooth
    } else {
        Backend::Null
    };
    let mut session = GameSession::new(SessionConfig { backend, bounds });
    if let Some(path) = snapshot_path() {
        session = session.with_snapshot_store(SnapshotStore::new(path));
        if let Some(notice) = session.load_snapshot(now_ms()) {
            info!(?notice, "restored session snapshot");
        }
    }
    let stars = StarField::new(STAR_COUNT, &mut rand::thread_rng());
    let app = App::new(session, bounds, stars, settings.verbose, Instant::now());

    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    crossterm::execute!(stdout, crossterm::terminal::EnterAlternateScreen, EnableFocusChange)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let result = run(&mut terminal, app, connection).await;

    disable_raw_mode()?;
    crossterm::execute!(
        terminal.backend_mut(),
        DisableFocusChange,
        crossterm::terminal::LeaveAlternateScreen,
        crossterm::cursor::Show
    )?;
    terminal.show_cursor()?;
    result
}

async fn run(terminal: &mut Tui, mut app: App, config: ConnectionConfig) -> Result<()> {
    let (handle, mut connection) = connect(WsConnector::default(), config);
    let mut keys = TermEvents::new();
    let mut frames = tokio::time::interval(FRAME_INTERVAL);
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut connection_open = true;

    loop {
        select! {
            event = connection.next(), if connection_open => match event {
                Some(event) => app.on_connection(event, Instant::now()),
                None => {
                    info!("connection task finished");
                    connection_open = false;
                }
            },
            maybe_ev = keys.next() => match maybe_ev {
                Some(Ok(ev)) => app.on_terminal_event(ev, Instant::now()),
                Some(Err(err)) => warn!(%err, "terminal event error"),
                None => break,
            },
            _ = frames.tick() => {
                let now = Instant::now();
                app.on_frame(now);
                terminal.draw(|f| ui::draw(f, &app, now))?;
            }
        }

        for message in app.drain_outbox() {
            if let Err(err) = handle.send(message) {
                warn!(%err, "request dropped");
            }
        }
        if app.should_quit() {
            break;
        }
    }

    handle.shutdown();
    app.save_snapshot(now_ms());
    info!("bye");
    Ok(())
}

fn init_logging(verbose: bool) -> Result<Option<WorkerGuard>> {
    let Some(dir) = log_dir() else {
        return Ok(None);
    };
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("create log directory {}", dir.display()))?;
    let appender = tracing_appender::rolling::daily(dir, "skyrocket-terminal.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(Some(guard))
}

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
