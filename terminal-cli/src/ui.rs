//! Drawing. Everything here reads [`App`] and never mutates it.

use crate::app::{App, Link};
use rand::Rng;
use ratatui::layout::{Alignment, Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::symbols::Marker;
use ratatui::text::{Line, Span};
use ratatui::widgets::canvas::{Canvas, Context, Line as Segment, Points};
use ratatui::widgets::{Block, Borders, List, ListItem, Paragraph};
use ratatui::Frame;
use skyrocket_engine::trajectory::target_pose;
use skyrocket_engine::{AnimatorState, Bounds, SeatView, Settlement, SoundCue, ToastLevel};
use skyrocket_types::{format_multiplier, MultiplierBand, RoundPhase};
use std::f64::consts::{FRAC_PI_4, TAU};
use std::time::Instant;

/// Canvas units per terminal cell. Cells are about twice as tall as wide.
const CELL_WIDTH: f64 = 8.0;
const CELL_HEIGHT: f64 = 16.0;

const TRAIL_SAMPLES: usize = 48;
const ROCKET_LENGTH: f64 = 36.0;
const HISTORY_SHOWN: usize = 12;

struct Areas {
    header: Rect,
    flight: Rect,
    history: Rect,
    ledger: Rect,
    log: Rect,
    seats: [Rect; 2],
    footer: Rect,
}

fn layout(area: Rect) -> Areas {
    let [header, body, seats, footer] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(10),
        Constraint::Length(6),
        Constraint::Length(1),
    ])
    .areas(area);
    let [flight, side] =
        Layout::horizontal([Constraint::Percentage(70), Constraint::Percentage(30)]).areas(body);
    let [history, ledger, log] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Length(8),
        Constraint::Min(3),
    ])
    .areas(side);
    let [first, second] =
        Layout::horizontal([Constraint::Percentage(50), Constraint::Percentage(50)]).areas(seats);
    Areas {
        header,
        flight,
        history,
        ledger,
        log,
        seats: [first, second],
        footer,
    }
}

/// Canvas size for a terminal of `area`, in the units the engine lays the
/// trajectory out in.
pub fn flight_bounds(area: Rect) -> Bounds {
    let flight = layout(area).flight;
    let cols = flight.width.saturating_sub(2).max(1);
    let rows = flight.height.saturating_sub(2).max(1);
    Bounds::new(cols as f64 * CELL_WIDTH, rows as f64 * CELL_HEIGHT)
}

#[derive(Clone, Debug)]
struct Star {
    x: f64,
    y: f64,
    phase: f64,
    rate: f64,
}

/// Twinkling background, stored in unit coordinates so resizes only rescale.
#[derive(Clone, Debug)]
pub struct StarField {
    stars: Vec<Star>,
}

impl StarField {
    pub fn new(count: usize, rng: &mut impl Rng) -> Self {
        let stars = (0..count)
            .map(|_| Star {
                x: rng.gen(),
                y: rng.gen(),
                phase: rng.gen_range(0.0..TAU),
                rate: rng.gen_range(0.5..2.0),
            })
            .collect();
        Self { stars }
    }

    pub fn len(&self) -> usize {
        self.stars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stars.is_empty()
    }

    /// Dim and bright star positions at `t` seconds, in canvas coordinates.
    pub fn points(&self, bounds: &Bounds, t: f64) -> (Vec<(f64, f64)>, Vec<(f64, f64)>) {
        let mut dim = Vec::new();
        let mut bright = Vec::new();
        for star in &self.stars {
            let point = (star.x * bounds.width, star.y * bounds.height);
            if (t * star.rate + star.phase).sin() > 0.6 {
                bright.push(point);
            } else {
                dim.push(point);
            }
        }
        (dim, bright)
    }
}

/// The path flown so far, sampled from the launch point up to `multiplier`.
/// Canvas y grows upward, the engine's downward.
pub fn trail(multiplier: f64, bounds: &Bounds) -> Vec<(f64, f64)> {
    if !multiplier.is_finite() || multiplier <= 1.0 {
        return Vec::new();
    }
    (0..=TRAIL_SAMPLES)
        .map(|i| {
            let m = 1.0 + (multiplier - 1.0) * i as f64 / TRAIL_SAMPLES as f64;
            let position = target_pose(m, bounds).position;
            (position.x, bounds.height - position.y)
        })
        .collect()
}

pub fn draw(frame: &mut Frame, app: &App, now: Instant) {
    let areas = layout(frame.area());
    let display = app.session.display(now);

    draw_header(frame, areas.header, app, &display.status, display.balance, display.currency.as_deref());
    draw_flight(frame, areas.flight, app, &display, now);
    draw_history(frame, areas.history, app);
    draw_ledger(frame, areas.ledger, app);
    draw_log(frame, areas.log, app);
    for (area, seat) in areas.seats.iter().zip(display.seats.iter()) {
        draw_seat(frame, *area, app, seat);
    }

    let help = "q quit  1/2 bet  tab seat  +/- x2  up/down +-10  m mode  a auto  [ ] target  v verbose";
    frame.render_widget(
        Paragraph::new(help).style(Style::default().fg(Color::DarkGray)),
        areas.footer,
    );
}

fn draw_header(
    frame: &mut Frame,
    area: Rect,
    app: &App,
    status: &str,
    balance: Option<f64>,
    currency: Option<&str>,
) {
    let link_color = match app.link {
        Link::Online => Color::Green,
        Link::Connecting | Link::Reconnecting { .. } => Color::Yellow,
        Link::Offline { .. } => Color::Red,
    };
    let balance = match (balance, currency) {
        (Some(amount), Some(_)) => app.session.money(amount),
        (Some(amount), None) => format!("{amount:.2}"),
        _ => "-".to_string(),
    };
    let mut spans = vec![
        Span::styled(" SKYROCKET ", Style::default().add_modifier(Modifier::BOLD)),
        Span::styled(format!("[{}] ", app.link.label()), Style::default().fg(link_color)),
        Span::raw(format!("{status}  ")),
        Span::styled(format!("balance {balance}"), Style::default().fg(Color::Cyan)),
    ];
    if let Some(name) = app.session.profile().name.as_deref() {
        spans.push(Span::raw(format!("  {name}")));
    }
    if let Some((cue, _)) = app.cue {
        spans.push(Span::styled(
            format!("  {}", cue_label(cue)),
            Style::default().fg(Color::Magenta),
        ));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn cue_label(cue: SoundCue) -> &'static str {
    match cue {
        SoundCue::Launch => "~ launch ~",
        SoundCue::Pause => "~ next round ~",
        SoundCue::Crash => "~ boom ~",
        SoundCue::CashOut => "~ ka-ching ~",
    }
}

fn draw_flight(
    frame: &mut Frame,
    area: Rect,
    app: &App,
    display: &skyrocket_engine::DisplayState,
    now: Instant,
) {
    let bounds = app.bounds;
    let t = now.saturating_duration_since(app.started).as_secs_f64();
    let (dim, bright) = app.stars.points(&bounds, t);
    let flying = matches!(display.phase, RoundPhase::Started | RoundPhase::InProgress);
    let path = if flying && !display.rocket.crashing {
        trail(display.multiplier, &bounds)
    } else {
        Vec::new()
    };
    let multiplier_color = match display.phase {
        RoundPhase::Crashed => Color::Red,
        RoundPhase::InProgress => band_color(MultiplierBand::of(display.multiplier)),
        _ => Color::Gray,
    };
    let countdown = display.countdown.map(|c| format!("Next round in {c:.1}s"));

    let canvas = Canvas::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" round {} ", app.session.round().round_counter)),
        )
        .marker(Marker::Braille)
        .x_bounds([0.0, bounds.width])
        .y_bounds([0.0, bounds.height])
        .paint(|ctx| {
            ctx.draw(&Points {
                coords: &dim,
                color: Color::DarkGray,
            });
            ctx.draw(&Points {
                coords: &bright,
                color: Color::White,
            });
            ctx.layer();

            for pair in path.windows(2) {
                ctx.draw(&Segment::new(pair[0].0, pair[0].1, pair[1].0, pair[1].1, Color::Yellow));
            }
            if display.rocket.visible {
                draw_rocket(ctx, &display.rocket, &bounds);
            }
            ctx.layer();

            print_centered(
                ctx,
                &bounds,
                0.6,
                Line::styled(
                    display.multiplier_text.clone(),
                    Style::default()
                        .fg(multiplier_color)
                        .add_modifier(Modifier::BOLD),
                ),
            );
            if let Some(overlay) = &display.overlay {
                print_centered(
                    ctx,
                    &bounds,
                    0.5,
                    Line::styled(
                        overlay.clone(),
                        Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                    ),
                );
            }
            if let Some(text) = &countdown {
                print_centered(
                    ctx,
                    &bounds,
                    0.4,
                    Line::styled(text.clone(), Style::default().fg(Color::Yellow)),
                );
            }
        });
    frame.render_widget(canvas, area);
}

fn print_centered(ctx: &mut Context<'_>, bounds: &Bounds, height: f64, line: Line<'static>) {
    let x = (bounds.width - line.width() as f64 * CELL_WIDTH) / 2.0;
    ctx.print(x.max(0.0), bounds.height * height, line);
}

fn draw_rocket(ctx: &mut Context<'_>, rocket: &AnimatorState, bounds: &Bounds) {
    let nose = (rocket.position.x, bounds.height - rocket.position.y);
    let angle = rocket.rotation - FRAC_PI_4;
    let (dx, dy) = (angle.cos(), -angle.sin());
    let tail = (nose.0 - dx * ROCKET_LENGTH, nose.1 - dy * ROCKET_LENGTH);
    let color = if rocket.crashing {
        Color::Red
    } else if rocket.alpha < 0.6 {
        Color::DarkGray
    } else {
        Color::White
    };
    ctx.draw(&Segment::new(tail.0, tail.1, nose.0, nose.1, color));

    if rocket.active && !rocket.crashing {
        let flame = (
            tail.0 - dx * ROCKET_LENGTH * 0.4,
            tail.1 - dy * ROCKET_LENGTH * 0.4,
        );
        ctx.draw(&Segment::new(flame.0, flame.1, tail.0, tail.1, Color::LightRed));
    }
}

fn band_color(band: MultiplierBand) -> Color {
    match band {
        MultiplierBand::Low => Color::LightBlue,
        MultiplierBand::Medium => Color::LightMagenta,
        MultiplierBand::High => Color::LightYellow,
    }
}

fn draw_history(frame: &mut Frame, area: Rect, app: &App) {
    let spans: Vec<Span> = app
        .session
        .history()
        .iter()
        .take(HISTORY_SHOWN)
        .map(|entry| {
            Span::styled(
                format!("{} ", format_multiplier(entry.multiplier)),
                Style::default().fg(band_color(entry.band)),
            )
        })
        .collect();
    let widget = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL).title(" history "));
    frame.render_widget(widget, area);
}

fn draw_ledger(frame: &mut Frame, area: Rect, app: &App) {
    let items: Vec<ListItem> = app
        .session
        .ledger()
        .iter()
        .rev()
        .map(|entry| {
            let (text, color) = match entry.outcome {
                Settlement::CashedOut => (
                    format!(
                        "{} {} @ {} +{}",
                        entry.seat,
                        app.session.money(entry.amount),
                        format_multiplier(entry.multiplier),
                        app.session.money(entry.payout)
                    ),
                    Color::Green,
                ),
                Settlement::Lost => (
                    format!(
                        "{} {} lost at {}",
                        entry.seat,
                        app.session.money(entry.amount),
                        format_multiplier(entry.multiplier)
                    ),
                    Color::Red,
                ),
            };
            ListItem::new(text).style(Style::default().fg(color))
        })
        .collect();
    let widget = List::new(items).block(Block::default().borders(Borders::ALL).title(" my bets "));
    frame.render_widget(widget, area);
}

fn level_color(level: ToastLevel) -> Color {
    match level {
        ToastLevel::Info => Color::Gray,
        ToastLevel::Success => Color::Green,
        ToastLevel::Warning => Color::Yellow,
        ToastLevel::Error => Color::Red,
    }
}

fn draw_log(frame: &mut Frame, area: Rect, app: &App) {
    let visible = area.height.saturating_sub(2) as usize;
    let items: Vec<ListItem> = app
        .log
        .iter()
        .rev()
        .take(visible)
        .map(|line| {
            ListItem::new(format!("{} {}", line.at, line.text))
                .style(Style::default().fg(level_color(line.level)))
        })
        .collect();
    let title = match &app.toast {
        Some((toast, _)) => Line::styled(
            format!(" {} ", toast.message),
            Style::default().fg(level_color(toast.level)),
        ),
        None => Line::raw(" log "),
    };
    let widget = List::new(items).block(Block::default().borders(Borders::ALL).title(title));
    frame.render_widget(widget, area);
}

fn draw_seat(frame: &mut Frame, area: Rect, app: &App, seat: &SeatView) {
    let selected = seat.seat == app.selected;
    let border = if selected {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    };
    let button_style = if seat.button.is_actionable() {
        Style::default().fg(Color::Black).bg(Color::Green)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let button = match seat.cashout_value {
        Some(value) => format!(" {} {} ", seat.button.label(), app.session.money(value)),
        None => format!(" {} ", seat.button.label()),
    };
    let auto = if seat.auto_cashout_enabled {
        format!("auto cash-out at {}", format_multiplier(seat.auto_cashout_threshold))
    } else {
        format!("auto cash-out off ({})", format_multiplier(seat.auto_cashout_threshold))
    };
    let lines = vec![
        Line::from(vec![
            Span::raw("stake "),
            Span::styled(
                app.session.money(seat.amount),
                Style::default().add_modifier(Modifier::BOLD),
            ),
            Span::raw(format!("  mode {:?}", seat.mode)),
        ]),
        Line::raw(auto),
        Line::from(Span::styled(button, button_style)),
    ];
    let widget = Paragraph::new(lines).alignment(Alignment::Center).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(border)
            .title(format!(" {} ", seat.seat)),
    );
    frame.render_widget(widget, area);
}
