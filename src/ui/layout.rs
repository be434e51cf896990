use super::format_metric;
use crate::app::App;
use crate::speedtest::{Snapshot, TestPhase};
use ratatui::{
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Paragraph},
    Frame,
};

// Color Palette
const ACCENT: Color = Color::Rgb(59, 130, 246);
const ACCENT_DIM: Color = Color::Rgb(40, 70, 120);
const SUCCESS: Color = Color::Rgb(134, 194, 156);
const INFO: Color = Color::Rgb(147, 180, 220);
const WARN: Color = Color::Rgb(220, 180, 130);
const DANGER: Color = Color::Rgb(230, 110, 110);
const TEXT_PRIMARY: Color = Color::Rgb(230, 230, 230);
const TEXT_SECONDARY: Color = Color::Rgb(160, 160, 160);
const TEXT_MUTED: Color = Color::Rgb(100, 100, 100);
const BORDER: Color = Color::Rgb(60, 60, 65);
const BORDER_ACTIVE: Color = Color::Rgb(100, 100, 110);

const GAUGE_MAX_MBPS: f64 = 1000.0;
const GAUGE_MAX_MS: f64 = 200.0;

pub fn draw_ui(frame: &mut Frame, app: &App) {
    let chunks = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(7),
        Constraint::Length(1),
        Constraint::Length(5),
        Constraint::Length(1),
        Constraint::Length(1),
    ])
    .split(frame.area());

    let snap = &app.snapshot;
    draw_header(frame, chunks[0], snap);
    draw_gauge(frame, chunks[1], snap);
    draw_progress_bar(frame, chunks[2], snap.progress, ACCENT, ACCENT_DIM);
    draw_metric_cards(frame, chunks[3], snap);
    draw_message(frame, chunks[4], snap);
    draw_help(frame, chunks[5], app);
}

fn draw_header(frame: &mut Frame, area: Rect, snap: &Snapshot) {
    let block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(Style::default().fg(BORDER));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let chunks = Layout::horizontal([
        Constraint::Length(10),
        Constraint::Min(10),
        Constraint::Length(26),
    ])
    .split(inner);

    let title = Paragraph::new("cfspeed")
        .style(Style::default().fg(TEXT_PRIMARY).add_modifier(Modifier::BOLD));
    frame.render_widget(title, chunks[0]);

    let (status, color) = match &snap.phase {
        TestPhase::Idle => ("Ready", TEXT_MUTED),
        TestPhase::MeasuringDownload => ("Testing download...", SUCCESS),
        TestPhase::MeasuringUpload => ("Testing upload...", INFO),
        TestPhase::MeasuringPing => ("Measuring latency...", WARN),
        TestPhase::Done => ("Complete", ACCENT),
        TestPhase::Error(_) => ("Failed", DANGER),
    };
    frame.render_widget(
        Paragraph::new(status)
            .style(Style::default().fg(color))
            .alignment(Alignment::Center),
        chunks[1],
    );

    frame.render_widget(
        Paragraph::new(phase_chips(snap)).alignment(Alignment::Right),
        chunks[2],
    );
}

/// "down / up / ping" with the active phase highlighted and finished phases dimmed.
fn phase_chips(snap: &Snapshot) -> Line<'static> {
    let chips = [
        (TestPhase::MeasuringDownload, "down", snap.result.download.is_some()),
        (TestPhase::MeasuringUpload, "up", snap.result.upload.is_some()),
        (TestPhase::MeasuringPing, "ping", snap.result.ping.is_some()),
    ];

    let count = chips.len();
    let mut spans = Vec::new();
    for (i, (phase, label, done)) in chips.into_iter().enumerate() {
        let style = if snap.phase == phase {
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)
        } else if done {
            Style::default().fg(TEXT_SECONDARY)
        } else {
            Style::default().fg(TEXT_MUTED)
        };
        spans.push(Span::styled(label, style));
        if i < count - 1 {
            spans.push(Span::styled(" / ", Style::default().fg(TEXT_MUTED)));
        }
    }

    Line::from(spans)
}

fn draw_gauge(frame: &mut Frame, area: Rect, snap: &Snapshot) {
    let reading = GaugeReading::from_snapshot(snap);
    let border = if snap.phase.is_running() { BORDER_ACTIVE } else { BORDER };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border))
        .title(Span::styled(
            format!(" {} ", reading.label),
            Style::default().fg(TEXT_SECONDARY),
        ));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let chunks = Layout::vertical([
        Constraint::Min(1),
        Constraint::Length(2),
        Constraint::Length(1),
    ])
    .split(inner);

    let value = if reading.pending {
        "…".to_string()
    } else {
        format_gauge_value(reading.value, reading.unit)
    };
    let text = Line::from(vec![
        Span::styled(value, Style::default().fg(TEXT_PRIMARY).add_modifier(Modifier::BOLD)),
        Span::styled(format!(" {}", reading.unit), Style::default().fg(TEXT_SECONDARY)),
    ]);
    frame.render_widget(Paragraph::new(text).alignment(Alignment::Center), chunks[1]);

    let gauge = Gauge::default()
        .gauge_style(Style::default().fg(ACCENT).bg(BORDER))
        .ratio(reading.ratio())
        .label("");
    frame.render_widget(gauge, chunks[2]);
}

fn draw_progress_bar(frame: &mut Frame, area: Rect, ratio: f64, color: Color, dim_color: Color) {
    if area.width < 4 {
        return;
    }

    let width = (area.width - 2) as usize;
    let filled = ((ratio * width as f64) as usize).min(width);
    let empty = width.saturating_sub(filled);

    let bar = Line::from(vec![
        Span::raw(" "),
        Span::styled("━".repeat(filled), Style::default().fg(color)),
        Span::styled("━".repeat(empty), Style::default().fg(dim_color)),
        Span::raw(" "),
    ]);

    frame.render_widget(Paragraph::new(bar), area);
}

fn draw_metric_cards(frame: &mut Frame, area: Rect, snap: &Snapshot) {
    let cards = Layout::horizontal([
        Constraint::Ratio(1, 3),
        Constraint::Ratio(1, 3),
        Constraint::Ratio(1, 3),
    ])
    .split(area);

    draw_metric_card(frame, cards[0], "Download", snap.result.download, "Mbps", SUCCESS);
    draw_metric_card(frame, cards[1], "Upload", snap.result.upload, "Mbps", INFO);
    draw_metric_card(frame, cards[2], "Ping", snap.result.ping, "ms", WARN);
}

fn draw_metric_card(frame: &mut Frame, area: Rect, title: &str, value: Option<f64>, unit: &str, color: Color) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(BORDER))
        .title(Span::styled(format!(" {} ", title), Style::default().fg(color)));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let rows = Layout::vertical([Constraint::Length(1), Constraint::Min(0)]).split(inner);
    let (text, style) = match value {
        Some(v) => (
            format_metric(v, unit),
            Style::default().fg(TEXT_PRIMARY).add_modifier(Modifier::BOLD),
        ),
        None => ("—".to_string(), Style::default().fg(TEXT_MUTED)),
    };

    frame.render_widget(Paragraph::new(text).style(style).alignment(Alignment::Center), rows[0]);
}

fn draw_message(frame: &mut Frame, area: Rect, snap: &Snapshot) {
    if let TestPhase::Error(message) = &snap.phase {
        frame.render_widget(
            Paragraph::new(message.as_str())
                .style(Style::default().fg(DANGER))
                .alignment(Alignment::Center),
            area,
        );
    }
}

fn draw_help(frame: &mut Frame, area: Rect, app: &App) {
    let help = match app.snapshot.phase {
        TestPhase::Error(_) => "r retry · enter start · q quit",
        _ if app.is_running() => "enter/esc stop · q quit",
        _ => "enter start · q quit",
    };

    frame.render_widget(
        Paragraph::new(help)
            .style(Style::default().fg(TEXT_MUTED))
            .alignment(Alignment::Center),
        area,
    );
}

/// What the big gauge shows for a given snapshot.
#[derive(Debug, PartialEq)]
struct GaugeReading {
    value: f64,
    unit: &'static str,
    label: &'static str,
    max: f64,
    /// Ping phase started but no value yet.
    pending: bool,
}

impl GaugeReading {
    fn from_snapshot(snap: &Snapshot) -> Self {
        let speed = |value: f64, label: &'static str| Self { value, unit: "Mbps", label, max: GAUGE_MAX_MBPS, pending: false };
        let latency = |value: Option<f64>| Self {
            value: value.unwrap_or(0.0),
            unit: "ms",
            label: "Ping",
            max: GAUGE_MAX_MS,
            pending: value.is_none(),
        };

        match &snap.phase {
            TestPhase::MeasuringDownload => speed(snap.live_speed, "Download"),
            TestPhase::MeasuringUpload => speed(snap.live_speed, "Upload"),
            TestPhase::MeasuringPing => latency(snap.result.ping),
            TestPhase::Done => match snap.result.ping {
                Some(_) => latency(snap.result.ping),
                None => speed(snap.result.download.unwrap_or(0.0), "Download"),
            },
            TestPhase::Idle | TestPhase::Error(_) => speed(0.0, "Download"),
        }
    }

    fn ratio(&self) -> f64 {
        (self.value / self.max).clamp(0.0, 1.0)
    }
}

fn format_gauge_value(value: f64, unit: &str) -> String {
    if unit == "ms" {
        return if value >= 1.0 { format!("{:.0}", value) } else { "–".to_string() };
    }
    if value >= 100.0 {
        format!("{:.0}", value)
    } else if value >= 1.0 {
        format!("{:.1}", value)
    } else if value > 0.0 {
        format!("{:.2}", value)
    } else {
        "0".to_string()
    }
}
