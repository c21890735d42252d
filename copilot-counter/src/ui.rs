//! UI rendering for the dashboard.

use copilot_counter_core::diagnostics::{DiagnosticEntry, DiagnosticLevel};
use copilot_counter_core::{AttributionMode, DashboardStats};
use ratatui::{
    layout::{Alignment, Constraint, Flex, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Clear, Paragraph},
    Frame,
};

use crate::app::App;

// ========== Dashboard Colors ==========

/// Card values and the active histogram bar
const ACCENT: Color = Color::Rgb(0, 200, 200);
/// Total card value
const TOTAL_GOLD: Color = Color::Rgb(255, 215, 0);
/// Past days in the histogram
const BAR_PAST: Color = Color::Rgb(80, 160, 80);
/// Dim gray for secondary text
const DIM: Color = Color::Rgb(128, 128, 128);
/// Panel borders
const BORDER: Color = Color::Rgb(0, 150, 150);
/// Reset confirmation border
const BORDER_WARN: Color = Color::Rgb(255, 127, 80);

const BAR_GLYPH: &str = "█";

/// Render the application UI.
pub fn render(frame: &mut Frame, app: &App) {
    let area = frame.area();

    // Layout: header, cards, histogram, live log, footer
    let chunks = Layout::vertical([
        Constraint::Length(2), // Header
        Constraint::Length(5), // Today / total cards
        Constraint::Length(9), // 7-day histogram
        Constraint::Min(5),    // Live log
        Constraint::Length(1), // Footer
    ])
    .split(area);

    render_header(frame, app, chunks[0]);

    match &app.stats {
        Some(stats) => {
            render_cards(frame, stats, chunks[1]);
            render_histogram(frame, stats, chunks[2]);
            render_log(frame, &stats.diagnostics, chunks[3]);
        }
        None => {
            let loading = Paragraph::new("Loading...")
                .style(Style::default().fg(DIM))
                .alignment(Alignment::Center);
            frame.render_widget(loading, chunks[1]);
        }
    }

    render_footer(frame, app, chunks[4]);

    if app.is_confirming_reset() {
        render_reset_confirm(frame, area);
    }
}

/// Render the header with title, attribution mode and pending tokens.
fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let mut spans = vec![Span::styled(
        " Copilot Counter",
        Style::default().fg(Color::Cyan).bold(),
    )];

    if let Some(stats) = &app.stats {
        spans.push(Span::styled("  │  mode ", Style::default().fg(DIM)));
        spans.push(Span::styled(
            stats.mode.display_name(),
            Style::default().fg(mode_color(stats.mode)).bold(),
        ));
        spans.push(Span::styled("  │  tokens ", Style::default().fg(DIM)));
        spans.push(Span::styled(
            stats.pending_tokens.to_string(),
            Style::default().fg(ACCENT),
        ));
        spans.push(Span::styled("  │  last ", Style::default().fg(DIM)));
        spans.push(Span::raw(stats.format_last_classification()));
    }

    let header =
        Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::BOTTOM));
    frame.render_widget(header, area);
}

fn mode_color(mode: AttributionMode) -> Color {
    match mode {
        AttributionMode::Auto => Color::Green,
        AttributionMode::ForceOn => Color::Yellow,
        AttributionMode::ForceOff => Color::Red,
    }
}

/// Render the Today and Total cards side by side.
fn render_cards(frame: &mut Frame, stats: &DashboardStats, area: Rect) {
    let chunks =
        Layout::horizontal([Constraint::Percentage(50), Constraint::Percentage(50)]).split(area);

    render_card(
        frame,
        " Today ",
        stats.today,
        &stats.date_key(),
        ACCENT,
        chunks[0],
    );
    render_card(frame, " Total ", stats.total, "all time", TOTAL_GOLD, chunks[1]);
}

fn render_card(frame: &mut Frame, title: &str, value: u64, caption: &str, color: Color, area: Rect) {
    let block = Block::default()
        .title(title)
        .title_style(Style::default().fg(color).bold())
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(BORDER));

    let lines = vec![
        Line::from(Span::styled(
            value.to_string(),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(caption.to_string(), Style::default().fg(DIM))),
    ];

    let card = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .block(block);
    frame.render_widget(card, area);
}

/// Render the last seven days as horizontal bars, today last.
fn render_histogram(frame: &mut Frame, stats: &DashboardStats, area: Rect) {
    let block = Block::default()
        .title(" Last 7 days ")
        .title_style(Style::default().fg(ACCENT).bold())
        .title_bottom(Line::from(format!(" {} ", stats.format_max_hint())).right_aligned())
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(BORDER));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    // "MM-DD " label, bar, " count"
    let count_width = stats.max_daily().to_string().len() + 1;
    let bar_space = (inner.width as usize).saturating_sub(6 + count_width);

    let last = stats.daily.len().saturating_sub(1);
    let lines: Vec<Line> = stats
        .daily
        .iter()
        .enumerate()
        .map(|(i, day)| {
            let color = if i == last { ACCENT } else { BAR_PAST };
            let width = bar_space * stats.bar_percent(day.count) as usize / 100;
            Line::from(vec![
                Span::styled(format!("{} ", day.label()), Style::default().fg(DIM)),
                Span::styled(BAR_GLYPH.repeat(width), Style::default().fg(color)),
                Span::raw(format!(" {}", day.count)),
            ])
        })
        .collect();

    frame.render_widget(Paragraph::new(lines), inner);
}

/// Render the live diagnostic log, newest entry at the bottom.
fn render_log(frame: &mut Frame, entries: &[DiagnosticEntry], area: Rect) {
    let block = Block::default()
        .title(" Live log ")
        .title_style(Style::default().fg(ACCENT).bold())
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(BORDER));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    if entries.is_empty() {
        let empty = Paragraph::new("Waiting for requests and events...")
            .style(Style::default().fg(DIM));
        frame.render_widget(empty, inner);
        return;
    }

    let skip = entries.len().saturating_sub(inner.height as usize);
    let lines: Vec<Line> = entries
        .iter()
        .skip(skip)
        .map(|entry| {
            Line::from(Span::styled(
                entry.format_line(),
                Style::default().fg(level_color(entry.level)),
            ))
        })
        .collect();

    frame.render_widget(Paragraph::new(lines), inner);
}

fn level_color(level: DiagnosticLevel) -> Color {
    match level {
        DiagnosticLevel::Debug => DIM,
        DiagnosticLevel::Info => Color::Reset,
        DiagnosticLevel::Warn => Color::Yellow,
    }
}

fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
    let key_style = Style::default().fg(ACCENT).bold();
    let label_style = Style::default().fg(Color::DarkGray);
    let separator = Span::styled("  │  ", Style::default().fg(Color::DarkGray));

    let mut spans = vec![
        Span::styled(" ", Style::default()),
        Span::styled("[r]", key_style),
        Span::styled(" Reset  ", label_style),
        separator.clone(),
        Span::styled("[m]", key_style),
        Span::styled(" Mode  ", label_style),
        separator.clone(),
        Span::styled("[q]", key_style),
        Span::styled(" Close", label_style),
    ];

    if let Some(status) = &app.status {
        spans.push(separator);
        spans.push(Span::styled(status.clone(), Style::default().fg(Color::Green)));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// Centered confirmation dialog for reset.
fn render_reset_confirm(frame: &mut Frame, area: Rect) {
    let [popup] = Layout::vertical([Constraint::Length(5)])
        .flex(Flex::Center)
        .areas(area);
    let [popup] = Layout::horizontal([Constraint::Length(44)])
        .flex(Flex::Center)
        .areas(popup);

    let block = Block::default()
        .title(" Reset counter ")
        .title_style(Style::default().fg(BORDER_WARN).bold())
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(BORDER_WARN));

    let text = vec![
        Line::from("Reset today and total to zero?"),
        Line::from(vec![
            Span::styled("[y]", Style::default().fg(BORDER_WARN).bold()),
            Span::raw(" yes   "),
            Span::styled("[n]", Style::default().fg(ACCENT).bold()),
            Span::raw(" no"),
        ]),
    ];

    frame.render_widget(Clear, popup);
    frame.render_widget(
        Paragraph::new(text).alignment(Alignment::Center).block(block),
        popup,
    );
}
