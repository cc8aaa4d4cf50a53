use crate::app::App;
use crate::aqi::Snapshot;
use crate::storage::PreferenceKey;
use crate::util::truncate_to_width;
use chrono::Local;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

/// Render the current reading and the preference panel.
pub fn render(f: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(5)])
        .split(area);

    let inner_width = chunks[0].width.saturating_sub(2) as usize;
    let lines = match &app.reading {
        Some(snapshot) => reading_lines(snapshot, inner_width),
        None => vec![Line::from(Span::styled(
            "Waiting for first reading...",
            Style::default().fg(Color::DarkGray),
        ))],
    };

    let reading = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(" Air quality "))
        .wrap(Wrap { trim: true });
    f.render_widget(reading, chunks[0]);

    let prefs = app.preferences();
    let pref_lines: Vec<Line> = PreferenceKey::ALL
        .iter()
        .enumerate()
        .map(|(i, key)| {
            let (mark, style) = if prefs.get(*key) {
                ("on ", Style::default().fg(Color::Green))
            } else {
                ("off", Style::default().fg(Color::DarkGray))
            };
            Line::from(vec![
                Span::raw(format!("[{}] ", i + 1)),
                Span::styled(mark, style),
                Span::raw(format!(" {}", key.menu_label())),
            ])
        })
        .collect();
    let panel =
        Paragraph::new(pref_lines).block(Block::default().borders(Borders::ALL).title(" Settings "));
    f.render_widget(panel, chunks[1]);
}

fn reading_lines(snapshot: &Snapshot, width: usize) -> Vec<Line<'static>> {
    let color = hex_color(&snapshot.color);
    let observation = &snapshot.observation;

    let mut lines = vec![
        Line::from(vec![
            Span::styled(
                format!("AQI {}", observation.index),
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            ),
            Span::raw("  "),
            Span::styled(snapshot.label.clone(), Style::default().fg(color)),
        ]),
        Line::from(if snapshot.available {
            snapshot.category.advisory()
        } else {
            "The station is not reporting an index right now."
        }),
        Line::default(),
        Line::from(truncate_to_width(&observation.location, width).into_owned()),
        Line::from(Span::styled(
            format!(
                "Observed {}",
                observation
                    .observed_at
                    .with_timezone(&Local)
                    .format("%Y-%m-%d %H:%M")
            ),
            Style::default().fg(Color::DarkGray),
        )),
    ];

    if !observation.particulates.is_empty() {
        lines.push(Line::default());
        for (name, value) in &observation.particulates {
            lines.push(Line::from(format!("{:<6} {:>6.1}", name, value)));
        }
    }
    lines
}

/// Parses `#rrggbb`; anything else renders grey.
fn hex_color(hex: &str) -> Color {
    let digits = hex.trim_start_matches('#');
    if digits.len() != 6 {
        return Color::Gray;
    }
    match u32::from_str_radix(digits, 16) {
        Ok(rgb) => Color::Rgb((rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8),
        Err(_) => Color::Gray,
    }
}
