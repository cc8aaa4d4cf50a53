use crate::app::App;
use ratatui::{
    layout::Rect,
    style::{Color, Style},
    widgets::Paragraph,
    Frame,
};
use std::borrow::Cow;
use std::time::Duration;

const KEY_HINTS: &str = "[r]efresh [x]close [1-3]settings [q]uit";

/// Render the status bar
pub fn render(f: &mut Frame, app: &App, area: Rect) {
    if area.width < 1 || area.height < 1 {
        return;
    }

    let (text, style): (Cow<'_, str>, Style) = if app.fetching.is_some() {
        (Cow::Borrowed("Fetching..."), normal())
    } else if let Some((msg, _)) = &app.status_message {
        (Cow::Borrowed(&**msg), normal())
    } else if let Some(error) = &app.last_error {
        let retry = match app.retry_countdown() {
            Some(d) => format!(" | retry in {}", format_countdown(d)),
            None => String::new(),
        };
        (
            Cow::Owned(format!("{}{} | {}", error, retry, KEY_HINTS)),
            Style::default().bg(Color::Red).fg(Color::White),
        )
    } else if let Some(next) = app.next_poll_countdown() {
        (
            Cow::Owned(format!("{} | next update in {}", KEY_HINTS, format_countdown(next))),
            normal(),
        )
    } else {
        (Cow::Borrowed(KEY_HINTS), normal())
    };

    f.render_widget(Paragraph::new(text).style(style), area);
}

fn normal() -> Style {
    Style::default().bg(Color::DarkGray).fg(Color::White)
}

fn format_countdown(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}
