//! Input handling for the TUI.
//!
//! The readout has no write access of its own: refreshes go to the poll
//! loop, closing and preference toggles go to the host.

use anyhow::{Context, Result};
use crossterm::event::{KeyCode, KeyModifiers};

use super::{Action, Controls};
use crate::app::App;
use crate::bridge::TrayAction;
use crate::monitor::{LoopCommand, Trigger};
use crate::storage::PreferenceKey;

pub(super) async fn handle_input(
    app: &mut App,
    code: KeyCode,
    modifiers: KeyModifiers,
    controls: &Controls,
) -> Result<Action> {
    match code {
        KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => Ok(Action::Quit),
        KeyCode::Char('q') | KeyCode::Esc => Ok(Action::Quit),
        KeyCode::Char('r') | KeyCode::F(5) => {
            if app.fetching.is_some() {
                app.set_status("Already fetching");
                return Ok(Action::Continue);
            }
            controls
                .commands
                .send(LoopCommand::Refresh(Trigger::User))
                .await
                .context("Poll loop is not running")?;
            Ok(Action::Continue)
        }
        KeyCode::Char('x') => {
            match controls.bridge.request_close() {
                Ok(()) => app.set_status("Close requested"),
                Err(e) => app.set_status(format!("Cannot close: {}", e)),
            }
            Ok(Action::Continue)
        }
        KeyCode::Char(c @ '1'..='3') => {
            let key = PreferenceKey::ALL[c as usize - '1' as usize];
            controls
                .tray
                .send(TrayAction::Toggle(key))
                .await
                .context("Host is not running")?;
            app.set_status(format!("Toggling \"{}\"", key.menu_label()));
            Ok(Action::Continue)
        }
        _ => Ok(Action::Continue),
    }
}
