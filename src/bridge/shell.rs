use tokio::sync::watch;

use crate::aqi::IconSelector;

/// OS-level effects only the host may perform: window visibility, the tray
/// icon, notifications and process exit.
pub trait DesktopShell: Send + 'static {
    fn show_window(&mut self);
    fn hide_window(&mut self);
    fn set_tray_icon(&mut self, icon: IconSelector, tooltip: &str);
    /// Returns whether the notification was shown.
    fn show_notification(&mut self, title: &str, body: &str) -> bool;
    fn quit(&mut self);
}

/// Shell for environments without native window/tray integration: effects
/// are logged, and `quit` raises the process shutdown signal.
pub struct LogShell {
    shutdown: watch::Sender<bool>,
    window_visible: bool,
}

impl LogShell {
    pub fn new(shutdown: watch::Sender<bool>) -> Self {
        Self {
            shutdown,
            window_visible: false,
        }
    }

    pub fn window_visible(&self) -> bool {
        self.window_visible
    }
}

impl DesktopShell for LogShell {
    fn show_window(&mut self) {
        self.window_visible = true;
        tracing::info!("Window shown");
    }

    fn hide_window(&mut self) {
        self.window_visible = false;
        tracing::info!("Window hidden to tray");
    }

    fn set_tray_icon(&mut self, icon: IconSelector, tooltip: &str) {
        tracing::info!(icon = %icon, tooltip = %tooltip, "Tray icon updated");
    }

    fn show_notification(&mut self, title: &str, body: &str) -> bool {
        tracing::warn!(title = %title, body = %body, "Air quality notification");
        true
    }

    fn quit(&mut self) {
        tracing::info!("Quit requested");
        let _ = self.shutdown.send(true);
    }
}
