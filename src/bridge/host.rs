//! The privileged side of the bridge.
//!
//! The host owns the preference record, the secrets and the desktop shell.
//! It answers presentation requests according to the capabilities it has
//! granted and handles tray actions, pushing the resulting changes back.

use secrecy::{ExposeSecret, SecretString};
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::client::HostPort;
use super::protocol::{Capability, Envelope, Push, Request, Response};
use super::shell::DesktopShell;
use crate::aqi::classify;
use crate::storage::{PreferenceKey, PreferenceStore, Preferences};

/// Named secrets the presentation side may read. Environment variables win
/// over configured fallbacks; names not registered here read as unset.
#[derive(Default)]
pub struct SecretSource {
    allowed: HashMap<String, Option<SecretString>>,
}

impl SecretSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow(mut self, name: &str, fallback: Option<SecretString>) -> Self {
        self.allowed.insert(name.to_string(), fallback);
        self
    }

    pub fn get(&self, name: &str) -> Option<String> {
        let Some(fallback) = self.allowed.get(name) else {
            tracing::warn!(name = %name, "Refusing to expose unregistered secret");
            return None;
        };
        std::env::var(name)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| fallback.as_ref().map(|s| s.expose_secret().to_string()))
    }
}

/// Actions from the tray menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrayAction {
    Toggle(PreferenceKey),
    RefreshNow,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostExit {
    /// The application was asked to quit.
    Quit,
    /// The presentation side dropped its end of the bridge.
    Disconnected,
}

pub struct Host<S: DesktopShell> {
    shell: S,
    prefs: PreferenceStore,
    secrets: SecretSource,
    granted: HashSet<Capability>,
}

impl<S: DesktopShell> Host<S> {
    /// A host granting every capability.
    pub fn new(shell: S, prefs: PreferenceStore, secrets: SecretSource) -> Self {
        Self {
            shell,
            prefs,
            secrets,
            granted: Capability::ALL.into_iter().collect(),
        }
    }

    pub fn revoke(&mut self, capability: Capability) {
        self.granted.remove(&capability);
    }

    pub fn grant(&mut self, capability: Capability) {
        self.granted.insert(capability);
    }

    pub fn preferences(&self) -> Preferences {
        self.prefs.current()
    }

    pub fn shell(&self) -> &S {
        &self.shell
    }

    /// Serves the bridge until the application quits or the presentation side
    /// disconnects.
    pub async fn run(mut self, port: HostPort, mut tray: mpsc::Receiver<TrayAction>) -> HostExit {
        let HostPort {
            mut requests,
            pushes,
        } = port;

        if self.prefs.get(PreferenceKey::ShowWindowOnStartup) {
            self.shell.show_window();
        } else {
            tracing::info!("Starting hidden in tray");
        }

        let mut tray_open = true;
        loop {
            tokio::select! {
                envelope = requests.recv() => {
                    let Some(envelope) = envelope else {
                        tracing::debug!("Presentation side disconnected");
                        return HostExit::Disconnected;
                    };
                    if self.dispatch(envelope) == Some(HostExit::Quit) {
                        return HostExit::Quit;
                    }
                }

                action = tray.recv(), if tray_open => {
                    match action {
                        Some(action) => {
                            if self.handle_tray(action, &pushes) == Some(HostExit::Quit) {
                                return HostExit::Quit;
                            }
                        }
                        None => tray_open = false,
                    }
                }
            }
        }
    }

    fn dispatch(&mut self, envelope: Envelope) -> Option<HostExit> {
        let Envelope { request, reply } = envelope;

        if !self.granted.contains(&request.capability()) {
            tracing::warn!(capability = ?request.capability(), "Denied bridge request");
            if let Some(reply) = reply {
                let _ = reply.send(Response::Denied {
                    capability: request.capability(),
                });
            }
            return None;
        }

        if request == Request::RequestClose {
            return self.close();
        }

        let response = self.respond(request);
        if let Some(reply) = reply {
            if reply.send(response).is_err() {
                tracing::debug!("Requester went away before reply");
            }
        }
        None
    }

    /// Answers one granted request. `request-close` is handled by
    /// [`Host::close`].
    pub fn respond(&mut self, request: Request) -> Response {
        match request {
            Request::GetSecret { name } => Response::Secret {
                value: self.secrets.get(&name),
            },
            Request::SetStatusIcon { index } => {
                let c = classify(index);
                let tooltip = format!("AQI {} ({})", index, c.label());
                self.shell.set_tray_icon(c.icon(), &tooltip);
                Response::Ack
            }
            Request::Notify { title, body } => {
                let delivered = if self.prefs.get(PreferenceKey::NotifyOnHighSeverity) {
                    self.shell.show_notification(&title, &body)
                } else {
                    tracing::debug!("Notifications disabled, dropping request");
                    false
                };
                Response::Delivered { delivered }
            }
            Request::GetPreference { name } => Response::Preference {
                value: name.parse::<PreferenceKey>().ok().map(|k| self.prefs.get(k)),
            },
            Request::RequestClose => Response::Ack,
        }
    }

    /// Hide to tray or quit, per the current preference.
    pub fn close(&mut self) -> Option<HostExit> {
        if self.prefs.get(PreferenceKey::MinimizeToTrayOnClose) {
            self.shell.hide_window();
            None
        } else {
            self.shell.quit();
            Some(HostExit::Quit)
        }
    }

    /// Pushes never wait: the host must keep answering requests even when
    /// the presentation side is not draining its push queue.
    fn handle_tray(
        &mut self,
        action: TrayAction,
        pushes: &mpsc::Sender<Push>,
    ) -> Option<HostExit> {
        let push = match action {
            TrayAction::Toggle(key) => {
                let value = self.prefs.toggle(key);
                tracing::info!(key = %key, value, "Preference toggled from tray");
                Push::PreferenceChanged { name: key, value }
            }
            TrayAction::RefreshNow => Push::RefreshNow,
            TrayAction::Quit => {
                self.shell.quit();
                return Some(HostExit::Quit);
            }
        };

        match pushes.try_send(push) {
            Ok(()) => {}
            Err(TrySendError::Full(push)) => {
                tracing::warn!(?push, "Push queue full, push dropped");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!("Presentation side gone, push dropped");
            }
        }
        None
    }
}
