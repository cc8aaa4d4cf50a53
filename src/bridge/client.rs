use secrecy::SecretString;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use super::protocol::{Capability, Envelope, Push, Request, Response};
use crate::aqi::AqiIndex;
use crate::monitor::{LoopCommand, Trigger};
use crate::storage::{PreferenceKey, Preferences};

/// Failures of a bridge round-trip. Callers degrade the one feature that
/// needed the host and carry on.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BridgeError {
    /// The host side is gone or never answered.
    #[error("Host is not reachable")]
    Unavailable,
    /// The host revoked the capability this request needs.
    #[error("Capability {0:?} is not granted")]
    Denied(Capability),
    #[error("Unexpected reply to {0}")]
    UnexpectedResponse(&'static str),
}

/// Host end of a bridge: incoming requests and the push sender.
pub struct HostPort {
    pub requests: mpsc::Receiver<Envelope>,
    pub pushes: mpsc::Sender<Push>,
}

/// Creates a connected bridge.
///
/// Returns the presentation-side client, the presentation-side push
/// receiver, and the host port.
pub fn channel(buffer: usize) -> (BridgeClient, mpsc::Receiver<Push>, HostPort) {
    let (req_tx, req_rx) = mpsc::channel(buffer);
    let (push_tx, push_rx) = mpsc::channel(buffer);
    (
        BridgeClient { requests: req_tx },
        push_rx,
        HostPort {
            requests: req_rx,
            pushes: push_tx,
        },
    )
}

/// Presentation-side handle to the host. Cheap to clone.
#[derive(Clone)]
pub struct BridgeClient {
    requests: mpsc::Sender<Envelope>,
}

impl BridgeClient {
    async fn call(&self, request: Request) -> Result<Response, BridgeError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.requests
            .send(Envelope {
                request,
                reply: Some(reply_tx),
            })
            .await
            .map_err(|_| BridgeError::Unavailable)?;

        match reply_rx.await.map_err(|_| BridgeError::Unavailable)? {
            Response::Denied { capability } => Err(BridgeError::Denied(capability)),
            response => Ok(response),
        }
    }

    /// Reads a named secret held by the host. `Ok(None)` if it is unset.
    pub async fn get_secret(&self, name: &str) -> Result<Option<SecretString>, BridgeError> {
        match self
            .call(Request::GetSecret {
                name: name.to_string(),
            })
            .await?
        {
            Response::Secret { value } => Ok(value.map(SecretString::from)),
            _ => Err(BridgeError::UnexpectedResponse("get-secret")),
        }
    }

    pub async fn set_status_icon(&self, index: AqiIndex) -> Result<(), BridgeError> {
        match self.call(Request::SetStatusIcon { index }).await? {
            Response::Ack => Ok(()),
            _ => Err(BridgeError::UnexpectedResponse("set-status-icon")),
        }
    }

    /// Asks the host to show a notification. Returns whether it was shown;
    /// the host re-checks the notification preference itself.
    pub async fn notify(&self, title: &str, body: &str) -> Result<bool, BridgeError> {
        match self
            .call(Request::Notify {
                title: title.to_string(),
                body: body.to_string(),
            })
            .await?
        {
            Response::Delivered { delivered } => Ok(delivered),
            _ => Err(BridgeError::UnexpectedResponse("notify")),
        }
    }

    pub async fn get_preference(&self, key: PreferenceKey) -> Result<bool, BridgeError> {
        match self
            .call(Request::GetPreference {
                name: key.name().to_string(),
            })
            .await?
        {
            Response::Preference { value: Some(value) } => Ok(value),
            _ => Err(BridgeError::UnexpectedResponse("get-preference")),
        }
    }

    /// Snapshot of all preferences. Fields the host will not answer keep
    /// their defaults.
    pub async fn load_preferences(&self) -> Preferences {
        let mut prefs = Preferences::default();
        for key in PreferenceKey::ALL {
            match self.get_preference(key).await {
                Ok(value) => prefs.set(key, value),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Preference unavailable, using default");
                }
            }
        }
        prefs
    }

    /// Fire-and-forget close request; the host decides between hiding and
    /// quitting.
    pub fn request_close(&self) -> Result<(), BridgeError> {
        self.requests
            .try_send(Envelope {
                request: Request::RequestClose,
                reply: None,
            })
            .map_err(|_| BridgeError::Unavailable)
    }
}

/// Routes host pushes on the presentation side: preference changes update
/// the shared cache, refresh pushes become poll-loop triggers.
pub fn spawn_push_router(
    mut pushes: mpsc::Receiver<Push>,
    prefs: watch::Sender<Preferences>,
    commands: mpsc::Sender<LoopCommand>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(push) = pushes.recv().await {
            match push {
                Push::RefreshNow => {
                    if commands
                        .send(LoopCommand::Refresh(Trigger::External))
                        .await
                        .is_err()
                    {
                        tracing::debug!("Poll loop gone, stopping push router");
                        break;
                    }
                }
                Push::PreferenceChanged { name, value } => {
                    tracing::debug!(key = %name, value, "Preference changed on host");
                    prefs.send_modify(|p| p.set(name, value));
                }
            }
        }
    })
}
