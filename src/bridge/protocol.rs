//! Messages exchanged between the host and the presentation surface.
//!
//! Every message is an owned, serializable value; nothing that crosses the
//! bridge refers to host-side state.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::oneshot;

use crate::aqi::AqiIndex;
use crate::storage::PreferenceKey;

/// One independently revocable permission of the presentation side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    ReadSecret,
    SetStatusIcon,
    Notify,
    ReadPreference,
    RequestClose,
}

impl Capability {
    pub const ALL: [Capability; 5] = [
        Capability::ReadSecret,
        Capability::SetStatusIcon,
        Capability::Notify,
        Capability::ReadPreference,
        Capability::RequestClose,
    ];
}

/// presentation → host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Request {
    GetSecret { name: String },
    SetStatusIcon { index: AqiIndex },
    Notify { title: String, body: String },
    GetPreference { name: String },
    RequestClose,
}

impl Request {
    pub fn capability(&self) -> Capability {
        match self {
            Request::GetSecret { .. } => Capability::ReadSecret,
            Request::SetStatusIcon { .. } => Capability::SetStatusIcon,
            Request::Notify { .. } => Capability::Notify,
            Request::GetPreference { .. } => Capability::ReadPreference,
            Request::RequestClose => Capability::RequestClose,
        }
    }
}

/// host → presentation, in reply to a [`Request`]
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Response {
    Secret { value: Option<String> },
    Ack,
    Delivered { delivered: bool },
    Preference { value: Option<bool> },
    Denied { capability: Capability },
}

/// Secrets never reach logs through `{:?}`.
impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Secret { value } => f
                .debug_struct("Secret")
                .field("value", &value.as_ref().map(|_| "[REDACTED]"))
                .finish(),
            Response::Ack => f.write_str("Ack"),
            Response::Delivered { delivered } => f
                .debug_struct("Delivered")
                .field("delivered", delivered)
                .finish(),
            Response::Preference { value } => {
                f.debug_struct("Preference").field("value", value).finish()
            }
            Response::Denied { capability } => f
                .debug_struct("Denied")
                .field("capability", capability)
                .finish(),
        }
    }
}

/// Unsolicited host → presentation messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Push {
    RefreshNow,
    PreferenceChanged { name: PreferenceKey, value: bool },
}

/// A request in flight. Fire-and-forget requests carry no reply slot.
#[derive(Debug)]
pub struct Envelope {
    pub request: Request,
    pub reply: Option<oneshot::Sender<Response>>,
}
