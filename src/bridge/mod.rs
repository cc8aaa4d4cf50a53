//! Capability-scoped channel between the privileged host and the
//! unprivileged presentation surface.
//!
//! The host holds secrets, the preference record and the desktop shell
//! (window, tray icon, notifications). The presentation side runs the poll
//! loop and renders; it can only ask the host for things through
//! [`BridgeClient`], and learns about host-side changes through [`Push`]
//! messages.
//!
//! # Module Structure
//!
//! - `protocol` - serializable requests, responses and pushes
//! - `client` - presentation-side handle and push routing
//! - `host` - request dispatch, capability checks and tray actions
//! - `shell` - the OS effects the host mediates

mod client;
mod host;
mod protocol;
mod shell;

pub use client::{channel, spawn_push_router, BridgeClient, BridgeError, HostPort};
pub use host::{Host, HostExit, SecretSource, TrayAction};
pub use protocol::{Capability, Envelope, Push, Request, Response};
pub use shell::{DesktopShell, LogShell};

/// Environment variable (and secret name) holding the feed API token.
pub const TOKEN_SECRET: &str = "AQI_API_TOKEN";
