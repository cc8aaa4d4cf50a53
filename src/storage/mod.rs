//! Local persistence: the preference record and atomic JSON file helpers.

mod atomic;
mod preferences;

use std::path::{Path, PathBuf};
use thiserror::Error;

pub use atomic::{read_json, write_json_atomic};
pub use preferences::{PreferenceKey, PreferenceStore, Preferences, UnknownPreference};

/// Failure to read or write a local record. Callers recover from these
/// (defaults on load, best effort on save); they are never shown to the user.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl PersistenceError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
