//! Durable user preferences.
//!
//! The record is a flat JSON object of three booleans. The host process is
//! its only writer; the presentation side sees snapshots over the bridge.
//! Loading never fails: a missing or unreadable record yields the defaults.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use super::atomic::{read_json, write_json_atomic};
use super::PersistenceError;

// ============================================================================
// Preferences
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Preferences {
    /// Raise an OS notification when the category enters a high band.
    pub notify_on_high_severity: bool,
    /// Show the readout window at launch instead of starting in the tray.
    pub show_window_on_startup: bool,
    /// Closing the window hides it to the tray instead of quitting.
    pub minimize_to_tray_on_close: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            notify_on_high_severity: true,
            show_window_on_startup: true,
            minimize_to_tray_on_close: true,
        }
    }
}

impl Preferences {
    pub fn get(&self, key: PreferenceKey) -> bool {
        match key {
            PreferenceKey::NotifyOnHighSeverity => self.notify_on_high_severity,
            PreferenceKey::ShowWindowOnStartup => self.show_window_on_startup,
            PreferenceKey::MinimizeToTrayOnClose => self.minimize_to_tray_on_close,
        }
    }

    pub fn set(&mut self, key: PreferenceKey, value: bool) {
        match key {
            PreferenceKey::NotifyOnHighSeverity => self.notify_on_high_severity = value,
            PreferenceKey::ShowWindowOnStartup => self.show_window_on_startup = value,
            PreferenceKey::MinimizeToTrayOnClose => self.minimize_to_tray_on_close = value,
        }
    }
}

/// Names of the preference fields, as used on the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PreferenceKey {
    NotifyOnHighSeverity,
    ShowWindowOnStartup,
    MinimizeToTrayOnClose,
}

impl PreferenceKey {
    pub const ALL: [PreferenceKey; 3] = [
        PreferenceKey::NotifyOnHighSeverity,
        PreferenceKey::ShowWindowOnStartup,
        PreferenceKey::MinimizeToTrayOnClose,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PreferenceKey::NotifyOnHighSeverity => "notifyOnHighSeverity",
            PreferenceKey::ShowWindowOnStartup => "showWindowOnStartup",
            PreferenceKey::MinimizeToTrayOnClose => "minimizeToTrayOnClose",
        }
    }

    /// Label for tray menu entries.
    pub fn menu_label(self) -> &'static str {
        match self {
            PreferenceKey::NotifyOnHighSeverity => "Notify on high AQI",
            PreferenceKey::ShowWindowOnStartup => "Show window on startup",
            PreferenceKey::MinimizeToTrayOnClose => "Minimize to tray on close",
        }
    }
}

impl fmt::Display for PreferenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown preference {0:?}")]
pub struct UnknownPreference(pub String);

impl FromStr for PreferenceKey {
    type Err = UnknownPreference;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| UnknownPreference(s.to_string()))
    }
}

// ============================================================================
// PreferenceStore
// ============================================================================

/// In-memory preferences backed by a JSON file. Every change rewrites the
/// whole record.
pub struct PreferenceStore {
    path: PathBuf,
    current: Preferences,
}

impl PreferenceStore {
    /// Load the record at `path`, falling back to defaults when it is missing
    /// or malformed.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let current = match read_json::<Preferences>(&path) {
            Ok(Some(prefs)) => prefs,
            Ok(None) => {
                tracing::debug!(path = %path.display(), "No preference record, using defaults");
                Preferences::default()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Unreadable preference record, using defaults");
                Preferences::default()
            }
        };
        Self { path, current }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn current(&self) -> Preferences {
        self.current
    }

    pub fn get(&self, key: PreferenceKey) -> bool {
        self.current.get(key)
    }

    /// Update one field and persist the record.
    ///
    /// Returns whether the value changed. A failed write is logged and the
    /// in-memory value is kept; preferences never fail the caller.
    pub fn set(&mut self, key: PreferenceKey, value: bool) -> bool {
        if self.current.get(key) == value {
            return false;
        }
        self.current.set(key, value);
        if let Err(e) = self.save() {
            tracing::warn!(error = %e, key = %key, "Failed to persist preference change");
        }
        true
    }

    pub fn toggle(&mut self, key: PreferenceKey) -> bool {
        let value = !self.get(key);
        self.set(key, value);
        value
    }

    pub fn save(&self) -> Result<(), PersistenceError> {
        write_json_atomic(&self.path, &self.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_all_true() {
        let prefs = Preferences::default();
        for key in PreferenceKey::ALL {
            assert!(prefs.get(key), "{} should default to true", key);
        }
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = PreferenceStore::load(dir.path().join("preferences.json"));
        assert_eq!(store.current(), Preferences::default());
    }

    #[test]
    fn test_corrupt_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.json");
        std::fs::write(&path, "{{{ nope").unwrap();
        let store = PreferenceStore::load(&path);
        assert_eq!(store.current(), Preferences::default());
    }

    #[test]
    fn test_partial_record_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.json");
        std::fs::write(&path, r#"{"minimizeToTrayOnClose": false}"#).unwrap();
        let store = PreferenceStore::load(&path);
        assert!(store.get(PreferenceKey::NotifyOnHighSeverity));
        assert!(!store.get(PreferenceKey::MinimizeToTrayOnClose));
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.json");

        let mut store = PreferenceStore::load(&path);
        assert!(store.set(PreferenceKey::NotifyOnHighSeverity, false));

        let reloaded = PreferenceStore::load(&path);
        assert_eq!(
            reloaded.current(),
            Preferences {
                notify_on_high_severity: false,
                show_window_on_startup: true,
                minimize_to_tray_on_close: true,
            }
        );
    }

    #[test]
    fn test_set_unchanged_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.json");
        let mut store = PreferenceStore::load(&path);
        assert!(!store.set(PreferenceKey::ShowWindowOnStartup, true));
        assert!(!path.exists());
    }

    #[test]
    fn test_save_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("preferences.json");
        let mut store = PreferenceStore::load(&path);
        store.toggle(PreferenceKey::MinimizeToTrayOnClose);
        assert!(path.exists());
    }

    #[test]
    fn test_key_names_round_trip() {
        for key in PreferenceKey::ALL {
            assert_eq!(key.name().parse::<PreferenceKey>().unwrap(), key);
            let json = serde_json::to_string(&key).unwrap();
            assert_eq!(json, format!("\"{}\"", key.name()));
        }
        assert!("theme".parse::<PreferenceKey>().is_err());
    }

    #[test]
    fn test_unknown_preference_error() {
        let err = "theme".parse::<PreferenceKey>().unwrap_err();
        assert_eq!(err, UnknownPreference("theme".to_string()));
        assert_eq!(err.to_string(), "unknown preference \"theme\"");
        let boxed: Box<dyn std::error::Error> = Box::new(err);
        assert!(boxed.source().is_none());
    }
}
