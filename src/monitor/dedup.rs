//! Notification deduplication across restarts.
//!
//! The last category (and index) seen is persisted after every successful
//! observation. An alert is raised only when the category differs from the
//! persisted one, the new category is high severity, and notifications are
//! enabled. Returning to the same category never re-alerts; any crossing
//! between two different categories does.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::aqi::{AqiIndex, Category, Observation};
use crate::storage::{read_json, write_json_atomic};

/// Persisted dedup record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LastSeen {
    pub category: Option<Category>,
    #[serde(rename = "lastAQI")]
    pub aqi: Option<f64>,
}

/// A notification the host should show.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub category: Category,
    pub index: AqiIndex,
    pub title: String,
    pub body: String,
}

impl Alert {
    fn new(category: Category, index: AqiIndex, location: &str) -> Self {
        Self {
            category,
            index,
            title: format!("Air quality: {}", category.label()),
            body: format!("AQI {} at {}. {}", index, location, category.advisory()),
        }
    }
}

pub struct Deduplicator {
    path: Option<PathBuf>,
    last: LastSeen,
}

impl Deduplicator {
    /// Load the record at `path`; missing or corrupt records start empty.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let last = match read_json::<LastSeen>(&path) {
            Ok(Some(last)) => last,
            Ok(None) => LastSeen::default(),
            Err(e) => {
                tracing::warn!(error = %e, "Unreadable dedup record, starting fresh");
                LastSeen::default()
            }
        };
        Self {
            path: Some(path),
            last,
        }
    }

    /// A deduplicator that keeps its record in memory only.
    pub fn in_memory(last: LastSeen) -> Self {
        Self { path: None, last }
    }

    pub fn last_seen(&self) -> LastSeen {
        self.last
    }

    pub fn last_category(&self) -> Option<Category> {
        self.last.category
    }

    /// Compare `observation` with the persisted category, then persist it.
    ///
    /// Observations without a usable index leave the record untouched: an
    /// unknown reading is not a category crossing.
    pub fn observe(&mut self, observation: &Observation, notify_enabled: bool) -> Option<Alert> {
        let Some(value) = observation.index.value() else {
            tracing::debug!("Index unavailable, dedup record unchanged");
            return None;
        };
        let category = Category::from_value(value);

        let changed = self.last.category != Some(category);
        let alert = if notify_enabled && category.is_high_severity() && changed {
            Some(Alert::new(category, observation.index, &observation.location))
        } else {
            None
        };

        if changed {
            tracing::info!(
                from = ?self.last.category,
                to = ?category,
                alert = alert.is_some(),
                "Category changed"
            );
        }

        self.last = LastSeen {
            category: Some(category),
            aqi: Some(value),
        };
        self.persist();
        alert
    }

    fn persist(&self) {
        let Some(path) = &self.path else {
            return;
        };
        if let Err(e) = write_json_atomic(path, &self.last) {
            tracing::warn!(error = %e, "Failed to persist dedup record");
        }
    }
}
