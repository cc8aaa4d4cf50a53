use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::classifier::{classify, Category, Classification};

/// Air-quality index as reported by the feed.
///
/// Serialized as a nullable number so it can cross the bridge unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "Option<f64>", into = "Option<f64>")]
pub enum AqiIndex {
    Value(f64),
    Unavailable,
}

impl AqiIndex {
    /// Negative and non-finite numbers are not a reading.
    pub fn from_f64(value: f64) -> Self {
        if value.is_finite() && value >= 0.0 {
            AqiIndex::Value(value)
        } else {
            AqiIndex::Unavailable
        }
    }

    pub fn value(self) -> Option<f64> {
        match self {
            AqiIndex::Value(v) => Some(v),
            AqiIndex::Unavailable => None,
        }
    }
}

impl From<Option<f64>> for AqiIndex {
    fn from(value: Option<f64>) -> Self {
        value.map(AqiIndex::from_f64).unwrap_or(AqiIndex::Unavailable)
    }
}

impl From<AqiIndex> for Option<f64> {
    fn from(index: AqiIndex) -> Self {
        index.value()
    }
}

impl fmt::Display for AqiIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AqiIndex::Value(v) => write!(f, "{}", v.round() as i64),
            AqiIndex::Unavailable => f.write_str("--"),
        }
    }
}

/// One successful reading of the station feed. Never mutated; the next
/// successful fetch replaces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub index: AqiIndex,
    /// Named particulate sub-readings such as `pm10` and `pm25`.
    pub particulates: BTreeMap<String, f64>,
    pub location: String,
    pub observed_at: DateTime<Utc>,
}

impl Observation {
    pub fn classification(&self) -> Classification {
        classify(self.index)
    }

    pub fn particulate(&self, name: &str) -> Option<f64> {
        self.particulates.get(name).copied()
    }
}

/// Serialized view of the latest observation handed to render targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub observation: Observation,
    pub category: Category,
    pub available: bool,
    pub label: String,
    pub color: String,
    pub icon: String,
}

impl Snapshot {
    pub fn new(observation: Observation) -> Self {
        let c = observation.classification();
        Self {
            category: c.category,
            available: c.available,
            label: c.label().to_string(),
            color: c.color().to_string(),
            icon: c.icon().file_name().to_string(),
            observation,
        }
    }
}
