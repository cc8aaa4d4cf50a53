//! Air-quality index classification.
//!
//! Every function here is total: any index, including a missing or
//! non-finite one, maps to a category, a color and an icon. An unavailable
//! index lands in the lowest band for icon purposes but is tagged as
//! unavailable so the readout never presents "unknown" as "good".

use serde::{Deserialize, Serialize};
use std::fmt;

use super::observation::AqiIndex;

/// Upper bounds (inclusive) of the first five bands. Anything above the last
/// bound is [`Category::Hazardous`].
const BAND_LIMITS: [f64; 5] = [50.0, 100.0, 150.0, 200.0, 300.0];

/// Color shown when the feed did not report a usable index.
pub const UNAVAILABLE_COLOR: &str = "#9e9e9e";

// ============================================================================
// Category
// ============================================================================

/// Severity bands, in ascending order of severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Good,
    Moderate,
    SensitiveGroups,
    Unhealthy,
    VeryUnhealthy,
    Hazardous,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Good,
        Category::Moderate,
        Category::SensitiveGroups,
        Category::Unhealthy,
        Category::VeryUnhealthy,
        Category::Hazardous,
    ];

    /// Band for a raw numeric index. Negative and non-finite values fall into
    /// the lowest band.
    pub fn from_value(value: f64) -> Self {
        if !value.is_finite() || value <= BAND_LIMITS[0] {
            return Category::Good;
        }
        BAND_LIMITS
            .iter()
            .position(|limit| value <= *limit)
            .map(|band| Self::ALL[band])
            .unwrap_or(Category::Hazardous)
    }

    /// Human-readable name for readouts and notification titles.
    pub fn label(self) -> &'static str {
        match self {
            Category::Good => "Good",
            Category::Moderate => "Moderate",
            Category::SensitiveGroups => "Unhealthy for Sensitive Groups",
            Category::Unhealthy => "Unhealthy",
            Category::VeryUnhealthy => "Very Unhealthy",
            Category::Hazardous => "Hazardous",
        }
    }

    /// Short health advice used as the notification body suffix.
    pub fn advisory(self) -> &'static str {
        match self {
            Category::Good => "Air quality is satisfactory.",
            Category::Moderate => "Unusually sensitive people should limit prolonged exertion outdoors.",
            Category::SensitiveGroups => "Sensitive groups should reduce prolonged exertion outdoors.",
            Category::Unhealthy => "Everyone should limit prolonged exertion outdoors.",
            Category::VeryUnhealthy => "Avoid prolonged exertion outdoors.",
            Category::Hazardous => "Stay indoors and keep activity levels low.",
        }
    }

    /// Whether this band makes an observation eligible for an alert.
    pub fn is_high_severity(self) -> bool {
        self >= Category::Unhealthy
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Icon asset for a band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IconSelector(&'static str);

impl IconSelector {
    pub fn file_name(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for IconSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

// ============================================================================
// Lookup functions
// ============================================================================

/// Band for an index; unavailable readings map to [`Category::Good`].
pub fn category(index: AqiIndex) -> Category {
    match index.value() {
        Some(value) => Category::from_value(value),
        None => Category::Good,
    }
}

/// Display color (hex RGB) for a band.
pub fn display_color(category: Category) -> &'static str {
    match category {
        Category::Good => "#009966",
        Category::Moderate => "#ffde33",
        Category::SensitiveGroups => "#ff9933",
        Category::Unhealthy => "#cc0033",
        Category::VeryUnhealthy => "#660099",
        Category::Hazardous => "#7e0023",
    }
}

/// Tray/window icon for a band.
pub fn icon_selector(category: Category) -> IconSelector {
    IconSelector(match category {
        Category::Good => "icon-0-50-192.png",
        Category::Moderate => "icon-51-100-192.png",
        Category::SensitiveGroups => "icon-101-150-192.png",
        Category::Unhealthy => "icon-151-200-192.png",
        Category::VeryUnhealthy => "icon-201-300-192.png",
        Category::Hazardous => "icon-300plus-192.png",
    })
}

// ============================================================================
// Classification
// ============================================================================

/// Result of classifying one index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub index: AqiIndex,
    pub category: Category,
    /// False when the feed reported no usable index.
    pub available: bool,
}

impl Classification {
    /// Label for the readout; unavailable readings never claim a band.
    pub fn label(&self) -> &'static str {
        if self.available {
            self.category.label()
        } else {
            "Unavailable"
        }
    }

    pub fn color(&self) -> &'static str {
        if self.available {
            display_color(self.category)
        } else {
            UNAVAILABLE_COLOR
        }
    }

    pub fn icon(&self) -> IconSelector {
        icon_selector(self.category)
    }
}

pub fn classify(index: AqiIndex) -> Classification {
    Classification {
        index,
        category: category(index),
        available: index.value().is_some(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_band_boundaries_are_inclusive() {
        let cases = [
            (0.0, Category::Good),
            (50.0, Category::Good),
            (50.5, Category::Moderate),
            (100.0, Category::Moderate),
            (101.0, Category::SensitiveGroups),
            (150.0, Category::SensitiveGroups),
            (151.0, Category::Unhealthy),
            (200.0, Category::Unhealthy),
            (201.0, Category::VeryUnhealthy),
            (300.0, Category::VeryUnhealthy),
            (301.0, Category::Hazardous),
            (999.0, Category::Hazardous),
        ];
        for (value, expected) in cases {
            assert_eq!(Category::from_value(value), expected, "value {}", value);
        }
    }

    #[test]
    fn test_non_finite_and_negative_fall_to_lowest_band() {
        assert_eq!(Category::from_value(f64::NAN), Category::Good);
        assert_eq!(Category::from_value(f64::INFINITY), Category::Good);
        assert_eq!(Category::from_value(-12.0), Category::Good);
    }

    #[test]
    fn test_unavailable_is_tagged_not_good() {
        let c = classify(AqiIndex::Unavailable);
        assert_eq!(c.category, Category::Good);
        assert!(!c.available);
        assert_eq!(c.label(), "Unavailable");
        assert_eq!(c.color(), UNAVAILABLE_COLOR);
        assert_eq!(c.icon(), icon_selector(Category::Good));
    }

    #[test]
    fn test_high_severity_gate() {
        assert!(!Category::SensitiveGroups.is_high_severity());
        assert!(Category::Unhealthy.is_high_severity());
        assert!(Category::Hazardous.is_high_severity());
    }

    #[test]
    fn test_lookup_tables_are_distinct() {
        let colors: std::collections::HashSet<_> =
            Category::ALL.iter().map(|c| display_color(*c)).collect();
        let icons: std::collections::HashSet<_> =
            Category::ALL.iter().map(|c| icon_selector(*c)).collect();
        assert_eq!(colors.len(), 6);
        assert_eq!(icons.len(), 6);
    }

    proptest! {
        #[test]
        fn prop_category_is_monotonic(a in -1000.0f64..2000.0, b in -1000.0f64..2000.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(Category::from_value(lo) <= Category::from_value(hi));
        }

        #[test]
        fn prop_classify_is_total(bits in any::<u64>()) {
            let value = f64::from_bits(bits);
            let c = classify(AqiIndex::from_f64(value));
            prop_assert_eq!(c.available, value.is_finite() && value >= 0.0);
        }
    }
}
