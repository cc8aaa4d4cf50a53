//! Air-quality domain: readings, classification and the station fetch client.
//!
//! - [`classifier`] - pure index → category/color/icon mapping
//! - [`observation`] - the immutable result of a successful fetch
//! - [`fetcher`] - one bounded HTTP request against the station feed

pub mod classifier;
pub mod fetcher;
pub mod observation;

pub use classifier::{
    category, classify, display_color, icon_selector, Category, Classification, IconSelector,
};
pub use fetcher::{parse_feed, with_deadline, FetchClient, FetchError};
pub use observation::{AqiIndex, Observation, Snapshot};
