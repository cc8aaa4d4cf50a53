//! Small helpers shared by the fetch client and the terminal readout.
//!
//! - **URL validation**: the feed endpoint must be HTTPS (localhost excepted)
//! - **Text processing**: control-character stripping and width-aware truncation

mod text;
mod url_validator;

pub use text::{sanitize_label, strip_control_chars, truncate_to_width};
pub use url_validator::{validate_feed_base, UrlValidationError};
