//! Small parsing helpers shared by the CLI and configuration.
//!
//! - **Durations**: `1m`, `1h30m`, `1.5s` style interval strings
//! - **Feed URLs**: scheme and host checks before a feed is registered

mod duration;
mod url_validator;

pub use duration::{parse_duration, DurationError};
pub use url_validator::{validate_feed_url, UrlValidationError};
