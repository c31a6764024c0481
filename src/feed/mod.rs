//! Feed retrieval: fetching, decoding and date normalization.
//!
//! - [`fetcher`] - one HTTP GET per call, size and time bounded, cancellable
//! - [`parser`] - RSS 2.0 decoding into [`FeedDocument`] with entity unescaping
//! - [`dates`] - ordered publish-date layouts with first-match-wins
//!
//! None of these hold state or touch the database.
//!
//! # Example
//!
//! ```ignore
//! use gator::feed::{normalize_published, Fetcher};
//!
//! let doc = Fetcher::default().fetch("https://blog.boot.dev/index.xml", &shutdown).await?;
//! for item in &doc.items {
//!     let published = normalize_published(&item.pub_date);
//! }
//! ```

mod dates;
mod fetcher;
mod parser;

pub use dates::normalize_published;
pub use fetcher::{FetchError, Fetcher, DEFAULT_MAX_FEED_SIZE, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT};
pub use parser::{parse_document, FeedDocument, FeedItem};
