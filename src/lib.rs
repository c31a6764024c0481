//! gator: a feed aggregator that polls registered RSS feeds on a fixed
//! interval and stores each item once as a post.
//!
//! - [`feed`] - fetching, decoding and date normalization
//! - [`storage`] - SQLite persistence and the [`storage::FeedStore`] seam
//! - [`scheduler`] - the polling loop and ingestion writer
//! - [`config`] - TOML configuration and interval parsing
//! - [`commands`] - user, feed and follow management for the CLI

pub mod commands;
pub mod config;
pub mod feed;
pub mod scheduler;
pub mod shutdown;
pub mod storage;
pub mod util;
