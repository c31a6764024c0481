//! The polling scheduler.
//!
//! On every tick the scheduler claims the stalest feed (never-fetched first,
//! then oldest `last_fetched_at`), fetches and decodes it, and writes each
//! item as a post. Claiming stamps the feed *before* the fetch, so a feed
//! whose fetch fails waits for its next turn in the rotation instead of being
//! retried immediately.
//!
//! Failures never escape a tick: a failed fetch skips that feed, a failed
//! item write skips that item, and the loop keeps running until the shutdown
//! signal fires.

mod ingest;

pub use ingest::{post_from_item, write_post, IngestOutcome, PersistenceError};

use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::time::Duration;
use tokio::time::MissedTickBehavior;

use crate::feed::Fetcher;
use crate::shutdown::Shutdown;
use crate::storage::{Feed, FeedStore};

/// Shortest interval the loop will run at; `tokio::time::interval` rejects zero.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Counters for one tick, for logging and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Feeds claimed (and stamped) this tick
    pub feeds_claimed: usize,
    /// Feeds whose fetch or decode failed
    pub fetch_failures: usize,
    pub posts_inserted: usize,
    pub duplicates: usize,
    /// Items without a link
    pub skipped: usize,
    /// Items whose write failed for a reason other than a duplicate URL
    pub item_failures: usize,
    /// The store could not select/stamp a feed
    pub claim_failed: bool,
}

impl TickReport {
    fn record(&mut self, outcome: Result<IngestOutcome, PersistenceError>) {
        match outcome {
            Ok(IngestOutcome::Inserted(_)) => self.posts_inserted += 1,
            Ok(IngestOutcome::Duplicate) => self.duplicates += 1,
            Ok(IngestOutcome::Skipped) => self.skipped += 1,
            Err(_) => self.item_failures += 1,
        }
    }

    fn merge(&mut self, other: TickReport) {
        self.feeds_claimed += other.feeds_claimed;
        self.fetch_failures += other.fetch_failures;
        self.posts_inserted += other.posts_inserted;
        self.duplicates += other.duplicates;
        self.skipped += other.skipped;
        self.item_failures += other.item_failures;
        self.claim_failed |= other.claim_failed;
    }
}

/// Drives the fetch/decode/ingest cycle over a [`FeedStore`].
pub struct Scheduler<S> {
    store: S,
    fetcher: Fetcher,
    workers: usize,
}

impl<S: FeedStore> Scheduler<S> {
    /// Sequential scheduler: one feed per tick.
    pub fn new(store: S, fetcher: Fetcher) -> Self {
        Self {
            store,
            fetcher,
            workers: 1,
        }
    }

    /// Claim and process up to `workers` feeds per tick, concurrently.
    ///
    /// Each claim is a single atomic select-and-stamp, so workers never share
    /// a feed. Zero is treated as one.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run one scheduling cycle.
    ///
    /// With no registered feeds this is a no-op. Never returns an error;
    /// every failure is logged and counted in the report.
    pub async fn tick(&self, shutdown: &Shutdown) -> TickReport {
        let mut report = TickReport::default();
        let claimed = self.claim_feeds(&mut report).await;
        if claimed.is_empty() {
            return report;
        }

        let per_feed: Vec<TickReport> = stream::iter(claimed)
            .map(|feed| self.poll_feed(feed, shutdown))
            .buffer_unordered(self.workers)
            .collect()
            .await;

        for feed_report in per_feed {
            report.merge(feed_report);
        }
        report
    }

    /// Run ticks on a fixed cadence until `shutdown` fires.
    ///
    /// The first tick happens immediately. A tick that overruns the interval
    /// delays the next one rather than bursting to catch up. Returns the
    /// number of ticks completed.
    pub async fn run(&self, every: Duration, shutdown: Shutdown) -> u64 {
        let mut interval = tokio::time::interval(every.max(MIN_INTERVAL));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(interval = ?every, workers = self.workers, "Collecting feeds");

        let mut ticks: u64 = 0;
        loop {
            tokio::select! {
                biased;
                _ = shutdown.triggered() => {
                    tracing::info!(ticks = ticks, "Shutdown requested, scheduler stopping");
                    break;
                }
                _ = interval.tick() => {
                    let report = self.tick(&shutdown).await;
                    ticks += 1;
                    log_report(ticks, &report);
                }
            }
        }
        ticks
    }

    async fn claim_feeds(&self, report: &mut TickReport) -> Vec<Feed> {
        let mut claimed: Vec<Feed> = Vec::with_capacity(self.workers);
        while claimed.len() < self.workers {
            match self.store.claim_next_feed(Utc::now()).await {
                Ok(Some(feed)) => {
                    // Fewer feeds than workers: the rotation wrapped around
                    if claimed.iter().any(|f| f.id == feed.id) {
                        break;
                    }
                    claimed.push(feed);
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to claim next feed");
                    report.claim_failed = true;
                    break;
                }
            }
        }
        report.feeds_claimed = claimed.len();
        claimed
    }

    async fn poll_feed(&self, feed: Feed, shutdown: &Shutdown) -> TickReport {
        let mut report = TickReport::default();
        tracing::info!(feed_id = feed.id, name = %feed.name, url = %feed.url, "Fetching feed");

        let document = match self.fetcher.fetch(&feed.url, shutdown).await {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!(
                    feed_id = feed.id,
                    url = %feed.url,
                    error = %e,
                    "Feed fetch failed, retrying on its next turn"
                );
                report.fetch_failures = 1;
                return report;
            }
        };

        tracing::debug!(
            feed_id = feed.id,
            channel = %document.title,
            items = document.items.len(),
            "Ingesting items"
        );

        for item in &document.items {
            let post = post_from_item(feed.id, item);
            let outcome = write_post(&self.store, &post).await;
            if let Err(e) = &outcome {
                tracing::warn!(feed_id = feed.id, error = %e, "Item not stored, continuing");
            }
            report.record(outcome);
        }
        report
    }
}

fn log_report(tick: u64, report: &TickReport) {
    if report.feeds_claimed == 0 && !report.claim_failed {
        tracing::debug!(tick = tick, "No feeds registered");
        return;
    }
    tracing::info!(
        tick = tick,
        feeds = report.feeds_claimed,
        fetch_failures = report.fetch_failures,
        inserted = report.posts_inserted,
        duplicates = report.duplicates,
        item_failures = report.item_failures,
        "Tick complete"
    );
}
