//! The persistence boundary the scheduler depends on.
//!
//! [`Database`] is the production implementation. [`MemoryStore`] keeps the
//! same contract in process memory, with selection and stamp performed under
//! one lock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};

use super::schema::Database;
use super::types::{DatabaseError, Feed, InsertOutcome, NewPost};

/// Store operations consumed by the polling scheduler.
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Atomically select the stalest feed (never-fetched first, then oldest
    /// `last_fetched_at`, then lowest id) and stamp it with `at`.
    async fn claim_next_feed(&self, at: DateTime<Utc>) -> Result<Option<Feed>, DatabaseError>;

    /// Insert a post unique on URL; duplicates report `InsertOutcome::Duplicate`.
    async fn insert_post(&self, post: &NewPost) -> Result<InsertOutcome, DatabaseError>;
}

#[async_trait]
impl FeedStore for Database {
    async fn claim_next_feed(&self, at: DateTime<Utc>) -> Result<Option<Feed>, DatabaseError> {
        Database::claim_next_feed(self, at).await
    }

    async fn insert_post(&self, post: &NewPost) -> Result<InsertOutcome, DatabaseError> {
        Database::insert_post(self, post).await
    }
}

#[async_trait]
impl<S: FeedStore + ?Sized> FeedStore for Arc<S> {
    async fn claim_next_feed(&self, at: DateTime<Utc>) -> Result<Option<Feed>, DatabaseError> {
        (**self).claim_next_feed(at).await
    }

    async fn insert_post(&self, post: &NewPost) -> Result<InsertOutcome, DatabaseError> {
        (**self).insert_post(post).await
    }
}

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Default)]
struct MemoryState {
    feeds: Vec<Feed>,
    posts: Vec<NewPost>,
}

/// Process-local [`FeedStore`].
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // A panicked holder cannot leave the vectors half-updated
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a feed, returning its id
    pub fn add_feed(
        &self,
        name: &str,
        url: &str,
        last_fetched_at: Option<DateTime<Utc>>,
    ) -> i64 {
        let mut state = self.lock();
        let id = state.feeds.len() as i64 + 1;
        let now = Utc::now();
        state.feeds.push(Feed {
            id,
            name: Arc::from(name),
            url: url.to_string(),
            user_id: 0,
            created_at: now,
            updated_at: now,
            last_fetched_at,
        });
        id
    }

    pub fn feed(&self, feed_id: i64) -> Option<Feed> {
        self.lock().feeds.iter().find(|f| f.id == feed_id).cloned()
    }

    pub fn posts(&self) -> Vec<NewPost> {
        self.lock().posts.clone()
    }
}

#[async_trait]
impl FeedStore for MemoryStore {
    async fn claim_next_feed(&self, at: DateTime<Utc>) -> Result<Option<Feed>, DatabaseError> {
        let mut state = self.lock();
        // None < Some(_) in Option's ordering, so never-fetched feeds come first
        let stalest = state
            .feeds
            .iter_mut()
            .min_by_key(|f| (f.last_fetched_at, f.id));

        Ok(stalest.map(|feed| {
            let stamp = feed.last_fetched_at.map_or(at, |prev| prev.max(at));
            feed.last_fetched_at = Some(stamp);
            feed.updated_at = stamp;
            feed.clone()
        }))
    }

    async fn insert_post(&self, post: &NewPost) -> Result<InsertOutcome, DatabaseError> {
        let mut state = self.lock();
        if state.posts.iter().any(|p| p.url == post.url) {
            return Ok(InsertOutcome::Duplicate);
        }
        state.posts.push(post.clone());
        Ok(InsertOutcome::Inserted(state.posts.len() as i64))
    }
}
