use thiserror::Error;

use crate::feed::{normalize_published, FeedItem};
use crate::storage::{DatabaseError, FeedStore, InsertOutcome, NewPost};

/// A post could not be stored for a reason other than its URL already existing.
///
/// Fatal for that one item only; the rest of the feed's items are still written.
#[derive(Debug, Error)]
#[error("Failed to persist post {url}: {source}")]
pub struct PersistenceError {
    pub url: String,
    #[source]
    pub source: DatabaseError,
}

/// What happened to one feed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// New post row with this id
    Inserted(i64),
    /// A post with this URL already exists; nothing written
    Duplicate,
    /// The item has no link to deduplicate on; nothing written
    Skipped,
}

/// Build the post for an item of `feed_id`, normalizing its publish date.
pub fn post_from_item(feed_id: i64, item: &FeedItem) -> NewPost {
    NewPost {
        title: item.title.clone(),
        url: item.link.clone(),
        description: item.description.clone(),
        published_at: normalize_published(&item.pub_date),
        feed_id,
    }
}

/// Write one post, treating an existing URL as success.
///
/// Both the store's `Duplicate` outcome and a `UniqueViolation` error map to
/// [`IngestOutcome::Duplicate`], so stores that surface the constraint as an
/// error behave the same as those that report it.
pub async fn write_post<S>(store: &S, post: &NewPost) -> Result<IngestOutcome, PersistenceError>
where
    S: FeedStore + ?Sized,
{
    if post.url.is_empty() {
        tracing::debug!(feed_id = post.feed_id, title = %post.title, "Item has no link, skipping");
        return Ok(IngestOutcome::Skipped);
    }

    match store.insert_post(post).await {
        Ok(InsertOutcome::Inserted(id)) => {
            tracing::debug!(post_id = id, feed_id = post.feed_id, url = %post.url, "Post created");
            Ok(IngestOutcome::Inserted(id))
        }
        Ok(InsertOutcome::Duplicate) => {
            tracing::debug!(feed_id = post.feed_id, url = %post.url, "Post already exists");
            Ok(IngestOutcome::Duplicate)
        }
        Err(e) if e.is_unique_violation() => {
            tracing::debug!(feed_id = post.feed_id, url = %post.url, "Post already exists");
            Ok(IngestOutcome::Duplicate)
        }
        Err(source) => Err(PersistenceError {
            url: post.url.clone(),
            source,
        }),
    }
}
