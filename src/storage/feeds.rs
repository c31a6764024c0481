use chrono::{DateTime, Utc};

use super::schema::Database;
use super::types::{to_millis, DatabaseError, Feed, FeedDbRow, FeedWithOwner};

const FEED_COLUMNS: &str = "id, name, url, user_id, created_at, updated_at, last_fetched_at";

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Register a feed. A URL that is already registered surfaces as
    /// `DatabaseError::UniqueViolation`.
    pub async fn create_feed(
        &self,
        name: &str,
        url: &str,
        user_id: i64,
    ) -> Result<Feed, DatabaseError> {
        let now = to_millis(Utc::now());
        let row: FeedDbRow = sqlx::query_as(&format!(
            "INSERT INTO feeds (name, url, user_id, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?) RETURNING {FEED_COLUMNS}"
        ))
        .bind(name)
        .bind(url)
        .bind(user_id)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        let feed = row.into_feed();
        tracing::info!(feed_id = feed.id, name = %feed.name, url = %feed.url, "Feed registered");
        Ok(feed)
    }

    pub async fn get_feed_by_url(&self, url: &str) -> Result<Feed, DatabaseError> {
        let row: Option<FeedDbRow> =
            sqlx::query_as(&format!("SELECT {FEED_COLUMNS} FROM feeds WHERE url = ?"))
                .bind(url)
                .fetch_optional(&self.pool)
                .await?;

        row.map(FeedDbRow::into_feed)
            .ok_or_else(|| DatabaseError::NotFound(format!("feed with url '{}'", url)))
    }

    pub async fn get_feed(&self, feed_id: i64) -> Result<Feed, DatabaseError> {
        let row: Option<FeedDbRow> =
            sqlx::query_as(&format!("SELECT {FEED_COLUMNS} FROM feeds WHERE id = ?"))
                .bind(feed_id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(FeedDbRow::into_feed)
            .ok_or_else(|| DatabaseError::NotFound(format!("feed {}", feed_id)))
    }

    /// All feeds with their owner's name, ordered by feed name
    pub async fn list_feeds(&self) -> Result<Vec<FeedWithOwner>, DatabaseError> {
        let rows: Vec<(i64, String, String, i64, i64, i64, Option<i64>, String)> =
            sqlx::query_as(
                r#"
                SELECT f.id, f.name, f.url, f.user_id, f.created_at, f.updated_at,
                       f.last_fetched_at, u.name
                FROM feeds f
                JOIN users u ON u.id = f.user_id
                ORDER BY f.name, f.id
            "#,
            )
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(
                |(id, name, url, user_id, created_at, updated_at, last_fetched_at, owner)| {
                    FeedWithOwner {
                        feed: FeedDbRow {
                            id,
                            name,
                            url,
                            user_id,
                            created_at,
                            updated_at,
                            last_fetched_at,
                        }
                        .into_feed(),
                        owner,
                    }
                },
            )
            .collect())
    }

    // ========================================================================
    // Rotation Operations
    // ========================================================================

    /// Peek at the feed the scheduler would pick next: never-fetched feeds
    /// first, then the oldest `last_fetched_at`, ties broken by id.
    ///
    /// Read-only. The scheduler itself uses [`Database::claim_next_feed`].
    pub async fn next_feed_to_fetch(&self) -> Result<Option<Feed>, DatabaseError> {
        let row: Option<FeedDbRow> = sqlx::query_as(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds \
             ORDER BY last_fetched_at ASC NULLS FIRST, id ASC LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(FeedDbRow::into_feed))
    }

    /// Stamp a feed as fetched at `at`.
    ///
    /// The stamp never moves backwards: an older `at` leaves a newer stored
    /// value untouched.
    pub async fn mark_feed_fetched(
        &self,
        feed_id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let at = to_millis(at);
        let result = sqlx::query(
            "UPDATE feeds \
             SET last_fetched_at = MAX(COALESCE(last_fetched_at, ?), ?), updated_at = ? \
             WHERE id = ?",
        )
        .bind(at)
        .bind(at)
        .bind(at)
        .bind(feed_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("feed {}", feed_id)));
        }
        Ok(())
    }

    /// Select the stalest feed and stamp it in one statement.
    ///
    /// Selection and stamp are a single UPDATE, so two schedulers (or two
    /// workers) can never both claim the same stale feed. Returns the feed
    /// with its new stamp, or `None` when no feeds are registered.
    pub async fn claim_next_feed(&self, at: DateTime<Utc>) -> Result<Option<Feed>, DatabaseError> {
        let at = to_millis(at);
        let row: Option<FeedDbRow> = sqlx::query_as(&format!(
            r#"
            UPDATE feeds
            SET last_fetched_at = MAX(COALESCE(last_fetched_at, ?), ?), updated_at = ?
            WHERE id = (
                SELECT id FROM feeds
                ORDER BY last_fetched_at ASC NULLS FIRST, id ASC
                LIMIT 1
            )
            RETURNING {FEED_COLUMNS}
        "#
        ))
        .bind(at)
        .bind(at)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(FeedDbRow::into_feed))
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, DatabaseError};
    use chrono::{Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    async fn test_db() -> (Database, i64) {
        let db = Database::open(":memory:").await.unwrap();
        let user = db.create_user("alice").await.unwrap();
        (db, user.id)
    }

    fn test_url(id: i64) -> String {
        format!("https://feed{}.example.com/rss", id)
    }

    #[tokio::test]
    async fn test_create_feed_starts_unfetched() {
        let (db, user_id) = test_db().await;
        let feed = db.create_feed("Feed 1", &test_url(1), user_id).await.unwrap();

        assert_eq!(&*feed.name, "Feed 1");
        assert_eq!(feed.user_id, user_id);
        assert!(feed.last_fetched_at.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_feed_url_rejected() {
        let (db, user_id) = test_db().await;
        db.create_feed("Feed 1", &test_url(1), user_id).await.unwrap();
        let err = db
            .create_feed("Other name", &test_url(1), user_id)
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn test_feed_requires_existing_owner() {
        let (db, _) = test_db().await;
        let err = db.create_feed("Orphan", &test_url(1), 9999).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Other(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_list_feeds_includes_owner() {
        let (db, user_id) = test_db().await;
        db.create_feed("B feed", &test_url(2), user_id).await.unwrap();
        db.create_feed("A feed", &test_url(1), user_id).await.unwrap();

        let feeds = db.list_feeds().await.unwrap();
        assert_eq!(feeds.len(), 2);
        assert_eq!(&*feeds[0].feed.name, "A feed");
        assert_eq!(feeds[0].owner, "alice");
    }

    #[tokio::test]
    async fn test_get_feed_by_url_not_found() {
        let (db, _) = test_db().await;
        assert!(matches!(
            db.get_feed_by_url("https://missing.example.com").await,
            Err(DatabaseError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_claim_on_empty_table_is_none() {
        let (db, _) = test_db().await;
        assert!(db.claim_next_feed(Utc::now()).await.unwrap().is_none());
        assert!(db.next_feed_to_fetch().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_prefers_never_fetched() {
        let (db, user_id) = test_db().await;
        let fetched = db.create_feed("Fetched", &test_url(1), user_id).await.unwrap();
        let fresh = db.create_feed("Fresh", &test_url(2), user_id).await.unwrap();

        let long_ago = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        db.mark_feed_fetched(fetched.id, long_ago).await.unwrap();

        let claimed = db.claim_next_feed(Utc::now()).await.unwrap().unwrap();
        assert_eq!(claimed.id, fresh.id);
        assert!(claimed.last_fetched_at.is_some());
    }

    #[tokio::test]
    async fn test_claim_stamps_and_rotates() {
        let (db, user_id) = test_db().await;
        let a = db.create_feed("A", &test_url(1), user_id).await.unwrap();
        let b = db.create_feed("B", &test_url(2), user_id).await.unwrap();

        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let first = db.claim_next_feed(t0).await.unwrap().unwrap();
        let second = db
            .claim_next_feed(t0 + Duration::seconds(1))
            .await
            .unwrap()
            .unwrap();
        let third = db
            .claim_next_feed(t0 + Duration::seconds(2))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(first.id, a.id);
        assert_eq!(second.id, b.id);
        assert_eq!(third.id, a.id);
        assert_eq!(first.last_fetched_at, Some(t0));
    }

    #[tokio::test]
    async fn test_mark_feed_fetched_is_monotonic() {
        let (db, user_id) = test_db().await;
        let feed = db.create_feed("A", &test_url(1), user_id).await.unwrap();

        let newer = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let older = Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap();
        db.mark_feed_fetched(feed.id, newer).await.unwrap();
        db.mark_feed_fetched(feed.id, older).await.unwrap();

        let stored = db.get_feed(feed.id).await.unwrap();
        assert_eq!(stored.last_fetched_at, Some(newer));
    }

    #[tokio::test]
    async fn test_mark_unknown_feed_is_not_found() {
        let (db, _) = test_db().await;
        assert!(matches!(
            db.mark_feed_fetched(42, Utc::now()).await,
            Err(DatabaseError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_next_feed_to_fetch_does_not_stamp() {
        let (db, user_id) = test_db().await;
        let feed = db.create_feed("A", &test_url(1), user_id).await.unwrap();

        let peeked = db.next_feed_to_fetch().await.unwrap().unwrap();
        assert_eq!(peeked.id, feed.id);
        assert!(db.get_feed(feed.id).await.unwrap().last_fetched_at.is_none());
    }
}
