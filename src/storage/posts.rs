use chrono::Utc;

use super::schema::Database;
use super::types::{to_millis, DatabaseError, InsertOutcome, NewPost, Post, PostDbRow};

/// Maximum number of posts returned by a single browse query
const MAX_POSTS: i64 = 500;

impl Database {
    // ========================================================================
    // Post Operations
    // ========================================================================

    /// Insert a post keyed by its URL.
    ///
    /// A URL that is already stored yields `InsertOutcome::Duplicate`, not an
    /// error. Every other failure (lost connection, foreign key) is returned
    /// as a `DatabaseError`.
    pub async fn insert_post(&self, post: &NewPost) -> Result<InsertOutcome, DatabaseError> {
        let now = to_millis(Utc::now());
        let inserted: Result<(i64,), sqlx::Error> = sqlx::query_as(
            "INSERT INTO posts (title, url, description, published_at, feed_id, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(&post.title)
        .bind(&post.url)
        .bind(&post.description)
        .bind(post.published_at.map(to_millis))
        .bind(post.feed_id)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await;

        match inserted.map_err(DatabaseError::from_sqlx) {
            Ok((id,)) => Ok(InsertOutcome::Inserted(id)),
            Err(DatabaseError::UniqueViolation(_)) => Ok(InsertOutcome::Duplicate),
            Err(e) => Err(e),
        }
    }

    /// Newest posts from the feeds a user follows.
    ///
    /// Posts without a publish date sort after dated ones. `limit` is capped
    /// at 500.
    pub async fn posts_for_user(&self, user_id: i64, limit: i64) -> Result<Vec<Post>, DatabaseError> {
        let limit = limit.clamp(0, MAX_POSTS);
        let rows: Vec<PostDbRow> = sqlx::query_as(
            r#"
            SELECT p.id, p.title, p.url, p.description, p.published_at, p.feed_id,
                   f.name AS feed_name, p.created_at
            FROM posts p
            JOIN feeds f ON f.id = p.feed_id
            JOIN feed_follows ff ON ff.feed_id = p.feed_id
            WHERE ff.user_id = ?
            ORDER BY p.published_at DESC NULLS LAST, p.id DESC
            LIMIT ?
        "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(PostDbRow::into_post).collect())
    }

    /// All posts of one feed, newest first
    pub async fn posts_for_feed(&self, feed_id: i64) -> Result<Vec<Post>, DatabaseError> {
        let rows: Vec<PostDbRow> = sqlx::query_as(
            r#"
            SELECT p.id, p.title, p.url, p.description, p.published_at, p.feed_id,
                   f.name AS feed_name, p.created_at
            FROM posts p
            JOIN feeds f ON f.id = p.feed_id
            WHERE p.feed_id = ?
            ORDER BY p.published_at DESC NULLS LAST, p.id DESC
            LIMIT ?
        "#,
        )
        .bind(feed_id)
        .bind(MAX_POSTS)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(PostDbRow::into_post).collect())
    }

    pub async fn count_posts(&self) -> Result<i64, DatabaseError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
