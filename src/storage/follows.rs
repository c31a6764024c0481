use chrono::Utc;

use super::schema::Database;
use super::types::{to_millis, DatabaseError, FeedFollow};

impl Database {
    // ========================================================================
    // Follow Operations
    // ========================================================================

    /// Follow a feed. Following twice surfaces as `DatabaseError::UniqueViolation`.
    pub async fn follow_feed(&self, user_id: i64, feed_id: i64) -> Result<FeedFollow, DatabaseError> {
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO feed_follows (user_id, feed_id, created_at) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(user_id)
        .bind(feed_id)
        .bind(to_millis(Utc::now()))
        .fetch_one(&self.pool)
        .await?;

        let row: (i64, String, String, String) = sqlx::query_as(
            r#"
            SELECT ff.id, u.name, f.name, f.url
            FROM feed_follows ff
            JOIN users u ON u.id = ff.user_id
            JOIN feeds f ON f.id = ff.feed_id
            WHERE ff.id = ?
        "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(FeedFollow {
            id: row.0,
            user_name: row.1,
            feed_name: row.2,
            feed_url: row.3,
        })
    }

    /// Feeds a user follows, ordered by feed name
    pub async fn follows_for_user(&self, user_id: i64) -> Result<Vec<FeedFollow>, DatabaseError> {
        let rows: Vec<(i64, String, String, String)> = sqlx::query_as(
            r#"
            SELECT ff.id, u.name, f.name, f.url
            FROM feed_follows ff
            JOIN users u ON u.id = ff.user_id
            JOIN feeds f ON f.id = ff.feed_id
            WHERE ff.user_id = ?
            ORDER BY f.name, ff.id
        "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, user_name, feed_name, feed_url)| FeedFollow {
                id,
                user_name,
                feed_name,
                feed_url,
            })
            .collect())
    }

    /// Returns false when the user was not following the feed
    pub async fn unfollow_feed(&self, user_id: i64, feed_id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM feed_follows WHERE user_id = ? AND feed_id = ?")
            .bind(user_id)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
