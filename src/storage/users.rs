use chrono::Utc;

use super::schema::Database;
use super::types::{from_millis, to_millis, DatabaseError, User};

impl Database {
    // ========================================================================
    // User Operations
    // ========================================================================

    /// Create a user. A taken name surfaces as `DatabaseError::UniqueViolation`.
    pub async fn create_user(&self, name: &str) -> Result<User, DatabaseError> {
        let now = Utc::now();
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO users (name, created_at, updated_at) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(name)
        .bind(to_millis(now))
        .bind(to_millis(now))
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(user_id = id, name = %name, "User created");
        Ok(User {
            id,
            name: name.to_string(),
            created_at: from_millis(to_millis(now)),
        })
    }

    pub async fn get_user(&self, name: &str) -> Result<User, DatabaseError> {
        let row: Option<(i64, String, i64)> =
            sqlx::query_as("SELECT id, name, created_at FROM users WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(id, name, created_at)| User {
            id,
            name,
            created_at: from_millis(created_at),
        })
        .ok_or_else(|| DatabaseError::NotFound(format!("user '{}'", name)))
    }

    /// All users ordered by name
    pub async fn list_users(&self) -> Result<Vec<User>, DatabaseError> {
        let rows: Vec<(i64, String, i64)> =
            sqlx::query_as("SELECT id, name, created_at FROM users ORDER BY name")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(id, name, created_at)| User {
                id,
                name,
                created_at: from_millis(created_at),
            })
            .collect())
    }

    /// Delete every user. Feeds, follows and posts go with them (ON DELETE CASCADE).
    pub async fn reset_users(&self) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM users").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
