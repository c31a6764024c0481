//! User, feed and follow management behind the CLI subcommands.
//!
//! Each function is a thin layer over [`Database`] that turns storage
//! outcomes (unique violations, missing rows) into errors a user can act on.
//! Printing stays in the binary.

use thiserror::Error;

use crate::storage::{Database, DatabaseError, Feed, FeedFollow, FeedWithOwner, Post, User};
use crate::util::{validate_feed_url, UrlValidationError};

/// Default number of posts shown by `browse`.
pub const DEFAULT_BROWSE_LIMIT: i64 = 2;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("No current user; run `gator login <name>` or pass --user <name>")]
    NoCurrentUser,

    #[error("User {0:?} does not exist; run `gator register {0}` first")]
    UnknownUser(String),

    #[error("User {0:?} already exists")]
    UserExists(String),

    #[error("A feed with URL {0} is already registered")]
    FeedExists(String),

    #[error("No feed registered with URL {0}")]
    UnknownFeed(String),

    #[error("Already following {0}")]
    AlreadyFollowing(String),

    #[error("Not following {0}")]
    NotFollowing(String),

    #[error(transparent)]
    InvalidUrl(#[from] UrlValidationError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

pub async fn register(db: &Database, name: &str) -> Result<User, CommandError> {
    db.create_user(name).await.map_err(|e| match e {
        DatabaseError::UniqueViolation(_) => CommandError::UserExists(name.to_string()),
        other => other.into(),
    })
}

/// Check that `name` is registered; the binary then records it as current.
pub async fn login(db: &Database, name: &str) -> Result<User, CommandError> {
    current_user(db, Some(name)).await
}

/// Resolve the acting user from `--user` or the config's `current_user`.
pub async fn current_user(db: &Database, name: Option<&str>) -> Result<User, CommandError> {
    let name = name.ok_or(CommandError::NoCurrentUser)?;
    db.get_user(name).await.map_err(|e| match e {
        DatabaseError::NotFound(_) => CommandError::UnknownUser(name.to_string()),
        other => other.into(),
    })
}

/// Register a feed owned by `user` and follow it.
pub async fn add_feed(
    db: &Database,
    user: &User,
    name: &str,
    url: &str,
) -> Result<(Feed, FeedFollow), CommandError> {
    let url = validate_feed_url(url)?;
    let feed = db
        .create_feed(name, url.as_str(), user.id)
        .await
        .map_err(|e| match e {
            DatabaseError::UniqueViolation(_) => CommandError::FeedExists(url.to_string()),
            other => other.into(),
        })?;
    let follow = db.follow_feed(user.id, feed.id).await?;
    Ok((feed, follow))
}

pub async fn list_feeds(db: &Database) -> Result<Vec<FeedWithOwner>, CommandError> {
    Ok(db.list_feeds().await?)
}

async fn feed_by_url(db: &Database, url: &str) -> Result<Feed, CommandError> {
    db.get_feed_by_url(url).await.map_err(|e| match e {
        DatabaseError::NotFound(_) => CommandError::UnknownFeed(url.to_string()),
        other => other.into(),
    })
}

pub async fn follow(db: &Database, user: &User, url: &str) -> Result<FeedFollow, CommandError> {
    let feed = feed_by_url(db, url).await?;
    db.follow_feed(user.id, feed.id).await.map_err(|e| match e {
        DatabaseError::UniqueViolation(_) => CommandError::AlreadyFollowing(url.to_string()),
        other => other.into(),
    })
}

pub async fn following(db: &Database, user: &User) -> Result<Vec<FeedFollow>, CommandError> {
    Ok(db.follows_for_user(user.id).await?)
}

pub async fn unfollow(db: &Database, user: &User, url: &str) -> Result<(), CommandError> {
    let feed = feed_by_url(db, url).await?;
    if db.unfollow_feed(user.id, feed.id).await? {
        Ok(())
    } else {
        Err(CommandError::NotFollowing(url.to_string()))
    }
}

pub async fn browse(db: &Database, user: &User, limit: i64) -> Result<Vec<Post>, CommandError> {
    Ok(db.posts_for_user(user.id, limit).await?)
}

/// Delete every user; feeds, follows and posts go with them.
pub async fn reset(db: &Database) -> Result<u64, CommandError> {
    Ok(db.reset_users().await?)
}
