use async_trait::async_trait;

use super::schema::Database;
use super::types::{DatabaseError, Feed, NewPost, Post};

/// The storage operations the ingestion pipeline depends on.
///
/// Implementations must report a `(feed_id, url)` collision from
/// [`create_post`](FeedStore::create_post) as [`DatabaseError::DuplicateKey`]
/// so it can be told apart from real failures.
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Feed with the oldest `last_fetched_at`, never-fetched first.
    async fn next_feed_to_fetch(&self) -> Result<Feed, DatabaseError>;

    /// Stamp the feed as fetched now.
    async fn mark_feed_fetched(&self, feed_id: i64) -> Result<(), DatabaseError>;

    async fn create_post(&self, post: &NewPost) -> Result<Post, DatabaseError>;
}

#[async_trait]
impl FeedStore for Database {
    async fn next_feed_to_fetch(&self) -> Result<Feed, DatabaseError> {
        Database::next_feed_to_fetch(self).await
    }

    async fn mark_feed_fetched(&self, feed_id: i64) -> Result<(), DatabaseError> {
        Database::mark_feed_fetched(self, feed_id).await
    }

    async fn create_post(&self, post: &NewPost) -> Result<Post, DatabaseError> {
        Database::create_post(self, post).await
    }
}
