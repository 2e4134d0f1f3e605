use super::schema::Database;
use super::types::{DatabaseError, Feed, FeedWithOwner};

const FEED_COLUMNS: &str = "id, name, url, user_id, created_at, updated_at, last_fetched_at";

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Create a feed owned by `user_id`. The URL is globally unique.
    pub async fn create_feed(
        &self,
        name: &str,
        url: &str,
        user_id: i64,
    ) -> Result<Feed, DatabaseError> {
        let now = chrono::Utc::now().timestamp();
        let feed = sqlx::query_as::<_, Feed>(&format!(
            r#"
            INSERT INTO feeds (name, url, user_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING {FEED_COLUMNS}
        "#
        ))
        .bind(name)
        .bind(url)
        .bind(user_id)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(feed)
    }

    pub async fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>, DatabaseError> {
        let feed =
            sqlx::query_as::<_, Feed>(&format!("SELECT {FEED_COLUMNS} FROM feeds WHERE url = ?"))
                .bind(url)
                .fetch_optional(&self.pool)
                .await?;
        Ok(feed)
    }

    pub async fn get_feed(&self, feed_id: i64) -> Result<Option<Feed>, DatabaseError> {
        let feed =
            sqlx::query_as::<_, Feed>(&format!("SELECT {FEED_COLUMNS} FROM feeds WHERE id = ?"))
                .bind(feed_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(feed)
    }

    /// All feeds with the name of the user who added them
    pub async fn get_feeds(&self) -> Result<Vec<FeedWithOwner>, DatabaseError> {
        let feeds = sqlx::query_as::<_, FeedWithOwner>(
            r#"
            SELECT f.id, f.name, f.url, u.name AS user_name
            FROM feeds f
            JOIN users u ON u.id = f.user_id
            ORDER BY f.name, f.id
        "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(feeds)
    }

    /// The feed that has waited longest since its last poll.
    ///
    /// Never-fetched feeds (`last_fetched_at IS NULL`) come first; ties are
    /// broken by id so the rotation is deterministic.
    ///
    /// # Errors
    ///
    /// [`DatabaseError::NotFound`] when no feeds exist.
    pub async fn next_feed_to_fetch(&self) -> Result<Feed, DatabaseError> {
        sqlx::query_as::<_, Feed>(&format!(
            r#"
            SELECT {FEED_COLUMNS}
            FROM feeds
            ORDER BY last_fetched_at ASC NULLS FIRST, id ASC
            LIMIT 1
        "#
        ))
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DatabaseError::NotFound("no feeds to fetch"))
    }

    /// Stamp the feed as fetched now and bump `updated_at`.
    ///
    /// `last_fetched_at` is in unix milliseconds and strictly greater than
    /// every stamp already stored, so feeds marked within the same clock
    /// tick still rotate in the order they were fetched.
    pub async fn mark_feed_fetched(&self, feed_id: i64) -> Result<(), DatabaseError> {
        let now = chrono::Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE feeds
            SET last_fetched_at = MAX(?, COALESCE((SELECT MAX(last_fetched_at) FROM feeds), 0) + 1),
                updated_at = ?
            WHERE id = ?
        "#,
        )
        .bind(now.timestamp_millis())
        .bind(now.timestamp())
        .bind(feed_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound("feed"));
        }
        Ok(())
    }
}
