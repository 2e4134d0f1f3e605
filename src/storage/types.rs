use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Storage errors, classified so callers can branch on the condition
/// instead of inspecting message text.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// A uniqueness constraint rejected the write (e.g. a post with the same
    /// feed and URL already exists).
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// The requested row does not exist.
    #[error("Not found: {0}")]
    NotFound(&'static str),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(sqlx::Error),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                DatabaseError::DuplicateKey(db_err.message().to_string())
            }
            other => DatabaseError::Other(other),
        }
    }
}

impl DatabaseError {
    /// True when the write was rejected by a uniqueness constraint.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, DatabaseError::DuplicateKey(_))
    }
}

// ============================================================================
// Data Structures
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A subscribed RSS source.
///
/// `last_fetched_at` is `None` until the feed has been polled once; such
/// feeds are always picked before any previously fetched feed. Unlike the
/// other timestamps it is in unix milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Feed {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub user_id: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_fetched_at: Option<i64>,
}

/// Feed joined with the name of the user who added it
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FeedWithOwner {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub user_name: String,
}

/// A follow relation, joined with the names on both sides
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FeedFollow {
    pub id: i64,
    pub user_id: i64,
    pub feed_id: i64,
    pub user_name: String,
    pub feed_name: String,
    pub created_at: i64,
}

/// A single stored entry from a feed. Unique per `(feed_id, url)`.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Post {
    pub id: i64,
    pub feed_id: i64,
    pub title: Option<String>,
    pub url: String,
    pub description: Option<String>,
    pub published_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A normalized entry ready to be persisted as a [`Post`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub feed_id: i64,
    pub title: Option<String>,
    pub url: String,
    pub description: Option<String>,
    pub published_at: Option<i64>,
}
