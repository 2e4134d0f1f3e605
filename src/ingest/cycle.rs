use thiserror::Error;

use crate::feed::{normalize_item, FeedSource, FetchError};
use crate::storage::{DatabaseError, FeedStore};

/// Why a pass ended without ingesting its feed.
///
/// None of these stop the poller; the next pass runs on schedule.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("Failed to select next feed: {0}")]
    Select(#[source] DatabaseError),

    #[error("Failed to mark feed {feed_id} as fetched: {source}")]
    Mark {
        feed_id: i64,
        #[source]
        source: DatabaseError,
    },

    #[error("Failed to fetch {url}: {source}")]
    Fetch {
        feed_id: i64,
        url: String,
        #[source]
        source: FetchError,
    },
}

/// Outcome of a pass that fetched its feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub feed_id: i64,
    pub feed_name: String,
    /// Items in the fetched document
    pub items: usize,
    /// Posts newly stored
    pub created: usize,
    /// Items already stored by an earlier pass
    pub duplicates: usize,
    /// Items dropped: no link, or a storage error other than a duplicate
    pub skipped: usize,
    /// Stored posts whose publication date could not be read
    pub undated: usize,
}

/// One select-fetch-store pass over exactly one feed.
pub struct IngestionCycle<S, F> {
    store: S,
    source: F,
}

impl<S: FeedStore, F: FeedSource> IngestionCycle<S, F> {
    pub fn new(store: S, source: F) -> Self {
        Self { store, source }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run a single pass.
    ///
    /// The selected feed is stamped as fetched *before* the network request,
    /// so a feed that hangs or keeps failing waits a full rotation before it
    /// is tried again instead of being re-selected every interval.
    ///
    /// Per-item failures never abort the pass: duplicates are counted and
    /// skipped silently, other storage errors are logged and skipped.
    pub async fn run_once(&self) -> Result<CycleReport, CycleError> {
        let feed = self
            .store
            .next_feed_to_fetch()
            .await
            .map_err(CycleError::Select)?;

        self.store
            .mark_feed_fetched(feed.id)
            .await
            .map_err(|source| CycleError::Mark {
                feed_id: feed.id,
                source,
            })?;

        tracing::info!(feed_id = feed.id, name = %feed.name, url = %feed.url, "Fetching feed");

        let document = self
            .source
            .fetch(&feed.url)
            .await
            .map_err(|source| CycleError::Fetch {
                feed_id: feed.id,
                url: feed.url.clone(),
                source,
            })?;

        let mut report = CycleReport {
            feed_id: feed.id,
            feed_name: feed.name.clone(),
            items: document.channel.items.len(),
            ..Default::default()
        };

        for item in &document.channel.items {
            let Some(entry) = normalize_item(feed.id, item) else {
                tracing::warn!(feed_id = feed.id, title = %item.title, "Item has no link, skipping");
                report.skipped += 1;
                continue;
            };

            if let Some(e) = &entry.date_error {
                tracing::warn!(
                    feed_id = feed.id,
                    url = %entry.post.url,
                    error = %e,
                    "Unparsable publication date, storing post without one"
                );
            }

            match self.store.create_post(&entry.post).await {
                Ok(_) => {
                    report.created += 1;
                    if entry.date_error.is_some() {
                        report.undated += 1;
                    }
                }
                Err(e) if e.is_duplicate_key() => {
                    tracing::trace!(feed_id = feed.id, url = %entry.post.url, "Post already stored");
                    report.duplicates += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        feed_id = feed.id,
                        url = %entry.post.url,
                        error = %e,
                        "Failed to store post, skipping"
                    );
                    report.skipped += 1;
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{HttpFetcher, RssItem, NO_DESCRIPTION};
    use crate::ingest::testing::{feed_with_items, MemoryStore, StaticSource};
    use crate::storage::Database;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const THREE_ITEMS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <title>Blog</title>
    <description>Posts</description>
    <item>
        <title>One</title>
        <link>https://example.com/1</link>
        <description>&lt;b&gt;bold&lt;/b&gt; text</description>
        <pubDate>Sun, 10 Jan 2021 00:00:00 +0000</pubDate>
    </item>
    <item>
        <title>Two</title>
        <link>https://example.com/2</link>
        <description>Comments</description>
        <pubDate>not a date</pubDate>
    </item>
    <item>
        <title>Three</title>
        <link>https://example.com/3</link>
        <pubDate>2021-01-12 08:30:00</pubDate>
    </item>
</channel></rss>"#;

    async fn mock_feed(body: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(body)
                    .insert_header("Content-Type", "application/rss+xml"),
            )
            .mount(&server)
            .await;
        server
    }

    async fn setup_db() -> (Database, i64) {
        let db = Database::open(":memory:").await.unwrap();
        let user = db.create_user("alice").await.unwrap();
        (db, user.id)
    }

    fn http_cycle(db: &Database) -> IngestionCycle<Database, HttpFetcher> {
        IngestionCycle::new(db.clone(), HttpFetcher::new(reqwest::Client::new()))
    }

    #[tokio::test]
    async fn test_three_items_stored_then_refetch_is_noop() {
        let server = mock_feed(THREE_ITEMS).await;
        let (db, user_id) = setup_db().await;
        let feed = db
            .create_feed("Blog", &format!("{}/rss", server.uri()), user_id)
            .await
            .unwrap();
        let cycle = http_cycle(&db);

        let first = cycle.run_once().await.unwrap();
        assert_eq!(
            first,
            CycleReport {
                feed_id: feed.id,
                feed_name: "Blog".to_string(),
                items: 3,
                created: 3,
                duplicates: 0,
                skipped: 0,
                undated: 1,
            }
        );

        let second = cycle.run_once().await.unwrap();
        assert_eq!(second.created, 0);
        assert_eq!(second.duplicates, 3);
        assert_eq!(db.get_posts_for_feed(feed.id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_posts_are_normalized() {
        let server = mock_feed(THREE_ITEMS).await;
        let (db, user_id) = setup_db().await;
        let feed = db
            .create_feed("Blog", &format!("{}/rss", server.uri()), user_id)
            .await
            .unwrap();

        http_cycle(&db).run_once().await.unwrap();

        let posts = db.get_posts_for_feed(feed.id).await.unwrap();
        assert_eq!(posts[0].title.as_deref(), Some("One"));
        assert_eq!(posts[0].description.as_deref(), Some("bold text"));
        assert_eq!(posts[0].published_at, Some(1_610_236_800));

        assert_eq!(posts[1].description.as_deref(), Some(NO_DESCRIPTION));
        assert_eq!(posts[1].published_at, None);

        assert_eq!(posts[2].description.as_deref(), Some(NO_DESCRIPTION));
        assert_eq!(posts[2].published_at, Some(1_610_440_200));
    }

    #[tokio::test]
    async fn test_never_fetched_feed_goes_first() {
        let server = mock_feed(THREE_ITEMS).await;
        let (db, user_id) = setup_db().await;
        let a = db
            .create_feed("A", &format!("{}/a", server.uri()), user_id)
            .await
            .unwrap();
        let b = db
            .create_feed("B", &format!("{}/b", server.uri()), user_id)
            .await
            .unwrap();
        let an_hour_ago = chrono::Utc::now().timestamp_millis() - 3_600_000;
        sqlx::query("UPDATE feeds SET last_fetched_at = ? WHERE id = ?")
            .bind(an_hour_ago)
            .bind(b.id)
            .execute(&db.pool)
            .await
            .unwrap();

        assert_eq!(db.next_feed_to_fetch().await.unwrap().id, a.id);

        let before = chrono::Utc::now().timestamp_millis();
        let report = http_cycle(&db).run_once().await.unwrap();
        assert_eq!(report.feed_id, a.id);

        let a = db.get_feed(a.id).await.unwrap().unwrap();
        let b = db.get_feed(b.id).await.unwrap().unwrap();
        assert!(a.last_fetched_at.unwrap() >= before);
        assert_eq!(b.last_fetched_at, Some(an_hour_ago));
    }

    #[tokio::test]
    async fn test_fetch_failure_still_marks_feed_fetched() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let (db, user_id) = setup_db().await;
        let broken = db
            .create_feed("Broken", &format!("{}/broken", server.uri()), user_id)
            .await
            .unwrap();
        let healthy = db
            .create_feed("Healthy", &format!("{}/healthy", server.uri()), user_id)
            .await
            .unwrap();

        let err = http_cycle(&db).run_once().await.unwrap_err();
        match err {
            CycleError::Fetch {
                feed_id,
                source: FetchError::HttpStatus(500),
                ..
            } => assert_eq!(feed_id, broken.id),
            other => panic!("Expected Fetch error, got {:?}", other),
        }

        assert!(db.get_posts_for_feed(broken.id).await.unwrap().is_empty());
        // The broken feed moved to the back of the rotation
        assert_eq!(db.next_feed_to_fetch().await.unwrap().id, healthy.id);
    }

    #[tokio::test]
    async fn test_empty_store_is_select_error() {
        let (db, _) = setup_db().await;
        let err = http_cycle(&db).run_once().await.unwrap_err();
        assert!(matches!(
            err,
            CycleError::Select(DatabaseError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_storage_error_skips_only_that_entry() {
        let store = MemoryStore::with_feeds(&["https://example.com/rss"]);
        store.fail_posts_for("https://example.com/2");
        let source = StaticSource::new(feed_with_items(&[
            "https://example.com/1",
            "https://example.com/2",
            "https://example.com/3",
        ]));

        let report = IngestionCycle::new(store.clone(), source)
            .run_once()
            .await
            .unwrap();

        assert_eq!(report.created, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.duplicates, 0);
        assert_eq!(
            store.post_urls(),
            vec!["https://example.com/1", "https://example.com/3"]
        );
    }

    #[tokio::test]
    async fn test_items_without_link_are_skipped() {
        let store = MemoryStore::with_feeds(&["https://example.com/rss"]);
        let mut document = feed_with_items(&["https://example.com/1"]);
        document.channel.items.push(RssItem {
            title: "Linkless".to_string(),
            ..Default::default()
        });

        let report = IngestionCycle::new(store.clone(), StaticSource::new(document))
            .run_once()
            .await
            .unwrap();

        assert_eq!(report.items, 2);
        assert_eq!(report.created, 1);
        assert_eq!(report.skipped, 1);
    }

    #[tokio::test]
    async fn test_mark_failure_aborts_before_fetch() {
        let store = MemoryStore::with_feeds(&["https://example.com/rss"]);
        store.fail_marks();
        let source = StaticSource::new(feed_with_items(&["https://example.com/1"]));

        let cycle = IngestionCycle::new(store.clone(), source.clone());
        let err = cycle.run_once().await.unwrap_err();

        assert!(matches!(err, CycleError::Mark { .. }));
        assert_eq!(source.fetch_count(), 0);
        assert!(store.post_urls().is_empty());
    }
}
