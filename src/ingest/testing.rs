//! In-memory collaborators for exercising the cycle and poller without I/O.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::feed::{FeedSource, FetchError, RssChannel, RssFeed, RssItem};
use crate::storage::{DatabaseError, Feed, FeedStore, NewPost, Post};

#[derive(Default)]
struct Inner {
    feeds: Vec<Feed>,
    posts: Vec<Post>,
    failing_urls: HashSet<String>,
    fail_marks: bool,
    clock: i64,
    selections: usize,
}

#[derive(Clone, Default)]
pub(crate) struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub(crate) fn with_feeds(urls: &[&str]) -> Self {
        let store = Self::default();
        {
            let mut inner = store.inner.lock().unwrap();
            for (i, url) in urls.iter().enumerate() {
                inner.feeds.push(Feed {
                    id: i as i64 + 1,
                    name: format!("Feed {}", i + 1),
                    url: url.to_string(),
                    user_id: 1,
                    created_at: 0,
                    updated_at: 0,
                    last_fetched_at: None,
                });
            }
        }
        store
    }

    pub(crate) fn fail_posts_for(&self, url: &str) {
        self.inner.lock().unwrap().failing_urls.insert(url.to_string());
    }

    pub(crate) fn fail_marks(&self) {
        self.inner.lock().unwrap().fail_marks = true;
    }

    pub(crate) fn post_urls(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner.posts.iter().map(|p| p.url.clone()).collect()
    }

    /// How many times a feed was requested from the store (one per pass)
    pub(crate) fn selections(&self) -> usize {
        self.inner.lock().unwrap().selections
    }

    pub(crate) fn last_fetched(&self, feed_id: i64) -> Option<i64> {
        let inner = self.inner.lock().unwrap();
        inner
            .feeds
            .iter()
            .find(|f| f.id == feed_id)
            .and_then(|f| f.last_fetched_at)
    }
}

#[async_trait]
impl FeedStore for MemoryStore {
    async fn next_feed_to_fetch(&self) -> Result<Feed, DatabaseError> {
        let mut inner = self.inner.lock().unwrap();
        inner.selections += 1;
        inner
            .feeds
            .iter()
            .min_by_key(|f| (f.last_fetched_at, f.id))
            .cloned()
            .ok_or(DatabaseError::NotFound("no feeds to fetch"))
    }

    async fn mark_feed_fetched(&self, feed_id: i64) -> Result<(), DatabaseError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_marks {
            return Err(DatabaseError::Other(sqlx::Error::PoolTimedOut));
        }
        inner.clock += 1;
        let now = inner.clock;
        let feed = inner
            .feeds
            .iter_mut()
            .find(|f| f.id == feed_id)
            .ok_or(DatabaseError::NotFound("feed"))?;
        feed.last_fetched_at = Some(now);
        Ok(())
    }

    async fn create_post(&self, post: &NewPost) -> Result<Post, DatabaseError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.failing_urls.contains(&post.url) {
            return Err(DatabaseError::Other(sqlx::Error::PoolTimedOut));
        }
        if inner
            .posts
            .iter()
            .any(|p| p.feed_id == post.feed_id && p.url == post.url)
        {
            return Err(DatabaseError::DuplicateKey("posts.feed_id, posts.url".to_string()));
        }
        let created = Post {
            id: inner.posts.len() as i64 + 1,
            feed_id: post.feed_id,
            title: post.title.clone(),
            url: post.url.clone(),
            description: post.description.clone(),
            published_at: post.published_at,
            created_at: inner.clock,
            updated_at: inner.clock,
        };
        inner.posts.push(created.clone());
        Ok(created)
    }
}

/// Serves the same document for every URL, or fails every fetch.
#[derive(Clone)]
pub(crate) struct StaticSource {
    document: Option<RssFeed>,
    fetches: Arc<AtomicUsize>,
}

impl StaticSource {
    pub(crate) fn new(document: RssFeed) -> Self {
        Self {
            document: Some(document),
            fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            document: None,
            fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedSource for StaticSource {
    async fn fetch(&self, _url: &str) -> Result<RssFeed, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.document.clone().ok_or(FetchError::HttpStatus(503))
    }
}

pub(crate) fn feed_with_items(links: &[&str]) -> RssFeed {
    RssFeed {
        channel: RssChannel {
            title: "Static".to_string(),
            description: String::new(),
            items: links
                .iter()
                .map(|link| RssItem {
                    title: format!("Post at {link}"),
                    link: link.to_string(),
                    description: "<p>Body</p>".to_string(),
                    pub_date: "2021-01-12 08:30:00".to_string(),
                })
                .collect(),
        },
    }
}
