//! Feed retrieval and normalization.
//!
//! - [`parser`] - RSS 2.0 decoding with `quick-xml` serde, plus HTML entity unescaping
//! - [`fetcher`] - HTTP GET with the `gator` user agent, size limit and timeout
//! - [`normalize`] - date parsing and description cleanup for storage
//!
//! # Example
//!
//! ```ignore
//! use gator::feed::{normalize_item, FeedSource, HttpFetcher, DEFAULT_TIMEOUT};
//!
//! let fetcher = HttpFetcher::with_timeout(DEFAULT_TIMEOUT)?;
//! let feed = fetcher.fetch("https://example.com/index.xml").await?;
//! for item in &feed.channel.items {
//!     let entry = normalize_item(feed_id, item);
//! }
//! ```

mod fetcher;
mod normalize;
mod parser;

pub use fetcher::{fetch_feed, FeedSource, FetchError, HttpFetcher, DEFAULT_TIMEOUT, USER_AGENT};
pub use normalize::{
    normalize_description, normalize_item, parse_date, strip_markup, DateParseError,
    NormalizedEntry, NO_DESCRIPTION,
};
pub use parser::{parse_rss, RssChannel, RssFeed, RssItem};
