use async_trait::async_trait;
use std::convert::Infallible;
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};

use super::cycle::{CycleError, CycleReport, IngestionCycle};
use crate::config::{parse_interval, ConfigError};
use crate::feed::FeedSource;
use crate::storage::FeedStore;

/// Source of the poller's cadence, injectable so tests control time.
#[async_trait]
pub trait Ticker: Send {
    /// Wait for the next tick. The first call returns immediately.
    async fn tick(&mut self);
}

/// [`Ticker`] over [`tokio::time::interval`].
///
/// Ticks stay on the fixed grid laid down at start, whatever a pass costs.
/// When a pass overruns the period, one missed tick fires as soon as it
/// finishes and the rest are skipped, so later passes land back on the grid.
pub struct IntervalTicker {
    interval: Interval,
}

impl IntervalTicker {
    /// # Panics
    ///
    /// If `period` is zero. [`parse_interval`] never returns a zero duration.
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval }
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) {
        self.interval.tick().await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    /// Waiting for the next tick
    Idle,
    /// A pass is in progress
    Running,
}

/// Drives [`IngestionCycle`] passes, one at a time, on every tick.
pub struct Poller<S, F, T> {
    cycle: IngestionCycle<S, F>,
    ticker: T,
    state: PollerState,
}

impl<S: FeedStore, F: FeedSource, T: Ticker> Poller<S, F, T> {
    pub fn new(cycle: IngestionCycle<S, F>, ticker: T) -> Self {
        Self {
            cycle,
            ticker,
            state: PollerState::Idle,
        }
    }

    pub fn state(&self) -> PollerState {
        self.state
    }

    /// Wait for the next tick, then run one pass to completion.
    ///
    /// The outcome is logged here; a failed pass leaves the poller idle and
    /// ready for the next tick like any other.
    pub async fn poll_once(&mut self) -> Result<CycleReport, CycleError> {
        self.ticker.tick().await;

        self.state = PollerState::Running;
        let result = self.cycle.run_once().await;
        self.state = PollerState::Idle;

        match &result {
            Ok(report) => tracing::info!(
                feed_id = report.feed_id,
                name = %report.feed_name,
                items = report.items,
                created = report.created,
                duplicates = report.duplicates,
                skipped = report.skipped,
                "Feed ingested"
            ),
            Err(CycleError::Select(e)) => {
                tracing::warn!(error = %e, "No feed selected this pass")
            }
            Err(e) => tracing::warn!(error = %e, "Ingestion pass failed"),
        }

        result
    }

    /// Poll forever. Only process shutdown stops this.
    pub async fn run(mut self) -> Infallible {
        loop {
            // Outcome already logged by poll_once
            let _ = self.poll_once().await;
        }
    }
}

/// Run ingestion passes every `interval` (e.g. `"30s"`, `"1m"`, `"1h"`) until
/// the process exits.
///
/// # Errors
///
/// [`ConfigError::InvalidInterval`] if `interval` is zero or malformed; this
/// is checked before the first pass.
pub async fn run_forever<S, F>(store: S, source: F, interval: &str) -> Result<Infallible, ConfigError>
where
    S: FeedStore,
    F: FeedSource,
{
    let period = parse_interval(interval)?;
    tracing::info!(interval = ?period, "Collecting feeds");

    let poller = Poller::new(IngestionCycle::new(store, source), IntervalTicker::new(period));
    Ok(poller.run().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{FetchError, RssFeed};
    use crate::ingest::testing::{feed_with_items, MemoryStore, StaticSource};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Ticks immediately and counts how often it was asked.
    #[derive(Clone, Default)]
    struct CountingTicker {
        ticks: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Ticker for CountingTicker {
        async fn tick(&mut self) {
            self.ticks.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_failed_passes_do_not_stop_polling() {
        let store = MemoryStore::with_feeds(&["https://a.example/rss", "https://b.example/rss"]);
        let ticker = CountingTicker::default();
        let mut poller = Poller::new(
            IngestionCycle::new(store.clone(), StaticSource::failing()),
            ticker.clone(),
        );

        for _ in 0..3 {
            assert!(matches!(
                poller.poll_once().await,
                Err(CycleError::Fetch { .. })
            ));
            assert_eq!(poller.state(), PollerState::Idle);
        }

        assert_eq!(ticker.ticks.load(Ordering::SeqCst), 3);
        assert_eq!(store.selections(), 3);
        // Rotation continued despite every fetch failing: a, b, a
        assert_eq!(store.last_fetched(1), Some(3));
        assert_eq!(store.last_fetched(2), Some(2));
    }

    #[tokio::test]
    async fn test_empty_store_pass_is_not_fatal() {
        let store = MemoryStore::default();
        let source = StaticSource::new(feed_with_items(&["https://example.com/1"]));
        let mut poller = Poller::new(
            IngestionCycle::new(store.clone(), source),
            CountingTicker::default(),
        );

        assert!(matches!(
            poller.poll_once().await,
            Err(CycleError::Select(_))
        ));
        assert!(matches!(
            poller.poll_once().await,
            Err(CycleError::Select(_))
        ));
        assert_eq!(poller.state(), PollerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_pass_runs_immediately() {
        let store = MemoryStore::with_feeds(&["https://a.example/rss"]);
        let source = StaticSource::new(feed_with_items(&["https://example.com/1"]));
        let poller = Poller::new(
            IngestionCycle::new(store.clone(), source),
            IntervalTicker::new(Duration::from_secs(60)),
        );

        let _ = tokio::time::timeout(Duration::from_secs(1), poller.run()).await;

        assert_eq!(store.selections(), 1);
        assert_eq!(store.post_urls(), vec!["https://example.com/1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_passes_follow_fixed_interval() {
        let store = MemoryStore::with_feeds(&["https://a.example/rss"]);
        let source = StaticSource::new(feed_with_items(&["https://example.com/1"]));
        let poller = Poller::new(
            IngestionCycle::new(store.clone(), source.clone()),
            IntervalTicker::new(Duration::from_secs(10)),
        );

        // Ticks at 0s, 10s, 20s and 30s
        let _ = tokio::time::timeout(Duration::from_secs(35), poller.run()).await;

        assert_eq!(store.selections(), 4);
        assert_eq!(source.fetch_count(), 4);
        // Re-fetching the same document stored nothing new
        assert_eq!(store.post_urls().len(), 1);
    }

    /// Serves `document`; the first fetch takes `first_delay`.
    #[derive(Clone)]
    struct SlowFirstSource {
        document: RssFeed,
        first_delay: Duration,
        fetches: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl FeedSource for SlowFirstSource {
        async fn fetch(&self, _url: &str) -> Result<RssFeed, FetchError> {
            if self.fetches.fetch_add(1, Ordering::SeqCst) == 0 {
                tokio::time::sleep(self.first_delay).await;
            }
            Ok(self.document.clone())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_overrun_does_not_shift_schedule() {
        let store = MemoryStore::with_feeds(&["https://a.example/rss"]);
        let source = SlowFirstSource {
            document: feed_with_items(&["https://example.com/1"]),
            first_delay: Duration::from_secs(12),
            fetches: Arc::new(AtomicUsize::new(0)),
        };
        let poller = Poller::new(
            IngestionCycle::new(store.clone(), source.clone()),
            IntervalTicker::new(Duration::from_secs(10)),
        );

        // Pass at 0s runs until 12s, the missed 10s tick fires at 12s,
        // then the grid resumes at 20s rather than 22s
        let _ = tokio::time::timeout(Duration::from_secs(21), poller.run()).await;

        assert_eq!(source.fetches.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_forever_rejects_bad_interval() {
        let store = MemoryStore::default();
        let source = StaticSource::failing();

        let result = run_forever(store.clone(), source.clone(), "0s").await;
        assert!(matches!(result, Err(ConfigError::InvalidInterval(_))));

        let result = run_forever(store.clone(), source, "soon").await;
        assert!(matches!(result, Err(ConfigError::InvalidInterval(_))));
        assert_eq!(store.selections(), 0);
    }
}
