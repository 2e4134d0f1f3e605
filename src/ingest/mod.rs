//! The polling and ingestion pipeline.
//!
//! [`Poller`] waits on a [`Ticker`] and runs one [`IngestionCycle`] per tick.
//! Each cycle picks the feed that has waited longest, stamps it as fetched,
//! downloads it and stores every entry not seen before. Nothing that happens
//! inside a cycle stops the poller.

mod cycle;
mod poller;
#[cfg(test)]
pub(crate) mod testing;

pub use cycle::{CycleError, CycleReport, IngestionCycle};
pub use poller::{run_forever, IntervalTicker, Poller, PollerState, Ticker};
