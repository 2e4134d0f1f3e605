//! gator: a personal RSS aggregator.
//!
//! Users follow feeds; a single poller fetches the least recently fetched
//! feed on a fixed interval and stores its entries as posts.

pub mod config;
pub mod feed;
pub mod ingest;
pub mod storage;
