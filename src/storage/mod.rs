//! SQLite persistence for users, feeds, follows and posts.
//!
//! The ingestion pipeline only sees the narrow [`FeedStore`] trait; the rest
//! of [`Database`] serves the interactive commands.

mod feeds;
mod follows;
mod posts;
mod schema;
mod store;
mod types;
mod users;

pub use schema::Database;
pub use store::FeedStore;
pub use types::{DatabaseError, Feed, FeedFollow, FeedWithOwner, NewPost, Post, User};
