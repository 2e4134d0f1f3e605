//! Command handlers for the `gator` binary.
//!
//! Each handler receives the [`Session`] explicitly; user selection is
//! persisted by saving the config, never through shared global state.

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use std::path::PathBuf;

use gator::config::Config;
use gator::feed::{FeedSource, HttpFetcher};
use gator::ingest::{run_forever, IngestionCycle};
use gator::storage::{Database, DatabaseError, User};

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a user and log in as them
    Register { name: String },
    /// Switch the current user
    Login { name: String },
    /// Delete all users, feeds, follows and posts
    Reset,
    /// List users
    Users,
    /// Add a feed and follow it
    Addfeed { name: String, url: String },
    /// List all feeds
    Feeds,
    /// Follow an existing feed by URL
    Follow { url: String },
    /// List feeds the current user follows
    Following,
    /// Stop following a feed
    Unfollow { url: String },
    /// Poll feeds forever at a fixed interval (e.g. 30s, 5m, 1h)
    Agg { interval: Option<String> },
    /// Run a single ingestion pass
    Scrape,
    /// Fetch one feed and print it as JSON without storing anything
    Fetch { url: String },
    /// Show the newest posts from followed feeds
    Browse {
        #[arg(default_value_t = 2)]
        limit: i64,
    },
}

pub struct Session {
    pub db: Database,
    pub config: Config,
    pub config_path: PathBuf,
}

impl Session {
    fn set_current_user(&mut self, name: &str) -> Result<()> {
        self.config.current_user_name = Some(name.to_string());
        self.config
            .save(&self.config_path)
            .with_context(|| format!("Failed to save {}", self.config_path.display()))
    }

    /// The logged-in user, required by commands that act on someone's behalf.
    async fn current_user(&self) -> Result<User> {
        let Some(name) = self.config.current_user_name.as_deref() else {
            bail!("No user logged in: run `gator login <name>` first");
        };
        match self.db.get_user_by_name(name).await? {
            Some(user) => Ok(user),
            None => bail!("Current user {name:?} does not exist; register or log in again"),
        }
    }

    fn fetcher(&self) -> Result<HttpFetcher> {
        HttpFetcher::with_timeout(self.config.request_timeout())
            .context("Failed to build HTTP client")
    }
}

pub async fn run(session: &mut Session, command: Command) -> Result<()> {
    match command {
        Command::Register { name } => register(session, &name).await,
        Command::Login { name } => login(session, &name).await,
        Command::Reset => reset(session).await,
        Command::Users => users(session).await,
        Command::Addfeed { name, url } => add_feed(session, &name, &url).await,
        Command::Feeds => feeds(session).await,
        Command::Follow { url } => follow(session, &url).await,
        Command::Following => following(session).await,
        Command::Unfollow { url } => unfollow(session, &url).await,
        Command::Agg { interval } => aggregate(session, interval).await,
        Command::Scrape => scrape(session).await,
        Command::Fetch { url } => fetch(session, &url).await,
        Command::Browse { limit } => browse(session, limit).await,
    }
}

async fn register(session: &mut Session, name: &str) -> Result<()> {
    match session.db.create_user(name).await {
        Ok(_) => {}
        Err(DatabaseError::DuplicateKey(_)) => bail!("User {name:?} already exists"),
        Err(e) => return Err(e).context("Failed to create user"),
    }
    session.set_current_user(name)?;
    println!("User {name} created and logged in");
    Ok(())
}

async fn login(session: &mut Session, name: &str) -> Result<()> {
    if session.db.get_user_by_name(name).await?.is_none() {
        bail!("User {name:?} does not exist");
    }
    session.set_current_user(name)?;
    println!("Logged in as {name}");
    Ok(())
}

async fn reset(session: &mut Session) -> Result<()> {
    let removed = session.db.reset_users().await.context("Failed to reset users")?;
    tracing::info!(users = removed, "Users table reset");
    println!("Removed {removed} users");
    Ok(())
}

async fn users(session: &mut Session) -> Result<()> {
    let current = session.config.current_user_name.as_deref();
    for user in session.db.get_users().await? {
        if Some(user.name.as_str()) == current {
            println!("* {} (current)", user.name);
        } else {
            println!("* {}", user.name);
        }
    }
    Ok(())
}

/// Feed URLs must be absolute http(s) URLs
fn validate_feed_url(raw: &str) -> Result<url::Url> {
    let parsed = url::Url::parse(raw).with_context(|| format!("Invalid feed URL {raw:?}"))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => bail!("Unsupported URL scheme {other:?}: feeds must use http or https"),
    }
}

async fn add_feed(session: &mut Session, name: &str, url: &str) -> Result<()> {
    let user = session.current_user().await?;
    validate_feed_url(url)?;

    let feed = match session.db.create_feed(name, url, user.id).await {
        Ok(feed) => feed,
        Err(DatabaseError::DuplicateKey(_)) => {
            bail!("A feed with URL {url} already exists; use `gator follow {url}`")
        }
        Err(e) => return Err(e).context("Failed to create feed"),
    };
    session
        .db
        .create_feed_follow(user.id, feed.id)
        .await
        .context("Failed to follow new feed")?;

    println!("Added {} ({}) and followed it as {}", feed.name, feed.url, user.name);
    Ok(())
}

async fn feeds(session: &mut Session) -> Result<()> {
    for feed in session.db.get_feeds().await? {
        println!("{}", feed.name);
        println!("URL: {}", feed.url);
        println!("Added by: {}", feed.user_name);
        println!("{}", "-".repeat(50));
    }
    Ok(())
}

async fn follow(session: &mut Session, url: &str) -> Result<()> {
    let user = session.current_user().await?;
    let Some(feed) = session.db.get_feed_by_url(url).await? else {
        bail!("No feed with URL {url}; add it with `gator addfeed <name> {url}`");
    };

    match session.db.create_feed_follow(user.id, feed.id).await {
        Ok(follow) => println!("{} is now following {}", follow.user_name, follow.feed_name),
        Err(DatabaseError::DuplicateKey(_)) => println!("{} already follows {}", user.name, feed.name),
        Err(e) => return Err(e).context("Failed to follow feed"),
    }
    Ok(())
}

async fn following(session: &mut Session) -> Result<()> {
    let user = session.current_user().await?;
    println!("{} is following:", user.name);
    for follow in session.db.get_feed_follows_for_user(user.id).await? {
        println!(" * {}", follow.feed_name);
    }
    Ok(())
}

async fn unfollow(session: &mut Session, url: &str) -> Result<()> {
    let user = session.current_user().await?;
    if !session.db.delete_feed_follow(user.id, url).await? {
        bail!("{} is not following {url}", user.name);
    }
    println!("{} unfollowed {url}", user.name);
    Ok(())
}

async fn aggregate(session: &mut Session, interval: Option<String>) -> Result<()> {
    let Some(interval) = interval.or_else(|| session.config.poll_interval.clone()) else {
        bail!("No interval given: run `gator agg <interval>` or set poll_interval in the config");
    };
    let fetcher = session.fetcher()?;

    tokio::select! {
        result = run_forever(session.db.clone(), fetcher, &interval) => {
            match result? {}
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            tracing::info!("Shutting down");
        }
    }
    Ok(())
}

async fn scrape(session: &mut Session) -> Result<()> {
    let cycle = IngestionCycle::new(session.db.clone(), session.fetcher()?);
    let report = cycle.run_once().await?;
    println!(
        "{}: {} items, {} new, {} already stored, {} skipped",
        report.feed_name, report.items, report.created, report.duplicates, report.skipped
    );
    Ok(())
}

async fn fetch(session: &mut Session, url: &str) -> Result<()> {
    validate_feed_url(url)?;
    let feed = session.fetcher()?.fetch(url).await?;
    println!("{}", serde_json::to_string_pretty(&feed)?);
    Ok(())
}

async fn browse(session: &mut Session, limit: i64) -> Result<()> {
    let user = session.current_user().await?;
    let posts = session.db.get_posts_for_user(user.id, limit).await?;
    if posts.is_empty() {
        println!("No posts yet. Follow some feeds and run `gator agg`.");
        return Ok(());
    }

    for post in posts {
        let published = post
            .published_at
            .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "undated".to_string());
        println!("{}  {}", published, post.title.as_deref().unwrap_or("(untitled)"));
        println!("    {}", post.url);
        if let Some(description) = &post.description {
            println!("    {}", description);
        }
        println!();
    }
    Ok(())
}
