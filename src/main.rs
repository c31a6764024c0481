use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use gator::commands::{self, DEFAULT_BROWSE_LIMIT};
use gator::config::{parse_interval, Config};
use gator::scheduler::Scheduler;
use gator::shutdown;
use gator::storage::{Database, DatabaseError};

/// Get the config directory path (~/.config/gator/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("gator"))
}

#[derive(Parser, Debug)]
#[command(name = "gator", version, about = "RSS feed aggregator")]
struct Args {
    /// Config file (default: ~/.config/gator/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Database file, overriding `database_path` from the config
    #[arg(long, global = true, value_name = "FILE")]
    db: Option<PathBuf>,

    /// Act as this user, overriding `current_user` from the config
    #[arg(long, short, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a user and make it the current user
    Register { name: String },
    /// Make an existing user the current user
    Login { name: String },
    /// List users
    Users,
    /// Register a feed and follow it
    #[command(name = "addfeed")]
    AddFeed { name: String, url: String },
    /// List all registered feeds
    Feeds,
    /// Follow an already registered feed
    Follow { url: String },
    /// List followed feeds
    Following,
    /// Stop following a feed
    Unfollow { url: String },
    /// Show the newest posts from followed feeds
    Browse {
        #[arg(long, short, default_value_t = DEFAULT_BROWSE_LIMIT)]
        limit: i64,
    },
    /// Poll feeds every INTERVAL (e.g. 30s, 1m, 1h30m) until interrupted
    Agg {
        #[arg(value_parser = parse_interval)]
        interval: Duration,
    },
    /// Delete all users, feeds, follows and posts
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    // RUST_LOG wins; the config's log_level applies otherwise
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("Invalid log_level in config")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let db_path = args
        .db
        .clone()
        .unwrap_or_else(|| config.database_path_in(&config_dir));
    let db = open_database(&db_path).await?;

    let user_name = args.user.as_deref().or(config.current_user.as_deref());

    match args.command {
        Command::Register { name } => {
            let user = commands::register(&db, &name).await?;
            remember_user(&config_path, &user.name)?;
            println!("User created: {} (id {})", user.name, user.id);
        }
        Command::Login { name } => {
            let user = commands::login(&db, &name).await?;
            remember_user(&config_path, &user.name)?;
            println!("Logged in as {}", user.name);
        }
        Command::Users => {
            for user in db.list_users().await? {
                if Some(user.name.as_str()) == user_name {
                    println!("* {} (current)", user.name);
                } else {
                    println!("* {}", user.name);
                }
            }
        }
        Command::AddFeed { name, url } => {
            let user = commands::current_user(&db, user_name).await?;
            let (feed, follow) = commands::add_feed(&db, &user, &name, &url).await?;
            println!("Feed added: {} ({})", feed.name, feed.url);
            println!("{} now follows {}", follow.user_name, follow.feed_name);
        }
        Command::Feeds => {
            let feeds = commands::list_feeds(&db).await?;
            if feeds.is_empty() {
                println!("No feeds registered.");
            }
            for entry in feeds {
                let fetched = entry
                    .feed
                    .last_fetched_at
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                    .unwrap_or_else(|| "never".to_string());
                println!("* {}", entry.feed.name);
                println!("  URL:          {}", entry.feed.url);
                println!("  Added by:     {}", entry.owner);
                println!("  Last fetched: {}", fetched);
            }
        }
        Command::Follow { url } => {
            let user = commands::current_user(&db, user_name).await?;
            let follow = commands::follow(&db, &user, &url).await?;
            println!("{} now follows {}", follow.user_name, follow.feed_name);
        }
        Command::Following => {
            let user = commands::current_user(&db, user_name).await?;
            for follow in commands::following(&db, &user).await? {
                println!("* {} ({})", follow.feed_name, follow.feed_url);
            }
        }
        Command::Unfollow { url } => {
            let user = commands::current_user(&db, user_name).await?;
            commands::unfollow(&db, &user, &url).await?;
            println!("{} unfollowed {}", user.name, url);
        }
        Command::Browse { limit } => {
            let user = commands::current_user(&db, user_name).await?;
            let posts = commands::browse(&db, &user, limit).await?;
            if posts.is_empty() {
                println!("No posts yet. Run `gator agg <interval>` to collect some.");
            }
            for post in posts {
                let published = post
                    .published_at
                    .map(|t| t.format("%a %b %d %Y").to_string())
                    .unwrap_or_else(|| "undated".to_string());
                println!("{} from {}", published, post.feed_name);
                println!("--- {} ---", post.title);
                if !post.description.is_empty() {
                    println!("    {}", post.description);
                }
                println!("Link: {}", post.url);
                println!("=====================================");
            }
        }
        Command::Agg { interval } => run_aggregator(db, &config, interval).await?,
        Command::Reset => {
            let removed = commands::reset(&db).await?;
            println!("Database reset: {} users removed.", removed);
        }
    }

    Ok(())
}

fn remember_user(config_path: &Path, name: &str) -> Result<()> {
    Config::set_current_user(config_path, name).with_context(|| {
        format!("Failed to save current user to {}", config_path.display())
    })?;
    Ok(())
}

async fn open_database(path: &Path) -> Result<Database> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
            restrict_permissions(parent);
        }
    }

    let path_str = path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    match Database::open(path_str).await {
        Ok(db) => Ok(db),
        Err(DatabaseError::Locked) => {
            eprintln!("Error: the database at {} is locked by another process.", path.display());
            std::process::exit(1);
        }
        Err(e) => Err(anyhow::anyhow!("Failed to open database {}: {}", path.display(), e)),
    }
}

/// User-only access on the directory holding the database
fn restrict_permissions(dir: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)) {
            tracing::warn!(path = %dir.display(), error = %e, "Failed to set directory permissions to 0700");
        }
    }
    #[cfg(not(unix))]
    let _ = dir;
}

async fn run_aggregator(db: Database, config: &Config, interval: Duration) -> Result<()> {
    let fetcher = config.fetcher()?;
    let scheduler = Scheduler::new(db, fetcher).with_workers(config.workers);

    let (trigger, signal) = shutdown::channel();
    tokio::spawn(async move {
        wait_for_termination().await;
        tracing::info!("Termination signal received");
        trigger.trigger();
    });

    println!("Collecting feeds every {:?}", interval);
    let ticks = scheduler.run(interval, signal).await;
    println!("Stopped after {} ticks.", ticks);
    Ok(())
}

async fn wait_for_termination() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler, only Ctrl-C will stop");
            }
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
