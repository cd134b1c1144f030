//! # nxi_reader
//!
//! Offline reader for the Next (ex NextINpact) news site.
//!
//! Articles and comments are pulled from the site's WordPress REST API,
//! normalised for offline display, kept in a local SQLite cache together
//! with the reader's state (read flags, position in comment threads) and
//! rendered as standalone HTML pages.
//!
//! ## Usage
//!
//! ```sh
//! nxi_reader sync
//! nxi_reader list --unread
//! nxi_reader show 151234 -o ./pages
//! ```
//!
//! ## Architecture
//!
//! 1. **Fetching**: [`api`] talks HTTP, with retries
//! 2. **Parsing**: [`parser`] turns API JSON into articles and comments and
//!    rewrites their HTML
//! 3. **Storage**: [`cache`] keeps everything in SQLite
//! 4. **Output**: [`outputs`] writes HTML pages and a JSON index

use clap::Parser;
use std::error::Error;
use std::path::Path;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cache;
mod cli;
mod config;
mod error;
mod images;
mod models;
mod outputs;
mod parser;
mod sync;
mod utils;

use api::client_from_config;
use cache::Cache;
use cli::{Cli, Command};
use config::{DataPaths, ReaderConfig};
use error::NewsError;
use outputs::{html, json};
use utils::{ensure_writable_dir, format_timestamp, now_timestamp};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();

    let args = Cli::parse();
    debug!(?args.data_dir, ?args.db, ?args.config, "Parsed CLI arguments");

    let mut config = ReaderConfig::load(args.config.as_deref()).await?;
    let paths = DataPaths::new(&args.data_dir, args.db.clone());

    if let Err(e) = ensure_writable_dir(&paths.root).await {
        error!(
            path = %paths.root.display(),
            error = %e,
            "Data directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }
    if let Some(parent) = paths.database.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_writable_dir(parent).await?;
    }

    let cache = Cache::open(&paths.database).await?;

    let res = run(args.command, &mut config, &paths, &cache).await;
    if let Err(e) = &res {
        error!(error = %e, "Command failed");
    }

    let elapsed = start_time.elapsed();
    info!(?elapsed, "Execution complete");
    res
}

async fn run(
    command: Command,
    config: &mut ReaderConfig,
    paths: &DataPaths,
    cache: &Cache,
) -> Result<(), Box<dyn Error>> {
    match command {
        Command::Sync { pages, no_images } => {
            if let Some(pages) = pages {
                config.pages_per_sync = pages;
            }
            let fetcher = client_from_config(config)?;
            let images_root = paths.images_root();
            let images_root = (!no_images).then_some(images_root.as_path());
            let report = sync::sync_articles(&fetcher, cache, config, images_root).await?;
            println!(
                "{} articles ({} new), {} images, {} purged",
                report.fetched, report.new_articles, report.images_downloaded, report.purged
            );
        }

        Command::List { unread } => {
            let articles = cache.load_articles_by_date().await?;
            for a in articles.iter().filter(|a| !unread || !a.is_read) {
                println!(
                    "{:>7}  {}  {}  {} ({} comms)",
                    a.id,
                    format_timestamp(a.published_at, "%d/%m %H:%M"),
                    if a.is_read { " " } else { "*" },
                    a.title,
                    a.comment_count
                );
            }
        }

        Command::Show {
            id,
            output_dir,
            no_mark_read,
        } => {
            let article = cache
                .load_article(id)
                .await?
                .ok_or(NewsError::UnknownArticle(id))?;
            let comments = cache.load_comments(id).await?;
            match output_dir {
                Some(dir) => {
                    let path = html::write_article_page(&article, &comments, &dir).await?;
                    println!("{}", path.display());
                }
                None => print!("{}", html::render_article_page(&article, &comments)),
            }
            if !no_mark_read {
                cache.mark_article_read(id).await?;
            }
        }

        Command::Comments {
            id,
            refresh,
            output_dir,
        } => {
            let article = cache
                .load_article(id)
                .await?
                .ok_or(NewsError::UnknownArticle(id))?;
            let stale = article.needs_comment_refresh(cache.max_downloaded_comment_id(id).await?);
            if refresh || stale {
                let fetcher = client_from_config(config)?;
                let images_root = paths.images_root();
                let added =
                    sync::sync_comments(&fetcher, cache, config, Some(images_root.as_path()), id)
                        .await?;
                info!(id, added, "Comments refreshed");
            }
            print_or_write_comments(cache, id, output_dir.as_deref()).await?;
        }

        Command::MarkRead { id } => {
            if !cache.mark_article_read(id).await? {
                return Err(NewsError::UnknownArticle(id).into());
            }
        }

        Command::ReadPosition { id, index } => {
            if !cache.set_last_read_comment_index(id, index).await? {
                return Err(NewsError::UnknownArticle(id).into());
            }
        }

        Command::Export { json_output_dir } => {
            ensure_writable_dir(&json_output_dir).await?;
            let articles = cache.load_articles_by_date().await?;
            let path = json::write_article_index(&articles, &json_output_dir).await?;
            println!("{}", path.display());
        }

        Command::Purge { comments_only, all } => {
            if all {
                cache.clear().await?;
            } else if comments_only {
                cache.clear_comments().await?;
            } else {
                let cutoff =
                    now_timestamp() - i64::from(config.retention_days) * sync::SECONDS_PER_DAY;
                let removed = cache.purge_older_than(cutoff).await?;
                println!("{removed} articles purged");
            }
        }
    }
    Ok(())
}

async fn print_or_write_comments(
    cache: &Cache,
    id: i64,
    output_dir: Option<&Path>,
) -> Result<(), Box<dyn Error>> {
    let article = cache
        .load_article(id)
        .await?
        .ok_or(NewsError::UnknownArticle(id))?;
    let comments = cache.load_comments(id).await?;

    if let Some(dir) = output_dir {
        let path = html::write_article_page(&article, &comments, dir).await?;
        println!("{}", path.display());
        return Ok(());
    }

    println!("{} ({} comms)", article.title, article.comment_count);
    for c in &comments {
        let marker = if c.display_number == article.last_read_comment_index {
            ">"
        } else {
            " "
        };
        println!("\n{marker}#{} {}", c.display_number, c.author_and_date());
        println!("{}", html::plain_text(&c.content));
    }
    Ok(())
}
