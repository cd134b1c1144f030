//! Command-line interface definitions for the reader.
//!
//! Global options can also come from the environment (`NXI_CONFIG`,
//! `NXI_DATA_DIR`).
//!
//! # Examples
//!
//! ```sh
//! nxi_reader sync --pages 3
//! nxi_reader list --unread
//! nxi_reader show 151234 --output-dir ./pages
//! nxi_reader comments 151234 --refresh
//! nxi_reader purge --comments-only
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML config file
    #[arg(short, long, global = true, env = "NXI_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding the cache database and downloaded images
    #[arg(short, long, global = true, env = "NXI_DATA_DIR", default_value = "nxi_data")]
    pub data_dir: PathBuf,

    /// Database file (defaults to `<data-dir>/nxidb.sqlite`)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Fetch the latest articles into the cache
    Sync {
        /// Listing pages to fetch per endpoint (overrides the config)
        #[arg(short, long)]
        pages: Option<u32>,

        /// Do not download miniatures and illustrations
        #[arg(long)]
        no_images: bool,
    },

    /// List cached articles, newest first
    List {
        /// Only show articles not read yet
        #[arg(short, long)]
        unread: bool,
    },

    /// Render an article as a standalone HTML page
    Show {
        id: i64,

        /// Write `<id>.html` here instead of printing the page
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Leave the article unread
        #[arg(long)]
        no_mark_read: bool,
    },

    /// Show the comments of an article
    Comments {
        id: i64,

        /// Download new comments first
        #[arg(short, long)]
        refresh: bool,

        /// Write `<id>.html` (article and comments) here instead of printing
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Mark an article as read
    MarkRead { id: i64 },

    /// Remember the last comment read in an article
    ReadPosition { id: i64, index: i64 },

    /// Write a JSON index of the cached articles
    Export {
        /// Output directory for `articles.json`
        #[arg(short, long)]
        json_output_dir: PathBuf,
    },

    /// Remove old articles (or more) from the cache
    Purge {
        /// Delete every comment and reset read positions
        #[arg(long, conflicts_with = "all")]
        comments_only: bool,

        /// Empty the whole cache
        #[arg(long)]
        all: bool,
    },
}
