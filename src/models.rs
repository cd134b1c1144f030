//! Data models for cached articles and comments.
//!
//! - [`Article`]: an article (or brief) with its normalised HTML body and the
//!   reader's local state (read flag, position in the comment thread)
//! - [`Comment`]: a single comment attached to an article
//! - [`CommentsPage`]: one page of the comments endpoint, with the total
//!   announced by the API

use crate::utils::format_timestamp;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Display format for comment dates.
pub const COMMENT_DATE_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// A news article as stored in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub subtitle: Option<String>,
    /// Publication time, seconds since the Unix epoch.
    pub published_at: i64,
    pub illustration_url: Option<String>,
    /// Normalised HTML body, ready to render.
    pub content: String,
    pub comment_count: i64,
    pub is_subscriber_only: bool,
    pub is_read: bool,
    pub subscriber_content_downloaded: bool,
    /// Position of the last comment the reader reached.
    pub last_read_comment_index: i64,
    /// Canonical URL of the article on the website.
    pub seo_url: String,
    /// Most recent comment id announced by the article payload, `-1` if none.
    pub parser_last_comment_id: i64,
}

impl Default for Article {
    fn default() -> Self {
        Self {
            id: 0,
            title: String::new(),
            subtitle: None,
            published_at: 0,
            illustration_url: None,
            content: String::new(),
            comment_count: 0,
            is_subscriber_only: false,
            is_read: false,
            subscriber_content_downloaded: false,
            last_read_comment_index: 0,
            seo_url: String::new(),
            parser_last_comment_id: -1,
        }
    }
}

impl Article {
    /// Day of publication, e.g. `Friday 10 November 2023`.
    pub fn publication_day(&self) -> String {
        format_timestamp(self.published_at, "%A %d %B %Y")
    }

    /// Hour of publication, e.g. `14:30`.
    pub fn publication_time(&self) -> String {
        format_timestamp(self.published_at, "%H:%M")
    }

    /// True when the API knows of comments newer than what we downloaded.
    pub fn needs_comment_refresh(&self, max_downloaded_comment_id: i64) -> bool {
        self.parser_last_comment_id > max_downloaded_comment_id
    }
}

/// A comment as stored in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Comment {
    pub id: i64,
    pub article_id: i64,
    pub author: String,
    /// Publication time, seconds since the Unix epoch.
    pub published_at: i64,
    /// Normalised HTML body.
    pub content: String,
    /// 1-based rank in the thread; only set when loaded from the cache.
    pub display_number: i64,
}

impl Comment {
    pub fn full_publication_date(&self) -> String {
        format_timestamp(self.published_at, COMMENT_DATE_FORMAT)
    }

    /// Header line shown above a comment.
    pub fn author_and_date(&self) -> String {
        format!("{} {}", self.author, self.full_publication_date())
    }

    /// Identifier unique across articles.
    pub fn key(&self) -> String {
        format!("{}-{}", self.article_id, self.id)
    }
}

impl PartialOrd for Comment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Comment {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id
            .cmp(&other.id)
            .then_with(|| self.article_id.cmp(&other.article_id))
    }
}

/// One page of comments as returned by the API.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommentsPage {
    pub article_id: i64,
    /// Total number of comments on the article (from the `X-WP-Total` header).
    pub total: Option<i64>,
    pub comments: Vec<Comment>,
}
