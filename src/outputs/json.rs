//! JSON index of the cached articles, for scripts and other readers.
//!
//! ```text
//! json_output_dir/
//! └── articles.json
//! ```

use crate::models::Article;
use serde::Serialize;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

pub const INDEX_FILE: &str = "articles.json";

/// One line of the index.
#[derive(Debug, Serialize, PartialEq)]
pub struct ArticleSummary<'a> {
    pub id: i64,
    pub title: &'a str,
    pub subtitle: Option<&'a str>,
    /// RFC 3339, UTC.
    pub published: String,
    pub is_read: bool,
    pub comment_count: i64,
    pub url: &'a str,
}

impl<'a> From<&'a Article> for ArticleSummary<'a> {
    fn from(article: &'a Article) -> Self {
        Self {
            id: article.id,
            title: &article.title,
            subtitle: article.subtitle.as_deref(),
            published: crate::utils::format_timestamp(article.published_at, "%Y-%m-%dT%H:%M:%SZ"),
            is_read: article.is_read,
            comment_count: article.comment_count,
            url: &article.seo_url,
        }
    }
}

/// Write `articles.json` into `json_output_dir`, in the order given.
#[instrument(level = "info", skip_all, fields(json_output_dir = %json_output_dir.display()))]
pub async fn write_article_index(
    articles: &[Article],
    json_output_dir: &Path,
) -> Result<PathBuf, Box<dyn Error>> {
    let summaries: Vec<ArticleSummary<'_>> = articles.iter().map(ArticleSummary::from).collect();
    let json = serde_json::to_string_pretty(&summaries)?;

    if let Err(e) = fs::create_dir_all(json_output_dir).await {
        error!(error = %e, "Failed to create JSON dir");
        return Err(e.into());
    }

    let path = json_output_dir.join(INDEX_FILE);
    fs::write(&path, json).await?;
    info!(path = %path.display(), count = articles.len(), "Wrote article index");
    Ok(path)
}
