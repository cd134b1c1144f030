//! Error type shared by the library-level modules.
//!
//! The binary and the file writers in `outputs` work with `Box<dyn Error>`;
//! everything below it reports one of these variants so callers can match on
//! what went wrong.

use thiserror::Error;

/// Failures raised while talking to the API, parsing payloads or touching the cache.
#[derive(Debug, Error)]
pub enum NewsError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} while fetching {url}")]
    Status { status: u16, url: String },

    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("cache schema version {found} is newer than supported version {supported}")]
    SchemaTooNew { found: i64, supported: i64 },

    #[error("article {0} is not in the cache")]
    UnknownArticle(i64),
}

pub type Result<T> = std::result::Result<T, NewsError>;
