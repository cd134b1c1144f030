//! Runtime configuration.
//!
//! Settings come from an optional YAML file. Every key has a default, so a
//! missing file (or a file that only overrides a couple of keys) is fine.
//!
//! ```yaml
//! api_base_url: https://next.ink/wp-json/wp/v2
//! articles_per_page: 30
//! retention_days: 15
//! ```

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// File name of the SQLite cache inside the data directory.
pub const DEFAULT_DB_FILE: &str = "nxidb.sqlite";

/// Reader settings, deserialized from YAML.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Root of the WordPress REST API (`.../wp-json/wp/v2`).
    pub api_base_url: String,
    /// Post-type endpoints polled for the article list.
    pub article_endpoints: Vec<String>,
    pub articles_per_page: u32,
    pub pages_per_sync: u32,
    pub comments_per_page: u32,
    /// Prefix prepended to smiley file names in comments.
    pub smiley_cdn_url: String,
    /// Prefix marking bundled placeholder images (never made absolute, never downloaded).
    pub local_asset_prefix: String,
    /// Articles published more than this many days ago are purged after a sync.
    pub retention_days: u32,
    pub max_retries: usize,
    pub retry_base_delay_ms: u64,
    pub download_concurrency: usize,
    pub user_agent: String,
    pub request_timeout_secs: u64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://next.ink/wp-json/wp/v2".to_string(),
            article_endpoints: vec!["posts".to_string(), "lebrief".to_string()],
            articles_per_page: 20,
            pages_per_sync: 1,
            comments_per_page: 100,
            smiley_cdn_url: "https://cdn2.nextinpact.com/smileys/".to_string(),
            local_asset_prefix: "local-asset://".to_string(),
            retention_days: 10,
            max_retries: 3,
            retry_base_delay_ms: 500,
            download_concurrency: 6,
            user_agent: format!("nxi_reader/{}", env!("CARGO_PKG_VERSION")),
            request_timeout_secs: 30,
        }
    }
}

impl ReaderConfig {
    /// Parse a YAML document; missing keys keep their defaults.
    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    /// Load the config file if one was given, else fall back to the defaults.
    #[instrument(level = "info")]
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => {
                let text = tokio::fs::read_to_string(p).await?;
                let config = Self::from_yaml(&text)?;
                info!(path = %p.display(), "Loaded configuration");
                debug!(?config, "Effective configuration");
                Ok(config)
            }
            None => {
                debug!("No configuration file; using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Where the cache and downloaded images live.
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub root: PathBuf,
    pub database: PathBuf,
}

impl DataPaths {
    pub fn new(root: impl Into<PathBuf>, database: Option<PathBuf>) -> Self {
        let root = root.into();
        let database = database.unwrap_or_else(|| root.join(DEFAULT_DB_FILE));
        Self { root, database }
    }

    pub fn images_root(&self) -> PathBuf {
        self.root.join("images")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = ReaderConfig::default();
        assert_eq!(c.api_base_url, "https://next.ink/wp-json/wp/v2");
        assert_eq!(c.article_endpoints, vec!["posts", "lebrief"]);
        assert_eq!(c.comments_per_page, 100);
        assert!(c.user_agent.starts_with("nxi_reader/"));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let c = ReaderConfig::from_yaml("articles_per_page: 50\nretention_days: 3\n").unwrap();
        assert_eq!(c.articles_per_page, 50);
        assert_eq!(c.retention_days, 3);
        assert_eq!(c.smiley_cdn_url, ReaderConfig::default().smiley_cdn_url);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(ReaderConfig::from_yaml("  \n").unwrap(), ReaderConfig::default());
    }

    #[test]
    fn test_invalid_yaml_is_error() {
        assert!(ReaderConfig::from_yaml("articles_per_page: [oops").is_err());
    }

    #[test]
    fn test_data_paths() {
        let p = DataPaths::new("/tmp/nxi", None);
        assert_eq!(p.database, PathBuf::from("/tmp/nxi/nxidb.sqlite"));
        assert_eq!(p.images_root(), PathBuf::from("/tmp/nxi/images"));

        let p = DataPaths::new("/tmp/nxi", Some(PathBuf::from("/var/db.sqlite")));
        assert_eq!(p.database, PathBuf::from("/var/db.sqlite"));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "download_concurrency: 2\n").unwrap();
        let c = ReaderConfig::load(Some(&path)).await.unwrap();
        assert_eq!(c.download_concurrency, 2);
    }
}
