//! Synchronisation with the website: pull the article listings and comment
//! threads into the cache, then fetch the images they reference.
//!
//! Fetching goes through [`FetchAsync`], parsing through [`crate::parser`]
//! and persistence through [`Cache`]; this module only decides what to ask
//! for and what to keep.

use crate::api::{FetchAsync, articles_url, comments_url};
use crate::cache::Cache;
use crate::config::ReaderConfig;
use crate::error::{NewsError, Result};
use crate::images::{ImageKind, download_missing, illustration_urls_in};
use crate::models::Article;
use crate::parser::smileys::smiley_urls_in;
use crate::parser::{parse_articles, parse_comments};
use crate::utils::now_timestamp;
use itertools::Itertools;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Refresh-date key of the article list itself.
pub const LIST_REFRESH_ID: i64 = 0;

pub const SECONDS_PER_DAY: i64 = 86_400;

/// Outcome of [`sync_articles`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Distinct articles received from the API.
    pub fetched: usize,
    /// Articles that were not in the cache before.
    pub new_articles: usize,
    pub images_downloaded: usize,
    /// Articles dropped for being older than the retention window.
    pub purged: u64,
}

/// Fetch every page of every configured listing. A failing page ends its
/// listing; the sync only fails if nothing at all could be fetched.
async fn fetch_listings<F: FetchAsync>(fetcher: &F, config: &ReaderConfig) -> Result<Vec<Article>> {
    let mut articles = Vec::new();
    let mut last_error = None;

    for endpoint in &config.article_endpoints {
        for page in 1..=config.pages_per_sync.max(1) {
            let url = articles_url(config, endpoint, page);
            let body = match fetcher.fetch(&url).await {
                Ok(page) => page.body,
                Err(e) => {
                    warn!(%url, error = %e, "Listing page failed");
                    last_error = Some(e);
                    break;
                }
            };
            let parsed = match parse_articles(&String::from_utf8_lossy(&body), config) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(%url, error = %e, "Listing page unreadable");
                    last_error = Some(e);
                    break;
                }
            };
            let count = parsed.len();
            debug!(endpoint, page, count, "Listing page parsed");
            articles.extend(parsed);
            if count < config.articles_per_page as usize {
                break;
            }
        }
    }

    match last_error {
        Some(e) if articles.is_empty() => Err(e),
        _ => Ok(articles),
    }
}

/// Refresh the article list.
///
/// Local state (read flag, position in the comments, known comment count)
/// survives the refresh. Articles past `retention_days` are purged at the
/// end.
///
/// # Arguments
///
/// * `fetcher` - Source of listing pages and images
/// * `cache` - Where articles are stored
/// * `config` - Endpoints, page size and page count, retention window
/// * `images_root` - Where miniatures and illustrations go; `None` skips
///   image downloads
///
/// # Returns
///
/// A [`SyncReport`] with what was fetched, added, downloaded and purged.
/// Fails only when no listing page at all could be read.
///
/// # Examples
///
/// ```ignore
/// let fetcher = client_from_config(&config)?;
/// let cache = Cache::open(&paths.database).await?;
/// let report = sync_articles(&fetcher, &cache, &config, Some(&paths.images_root())).await?;
/// println!("{} new", report.new_articles);
/// ```
#[instrument(level = "info", skip_all)]
pub async fn sync_articles<F: FetchAsync>(
    fetcher: &F,
    cache: &Cache,
    config: &ReaderConfig,
    images_root: Option<&Path>,
) -> Result<SyncReport> {
    let t0 = Instant::now();
    let articles: Vec<Article> = fetch_listings(fetcher, config)
        .await?
        .into_iter()
        .unique_by(|a| a.id)
        .collect();

    let mut report = SyncReport {
        fetched: articles.len(),
        ..SyncReport::default()
    };
    let mut miniatures = Vec::new();
    let mut illustrations = Vec::new();

    for mut article in articles {
        match cache.load_article(article.id).await? {
            Some(previous) => {
                article.is_read = previous.is_read;
                article.last_read_comment_index = previous.last_read_comment_index;
                if previous.comment_count != 0 {
                    article.comment_count = previous.comment_count;
                }
            }
            None => report.new_articles += 1,
        }
        cache.save_article(&article).await?;

        if images_root.is_some() {
            miniatures.extend(article.illustration_url.clone());
            illustrations.extend(illustration_urls_in(&article.content));
        }
    }

    if let Some(root) = images_root {
        let concurrency = config.download_concurrency;
        report.images_downloaded +=
            download_missing(fetcher, miniatures, ImageKind::Miniature, root, concurrency).await;
        report.images_downloaded +=
            download_missing(fetcher, illustrations, ImageKind::Illustration, root, concurrency)
                .await;
    }

    let now = now_timestamp();
    cache.save_refresh_date(LIST_REFRESH_ID, now).await?;
    let cutoff = now - i64::from(config.retention_days) * SECONDS_PER_DAY;
    report.purged = cache.purge_older_than(cutoff).await?;

    info!(
        fetched = report.fetched,
        new = report.new_articles,
        images = report.images_downloaded,
        purged = report.purged,
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "Articles synchronised"
    );
    Ok(report)
}

/// Page of the comments endpoint to resume from, given how many comments
/// are already stored. Full pages already downloaded are skipped; the last
/// partial one is fetched again.
pub fn first_comment_page(stored: i64, per_page: u32) -> u32 {
    let per_page = i64::from(per_page.max(1));
    u32::try_from(stored.max(0) / per_page + 1).unwrap_or(u32::MAX)
}

/// Pull the new comments of an article. Returns how many were added.
///
/// Paging stops on a short page, once `X-WP-Total` comments have been
/// covered, or when a page after the first fails.
#[instrument(level = "info", skip(fetcher, cache, config, images_root))]
pub async fn sync_comments<F: FetchAsync>(
    fetcher: &F,
    cache: &Cache,
    config: &ReaderConfig,
    images_root: Option<&Path>,
    article_id: i64,
) -> Result<usize> {
    if cache.load_article(article_id).await?.is_none() {
        return Err(NewsError::UnknownArticle(article_id));
    }

    let per_page = config.comments_per_page.max(1);
    let mut page = first_comment_page(cache.count_comments(article_id).await?, per_page);
    let mut added = 0usize;
    let mut total = None;
    let mut smileys = Vec::new();

    loop {
        let url = comments_url(config, article_id, page);
        let parsed = match fetcher.fetch(&url).await.and_then(|fetched| {
            parse_comments(
                &String::from_utf8_lossy(&fetched.body),
                fetched.total.as_deref(),
                article_id,
                config,
            )
        }) {
            Ok(parsed) => parsed,
            // Past the last page WordPress answers with an error status.
            Err(e) if page > 1 => {
                warn!(%url, error = %e, "Comment page failed; treating as end of thread");
                break;
            }
            Err(e) => return Err(e),
        };
        total = parsed.total.or(total);
        let count = parsed.comments.len();

        for comment in &parsed.comments {
            if cache.save_comment_if_new(comment).await? {
                added += 1;
                smileys.extend(smiley_urls_in(&comment.content, &config.smiley_cdn_url));
            }
        }
        debug!(page, count, "Comment page stored");

        let seen = i64::from(page - 1) * i64::from(per_page) + count as i64;
        if count < per_page as usize || total.is_some_and(|t| seen >= t) {
            break;
        }
        page += 1;
    }

    let count = match total {
        Some(total) => total,
        None => cache.count_comments(article_id).await?,
    };
    cache.update_comment_count(article_id, count).await?;
    cache.save_refresh_date(article_id, now_timestamp()).await?;

    if let Some(root) = images_root {
        download_missing(
            fetcher,
            smileys,
            ImageKind::Smiley,
            root,
            config.download_concurrency,
        )
        .await;
    }

    info!(added, total = count, "Comments synchronised");
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::FakeFetcher;
    use crate::utils::format_timestamp;

    fn config() -> ReaderConfig {
        ReaderConfig {
            api_base_url: "https://api.test/wp/v2".to_string(),
            article_endpoints: vec!["posts".to_string(), "lebrief".to_string()],
            articles_per_page: 2,
            pages_per_sync: 2,
            comments_per_page: 2,
            smiley_cdn_url: "https://cdn.test/smileys/".to_string(),
            ..ReaderConfig::default()
        }
    }

    fn wp_date(ts: i64) -> String {
        format_timestamp(ts, "%Y-%m-%dT%H:%M:%S")
    }

    fn post(id: i64, ts: i64, kind: &str, media: Option<&str>) -> String {
        let media = media
            .map(|m| format!(r#","_embedded": {{"wp:featuredmedia": [{{"source_url": "{m}"}}]}}"#))
            .unwrap_or_default();
        format!(
            r#"{{"id": {id}, "date": "{}", "type": "{kind}", "link": "https://next.ink/{id}/",
                "title": {{"rendered": "Titre {id}"}},
                "content": {{"rendered": "<p><img src=\"https://next.ink/img/{id}.png\"></p>"}}{media}}}"#,
            wp_date(ts)
        )
    }

    fn comment(id: i64, text: &str) -> String {
        format!(
            r#"{{"id": {id}, "author_name": "A{id}", "date": "2023-11-10T14:30:00", "parent": 0,
                "content": {{"rendered": "<p>{text}</p>"}}}}"#
        )
    }

    #[test]
    fn test_first_comment_page() {
        assert_eq!(first_comment_page(0, 100), 1);
        assert_eq!(first_comment_page(99, 100), 1);
        assert_eq!(first_comment_page(100, 100), 2);
        assert_eq!(first_comment_page(250, 100), 3);
        assert_eq!(first_comment_page(5, 0), 6);
    }

    #[tokio::test]
    async fn test_sync_articles_pages_and_dedups() {
        let config = config();
        let now = now_timestamp();
        let fake = FakeFetcher::new()
            .with(
                &articles_url(&config, "posts", 1),
                format!("[{},{}]", post(1, now - 60, "post", None), post(2, now - 120, "post", None)),
            )
            .with(
                &articles_url(&config, "posts", 2),
                format!("[{}]", post(3, now - 180, "post", None)),
            )
            .with(
                &articles_url(&config, "lebrief", 1),
                format!("[{}]", post(2, now - 120, "post", None)),
            );
        let cache = Cache::open_in_memory().await.unwrap();

        let report = sync_articles(&fake, &cache, &config, None).await.unwrap();

        assert_eq!(report.fetched, 3);
        assert_eq!(report.new_articles, 3);
        assert_eq!(report.purged, 0);
        let ids: Vec<i64> = cache
            .load_articles_by_date()
            .await
            .unwrap()
            .iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(cache.load_refresh_date(LIST_REFRESH_ID).await.unwrap() >= now);
        assert!(!fake.calls().contains(&articles_url(&config, "lebrief", 2)));
    }

    #[tokio::test]
    async fn test_sync_articles_keeps_local_state_and_purges() {
        let config = config();
        let now = now_timestamp();
        let cache = Cache::open_in_memory().await.unwrap();
        cache
            .save_article(&Article {
                id: 1,
                title: "Ancien".to_string(),
                published_at: now - 60,
                is_read: true,
                last_read_comment_index: 7,
                comment_count: 12,
                ..Article::default()
            })
            .await
            .unwrap();
        cache
            .save_article(&Article {
                id: 99,
                title: "Vieux".to_string(),
                published_at: now - 30 * SECONDS_PER_DAY,
                ..Article::default()
            })
            .await
            .unwrap();

        let fake = FakeFetcher::new().with(
            &articles_url(&config, "posts", 1),
            format!("[{}]", post(1, now - 60, "post", None)),
        );

        let report = sync_articles(&fake, &cache, &config, None).await.unwrap();

        assert_eq!(report.new_articles, 0);
        assert_eq!(report.purged, 1);
        let a = cache.load_article(1).await.unwrap().unwrap();
        assert_eq!(a.title, "Titre 1");
        assert!(a.is_read);
        assert_eq!(a.last_read_comment_index, 7);
        assert_eq!(a.comment_count, 12);
        assert!(cache.load_article(99).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sync_articles_downloads_images() {
        let config = config();
        let now = now_timestamp();
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeFetcher::new()
            .with(
                &articles_url(&config, "posts", 1),
                format!("[{}]", post(5, now - 60, "post", Some("https://next.ink/up/mini5.jpg"))),
            )
            .with("https://next.ink/up/mini5.jpg", "jpg")
            .with("https://next.ink/img/5.png", "png");
        let cache = Cache::open_in_memory().await.unwrap();

        let report = sync_articles(&fake, &cache, &config, Some(dir.path()))
            .await
            .unwrap();

        assert_eq!(report.images_downloaded, 2);
        assert!(dir.path().join("miniatures/mini5.jpg").exists());
        assert!(dir.path().join("illustrations/5.png").exists());
    }

    #[tokio::test]
    async fn test_sync_articles_fails_when_nothing_fetched() {
        let config = config();
        let cache = Cache::open_in_memory().await.unwrap();
        let err = sync_articles(&FakeFetcher::new(), &cache, &config, None)
            .await
            .unwrap_err();
        assert!(matches!(err, NewsError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_sync_comments_unknown_article() {
        let cache = Cache::open_in_memory().await.unwrap();
        let err = sync_comments(&FakeFetcher::new(), &cache, &config(), None, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, NewsError::UnknownArticle(5)));
    }

    #[tokio::test]
    async fn test_sync_comments_pages_until_short_page() {
        let config = config();
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::open_in_memory().await.unwrap();
        cache
            .save_article(&Article {
                id: 7,
                title: "Avec commentaires".to_string(),
                ..Article::default()
            })
            .await
            .unwrap();

        let fake = FakeFetcher::new()
            .with_total(
                &comments_url(&config, 7, 1),
                format!("[{},{}]", comment(1, "un"), comment(2, "deux :D")),
                "3",
            )
            .with_total(&comments_url(&config, 7, 2), format!("[{}]", comment(3, "trois")), "3")
            .with("https://cdn.test/smileys/icon_mrgreen.gif", "gif");

        let added = sync_comments(&fake, &cache, &config, Some(dir.path()), 7)
            .await
            .unwrap();

        assert_eq!(added, 3);
        assert_eq!(cache.load_comments(7).await.unwrap().len(), 3);
        assert_eq!(cache.load_article(7).await.unwrap().unwrap().comment_count, 3);
        assert!(cache.load_refresh_date(7).await.unwrap() > 0);
        assert!(dir.path().join("smileys/icon_mrgreen.gif").exists());

        // Second run resumes at page 2 (two comments fill page 1).
        let added = sync_comments(&fake, &cache, &config, None, 7).await.unwrap();
        assert_eq!(added, 0);
        assert_eq!(fake.calls().last().unwrap(), &comments_url(&config, 7, 2));
    }

    #[tokio::test]
    async fn test_sync_comments_stops_at_total_on_full_page() {
        let config = config();
        let cache = Cache::open_in_memory().await.unwrap();
        cache
            .save_article(&Article {
                id: 8,
                ..Article::default()
            })
            .await
            .unwrap();
        let fake = FakeFetcher::new().with_total(
            &comments_url(&config, 8, 1),
            format!("[{},{}]", comment(11, "un"), comment(12, "deux")),
            "2",
        );

        let added = sync_comments(&fake, &cache, &config, None, 8).await.unwrap();

        assert_eq!(added, 2);
        assert_eq!(fake.calls(), vec![comments_url(&config, 8, 1)]);
        assert_eq!(cache.load_article(8).await.unwrap().unwrap().comment_count, 2);
        assert!(cache.load_refresh_date(8).await.unwrap() > 0);

        // Resuming lands on page 2, which does not exist.
        let added = sync_comments(&fake, &cache, &config, None, 8).await.unwrap();
        assert_eq!(added, 0);
        assert_eq!(fake.calls().last().unwrap(), &comments_url(&config, 8, 2));
        assert_eq!(cache.load_article(8).await.unwrap().unwrap().comment_count, 2);
    }

    #[tokio::test]
    async fn test_sync_comments_later_page_failure_keeps_earlier_pages() {
        let config = config();
        let cache = Cache::open_in_memory().await.unwrap();
        cache
            .save_article(&Article {
                id: 9,
                ..Article::default()
            })
            .await
            .unwrap();
        let fake = FakeFetcher::new().with(
            &comments_url(&config, 9, 1),
            format!("[{},{}]", comment(21, "un"), comment(22, "deux")),
        );

        let added = sync_comments(&fake, &cache, &config, None, 9).await.unwrap();

        assert_eq!(added, 2);
        assert_eq!(fake.calls().len(), 2);
        assert_eq!(cache.load_article(9).await.unwrap().unwrap().comment_count, 2);
        assert!(cache.load_refresh_date(9).await.unwrap() > 0);
    }

    #[tokio::test]
    async fn test_sync_comments_first_page_failure_is_an_error() {
        let config = config();
        let cache = Cache::open_in_memory().await.unwrap();
        cache
            .save_article(&Article {
                id: 10,
                ..Article::default()
            })
            .await
            .unwrap();

        let err = sync_comments(&FakeFetcher::new(), &cache, &config, None, 10)
            .await
            .unwrap_err();

        assert!(matches!(err, NewsError::Status { status: 404, .. }));
        assert_eq!(cache.load_refresh_date(10).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_articles_then_comments_then_articles_again() {
        let config = config();
        let now = now_timestamp();
        let listing = format!("[{}]", post(42, now - 60, "post", None));
        let fake = FakeFetcher::new()
            .with(&articles_url(&config, "posts", 1), listing)
            .with_total(
                &comments_url(&config, 42, 1),
                format!("[{}]", comment(100, "premier")),
                "1",
            );
        let cache = Cache::open_in_memory().await.unwrap();

        let report = sync_articles(&fake, &cache, &config, None).await.unwrap();
        assert_eq!(report.new_articles, 1);

        assert_eq!(sync_comments(&fake, &cache, &config, None, 42).await.unwrap(), 1);
        cache.mark_article_read(42).await.unwrap();
        cache.set_last_read_comment_index(42, 1).await.unwrap();

        let report = sync_articles(&fake, &cache, &config, None).await.unwrap();

        assert_eq!(report.new_articles, 0);
        let a = cache.load_article(42).await.unwrap().unwrap();
        assert!(a.is_read);
        assert_eq!(a.last_read_comment_index, 1);
        assert_eq!(a.comment_count, 1);
        let comments = cache.load_comments(42).await.unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].id, 100);
    }
}
