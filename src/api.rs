//! HTTP access to the WordPress API, with exponential backoff retry logic.
//!
//! # Architecture
//!
//! - [`FetchAsync`]: core trait, "give me the bytes behind this URL"
//! - [`HttpFetcher`]: the real implementation on top of `reqwest`
//! - [`RetryFetch`]: decorator that adds retry logic to any [`FetchAsync`]
//!
//! Everything above this module (image downloads, sync) only sees the
//! trait, so tests swap in an in-memory fetcher.
//!
//! # Retry Strategy
//!
//! ```text
//! delay = min(base_delay * 2^(attempt-1), 30s) + random_jitter(0..250ms)
//! ```
//!
//! Only transport errors, `429` and `5xx` answers are retried. Any other
//! status is returned at once.

use crate::config::ReaderConfig;
use crate::error::{NewsError, Result};
use rand::{Rng, rng};
use reqwest::Client;
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};
use url::Url;

/// Header carrying the total number of items of a paginated listing.
pub const TOTAL_HEADER: &str = "X-WP-Total";

/// Raw response of a successful request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FetchedPage {
    pub url: String,
    pub body: Vec<u8>,
    /// Raw value of the [`TOTAL_HEADER`] header, if present.
    pub total: Option<String>,
}

/// Trait for async HTTP retrieval.
pub trait FetchAsync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage>;
}

/// `reqwest`-backed fetcher.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &ReaderConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self { client })
    }
}

impl FetchAsync for HttpFetcher {
    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let t0 = Instant::now();
        let target = Url::parse(url)?;
        let response = self.client.get(target).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NewsError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let total = response
            .headers()
            .get(TOTAL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?.to_vec();
        debug!(
            bytes = body.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Fetched"
        );
        Ok(FetchedPage {
            url: url.to_string(),
            body,
            total,
        })
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`FetchAsync`].
pub struct RetryFetch<T> {
    inner: T,
    /// Retries after the first attempt.
    max_retries: usize,
    /// Initial delay between retries (doubles with each attempt).
    base_delay: StdDuration,
    max_delay: StdDuration,
}

impl<T> RetryFetch<T>
where
    T: FetchAsync,
{
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }

    /// Delay before the retry following failed attempt number `attempt` (1-based), without jitter.
    fn backoff(&self, attempt: usize) -> StdDuration {
        let shift = (attempt.saturating_sub(1)).min(31) as u32;
        self.base_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay)
    }
}

/// Whether a failed request is worth sending again.
fn is_retryable(error: &NewsError) -> bool {
    match error {
        NewsError::Http(_) => true,
        NewsError::Status { status, .. } => *status == 429 || *status >= 500,
        _ => false,
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> FetchAsync for RetryFetch<T>
where
    T: FetchAsync,
{
    #[instrument(level = "info", skip(self))]
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.fetch(url).await {
                Ok(page) => return Ok(page),
                Err(e) => {
                    attempt += 1;
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if !is_retryable(&e) {
                        debug!(attempt, error = %e, "fetch() failed; not retrying");
                        return Err(e);
                    }

                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                            elapsed_ms_total = total_dt.as_millis() as u64,
                            error = %e,
                            "fetch() exhausted retries"
                        );
                        return Err(e);
                    }

                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = self.backoff(attempt) + StdDuration::from_millis(jitter_ms);

                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                        elapsed_ms_total = total_dt.as_millis() as u64,
                        ?delay,
                        error = %e,
                        "fetch() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// Build the retrying HTTP client described by `config`.
pub fn client_from_config(config: &ReaderConfig) -> Result<RetryFetch<HttpFetcher>> {
    Ok(RetryFetch::new(
        HttpFetcher::new(config)?,
        config.max_retries,
        config.retry_base_delay(),
    ))
}

fn api_base(config: &ReaderConfig) -> &str {
    config.api_base_url.trim_end_matches('/')
}

/// One page of an article listing, with embedded media and authors.
pub fn articles_url(config: &ReaderConfig, endpoint: &str, page: u32) -> String {
    format!(
        "{}/{}?_embed&per_page={}&page={}",
        api_base(config),
        endpoint,
        config.articles_per_page,
        page
    )
}

/// One page of the comments of an article, oldest first.
pub fn comments_url(config: &ReaderConfig, article_id: i64, page: u32) -> String {
    format!(
        "{}/comments?post={}&per_page={}&page={}&orderby=id&order=asc",
        api_base(config),
        article_id,
        config.comments_per_page,
        page
    )
}
