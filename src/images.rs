//! Image download glue: miniatures, in-article illustrations and smileys
//! are stored under `images/<kind>/<file name>`.

use crate::api::FetchAsync;
use crate::error::Result;
use crate::utils::last_segment;
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

static IMG_SRC: Lazy<Selector> =
    Lazy::new(|| Selector::parse("img[src]").expect("valid selector"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageKind {
    /// Article thumbnail shown in the list.
    Miniature,
    /// Image embedded in an article body.
    Illustration,
    Smiley,
}

impl ImageKind {
    pub fn folder(self) -> &'static str {
        match self {
            ImageKind::Miniature => "miniatures",
            ImageKind::Illustration => "illustrations",
            ImageKind::Smiley => "smileys",
        }
    }

    pub fn dir(self, images_root: &Path) -> PathBuf {
        images_root.join(self.folder())
    }
}

/// Local file name for an image URL.
pub fn image_file_name(url: &str) -> &str {
    last_segment(url)
}

/// Where `url` lands on disk, or `None` if it has no usable file name.
pub fn image_path(url: &str, kind: ImageKind, images_root: &Path) -> Option<PathBuf> {
    let name = image_file_name(url);
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(kind.dir(images_root).join(name))
}

/// Remote `img` sources of an article body; bundled placeholders are skipped.
pub fn illustration_urls_in(html: &str) -> Vec<String> {
    let doc = Html::parse_fragment(html);
    doc.select(&IMG_SRC)
        .filter_map(|img| img.value().attr("src"))
        .filter(|src| src.starts_with("http://") || src.starts_with("https://"))
        .map(str::to_string)
        .unique()
        .collect()
}

/// Fetch one image and write it, overwriting any previous copy.
#[instrument(level = "debug", skip(fetcher, images_root))]
pub async fn download_image<F: FetchAsync>(
    fetcher: &F,
    url: &str,
    kind: ImageKind,
    images_root: &Path,
) -> Result<PathBuf> {
    let path = image_path(url, kind, images_root).ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("no file name in {url}"),
        )
    })?;
    let page = fetcher.fetch(url).await?;
    fs::create_dir_all(kind.dir(images_root)).await?;
    fs::write(&path, &page.body).await?;
    debug!(path = %path.display(), bytes = page.body.len(), "Image saved");
    Ok(path)
}

/// Download every image of `urls` that is not on disk yet, `concurrency` at
/// a time. Failures are logged and skipped. Returns the number of files
/// written.
#[instrument(level = "info", skip_all, fields(kind = ?kind))]
pub async fn download_missing<F, I>(
    fetcher: &F,
    urls: I,
    kind: ImageKind,
    images_root: &Path,
    concurrency: usize,
) -> usize
where
    F: FetchAsync,
    I: IntoIterator<Item = String>,
{
    let mut todo = Vec::new();
    for url in urls.into_iter().unique() {
        match image_path(&url, kind, images_root) {
            Some(path) if fs::try_exists(&path).await.unwrap_or(false) => {}
            Some(_) => todo.push(url),
            None => warn!(%url, "Skipping image without file name"),
        }
    }
    if todo.is_empty() {
        return 0;
    }

    let wanted = todo.len();
    let written = stream::iter(todo)
        .map(|url| async move {
            match download_image(fetcher, &url, kind, images_root).await {
                Ok(_) => true,
                Err(e) => {
                    warn!(%url, error = %e, "Image download failed");
                    false
                }
            }
        })
        .buffer_unordered(concurrency.max(1))
        .filter(|ok| futures::future::ready(*ok))
        .count()
        .await;

    info!(wanted, written, "Images downloaded");
    written
}
