//! Article HTML normalisation.
//!
//! The API returns WordPress-rendered HTML meant for a browser. Before it is
//! cached we rewrite it so it renders offline:
//!
//! - embedded players (`<iframe>`, `<video>`) become a link to the video
//!   wrapped around a bundled placeholder image
//! - relative `href`/`src` become absolute
//! - "fancy" thumbnail links and slideshows are flattened to full-size images
//! - presentation attributes and `<script>` elements are dropped
//!
//! The rewrite happens while serializing the parsed tree back to a string,
//! so the DOM itself is never mutated.

use crate::utils::{last_segment, strip_scheme};
use once_cell::sync::Lazy;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use std::borrow::Cow;
use tracing::{debug, warn};
use url::Url;

static ARTICLE: Lazy<Selector> = Lazy::new(|| Selector::parse("article").expect("valid selector"));
static IMG: Lazy<Selector> = Lazy::new(|| Selector::parse("img").expect("valid selector"));
static SLIDESHOW_IMG: Lazy<Selector> =
    Lazy::new(|| Selector::parse("li > a > img").expect("valid selector"));

/// Attributes removed from every element.
const STRIPPED_ATTRIBUTES: &[&str] = &["target", "rel", "class", "style", "data-imageid", "alt"];

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Elements removed with their content.
const DROPPED_ELEMENTS: &[&str] = &["script"];

const RAW_TEXT_ELEMENTS: &[&str] = &["style"];

/// Placeholder images bundled with the reader, shown in place of embedded players.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    YoutubePlaylist,
    Youtube,
    Dailymotion,
    Vimeo,
    VideosGouvFr,
    Vidme,
    Soundcloud,
    Scribd,
    CanalPlus,
    Arte,
    Unsupported,
}

impl Placeholder {
    pub fn file_name(self) -> &'static str {
        match self {
            Placeholder::YoutubePlaylist => "iframe_liste_youtube.png",
            Placeholder::Youtube => "iframe_youtube.png",
            Placeholder::Dailymotion => "iframe_dailymotion.png",
            Placeholder::Vimeo => "iframe_vimeo.png",
            Placeholder::VideosGouvFr => "iframe_videos_gouv_fr.png",
            Placeholder::Vidme => "iframe_vidme.png",
            Placeholder::Soundcloud => "iframe_soundcloud.png",
            Placeholder::Scribd => "iframe_scribd.png",
            Placeholder::CanalPlus => "iframe_canalplus.png",
            Placeholder::Arte => "iframe_arte.png",
            Placeholder::Unsupported => "iframe_non_supportee.png",
        }
    }
}

/// Work out where an embedded player should link to.
///
/// `src` is the raw iframe `src`. It is lowercased before anything else, so
/// video ids and player URLs in the returned link are lowercase too. Returns
/// the link target and placeholder, or `None` when the player is not one we
/// know.
///
/// # Examples
///
/// ```ignore
/// let (href, _) = classify_player("https://www.youtube.com/embed/dQw4w9WgXcQ?rel=0").unwrap();
/// assert_eq!(href, "http://www.youtube.com/watch?v=dqw4w9wgxcq");
/// ```
pub fn classify_player(src: &str) -> Option<(String, Placeholder)> {
    let lower = src.trim().to_lowercase();
    let player = strip_scheme(&lower);
    let video_id = last_segment(player);

    let found = if player.starts_with("www.youtube.com/embed/videoseries") {
        let list = match player.rfind("list=") {
            Some(i) => cut_query(&player[i + "list=".len()..]),
            None => video_id,
        };
        (
            format!("http://www.youtube.com/playlist?list={list}"),
            Placeholder::YoutubePlaylist,
        )
    } else if player.starts_with("www.youtube.com/embed/")
        || player.starts_with("www.youtube-nocookie.com/embed/")
    {
        (
            format!("http://www.youtube.com/watch?v={video_id}"),
            Placeholder::Youtube,
        )
    } else if player.starts_with("www.dailymotion.com/embed/video/") {
        (
            format!("http://www.dailymotion.com/video/{video_id}"),
            Placeholder::Dailymotion,
        )
    } else if player.starts_with("player.vimeo.com/video/") {
        (format!("http://www.vimeo.com/{video_id}"), Placeholder::Vimeo)
    } else if player.starts_with("static.videos.gouv.fr/player/video/") {
        (
            format!("http://static.videos.gouv.fr/player/video/{video_id}"),
            Placeholder::VideosGouvFr,
        )
    } else if player.starts_with("vid.me") {
        (format!("https://vid.me/{video_id}"), Placeholder::Vidme)
    } else if player.starts_with("w.soundcloud.com/player/") {
        (format!("https://{player}"), Placeholder::Soundcloud)
    } else if player.starts_with("www.scribd.com/embeds/") {
        (format!("https://{player}"), Placeholder::Scribd)
    } else if player.starts_with("player.canalplus.fr/embed/") {
        (format!("https://{player}"), Placeholder::CanalPlus)
    } else if player.starts_with("www.arte.tv/") {
        (format!("https://{player}"), Placeholder::Arte)
    } else {
        return None;
    };
    Some(found)
}

/// Normalise an article body.
///
/// # Arguments
///
/// * `html` - Rendered page. It must contain an `<article>` element; only the
///   first one is kept.
/// * `base` - URL relative links and images are resolved against, usually
///   the article's own link.
/// * `asset_prefix` - Prefix of the bundled placeholder images.
///
/// # Returns
///
/// The serialized `<article>` element, or an empty string when there is none.
///
/// # Examples
///
/// ```ignore
/// let base = Url::parse("https://next.ink/123456/un-article/")?;
/// let html = normalize_article_html(
///     r#"<article><img src="/a.png" class="x"></article>"#,
///     Some(&base),
///     "local-asset://",
/// );
/// assert_eq!(html, r#"<article><img src="https://next.ink/a.png"></article>"#);
/// ```
pub fn normalize_article_html(html: &str, base: Option<&Url>, asset_prefix: &str) -> String {
    let document = Html::parse_document(html);
    let Some(article) = document.select(&ARTICLE).next() else {
        debug!("No <article> element to normalise");
        return String::new();
    };

    let mut rewriter = Rewriter {
        base,
        asset_prefix,
        out: String::with_capacity(html.len()),
    };
    rewriter.element(article);
    rewriter.out
}

struct Rewriter<'a> {
    base: Option<&'a Url>,
    asset_prefix: &'a str,
    out: String,
}

impl Rewriter<'_> {
    fn element(&mut self, el: ElementRef<'_>) {
        let name = el.value().name();
        match name {
            "iframe" => {
                self.iframe(el);
                return;
            }
            "video" => {
                let href = self.absolute(el.value().attr("src").unwrap_or_default());
                self.player_link(&href, Placeholder::Unsupported);
                return;
            }
            "a" if is_fancy_image_link(el) => {
                let full_size = self.absolute(el.value().attr("href").unwrap_or_default());
                for img in el.select(&IMG) {
                    self.start_tag(img, Some(full_size.as_str()));
                }
                return;
            }
            "ul" if is_slideshow(el) => {
                for img in el.select(&IMG) {
                    let large = img
                        .value()
                        .attr("data-large-src")
                        .or_else(|| img.value().attr("src"))
                        .unwrap_or_default();
                    let large = self.absolute(large);
                    self.out.push_str("<p>");
                    self.start_tag(img, Some(large.as_str()));
                    self.out.push_str("</p>");
                }
                return;
            }
            _ if DROPPED_ELEMENTS.contains(&name) => return,
            _ => {}
        }

        self.start_tag(el, None);
        if VOID_ELEMENTS.contains(&name) {
            return;
        }
        let raw_text = RAW_TEXT_ELEMENTS.contains(&name);
        for child in el.children() {
            match child.value() {
                Node::Text(text) => {
                    if raw_text {
                        self.out.push_str(text);
                    } else {
                        self.out.push_str(&html_escape::encode_text(&**text));
                    }
                }
                Node::Element(_) => {
                    if let Some(child_ref) = ElementRef::wrap(child) {
                        self.element(child_ref);
                    }
                }
                _ => {}
            }
        }
        self.out.push_str("</");
        self.out.push_str(name);
        self.out.push('>');
    }

    fn iframe(&mut self, el: ElementRef<'_>) {
        let src = el.value().attr("src").unwrap_or_default();
        match classify_player(src) {
            Some((href, placeholder)) => {
                debug!(%src, %href, "Replacing embedded player");
                self.player_link(&href, placeholder);
            }
            None => {
                let href = self.absolute(src);
                warn!(%src, "Unsupported embedded player");
                self.player_link(&href, Placeholder::Unsupported);
            }
        }
    }

    fn player_link(&mut self, href: &str, placeholder: Placeholder) {
        self.out.push_str("<a href=\"");
        self.out.push_str(&html_escape::encode_double_quoted_attribute(href));
        self.out.push_str("\"><img src=\"");
        self.out.push_str(self.asset_prefix);
        self.out.push_str(placeholder.file_name());
        self.out.push_str("\"></a>");
    }

    /// Write `<name attr="…">`, rewriting URLs and dropping presentation
    /// attributes. `src_override` replaces the element's `src`.
    fn start_tag(&mut self, el: ElementRef<'_>, src_override: Option<&str>) {
        let name = el.value().name();
        self.out.push('<');
        self.out.push_str(name);

        let mut wrote_src = false;
        for (key, value) in el.value().attrs() {
            if STRIPPED_ATTRIBUTES.contains(&key) {
                continue;
            }
            let value: Cow<'_, str> = match (name, key) {
                (_, "src") if src_override.is_some() => {
                    wrote_src = true;
                    Cow::Owned(src_override.unwrap_or_default().to_string())
                }
                ("a", "href") if !value.starts_with("mailto:") => Cow::Owned(self.absolute(value)),
                ("img", "src") if !value.starts_with(self.asset_prefix) => {
                    Cow::Owned(self.absolute(value))
                }
                _ => Cow::Borrowed(value),
            };
            self.push_attribute(key, &value);
        }
        if let (Some(src), false) = (src_override, wrote_src) {
            self.push_attribute("src", src);
        }
        self.out.push('>');
    }

    fn push_attribute(&mut self, key: &str, value: &str) {
        self.out.push(' ');
        self.out.push_str(key);
        self.out.push_str("=\"");
        self.out.push_str(&html_escape::encode_double_quoted_attribute(value));
        self.out.push('"');
    }

    /// Resolve `url` against the base; left untouched when that is impossible.
    fn absolute(&self, url: &str) -> String {
        let url = url.trim();
        if url.is_empty() {
            return String::new();
        }
        if let Ok(parsed) = Url::parse(url) {
            return parsed.to_string();
        }
        match self.base.map(|b| b.join(url)) {
            Some(Ok(joined)) => joined.to_string(),
            _ => url.to_string(),
        }
    }
}

/// Text before the first `?` or `#`.
fn cut_query(s: &str) -> &str {
    s.split(['?', '#']).next().unwrap_or(s)
}

fn is_fancy_image_link(el: ElementRef<'_>) -> bool {
    el.value().attr("class") == Some("fancyimg") && el.select(&IMG).next().is_some()
}

fn is_slideshow(el: ElementRef<'_>) -> bool {
    el.value().attr("class") == Some("slideshow-container")
        && el.select(&SLIDESHOW_IMG).next().is_some()
}
