//! Decoding of the WordPress REST payloads into [`Article`]s and [`Comment`]s.
//!
//! Both list endpoints return a JSON array. Each element is decoded on its
//! own: a malformed element is logged and skipped, the rest of the page is
//! kept.
//!
//! - [`content`]: HTML normalisation of article bodies
//! - [`smileys`]: emoticon substitution in comments

pub mod content;
pub mod smileys;

use crate::config::ReaderConfig;
use crate::error::Result;
use crate::models::{Article, COMMENT_DATE_FORMAT, Comment, CommentsPage};
use crate::utils::{format_timestamp, timestamp_from_wp_date, truncate_for_log};
use content::normalize_article_html;
use html_escape::decode_html_entities;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use smileys::replace_smileys;
use tracing::{debug, instrument, warn};
use url::Url;

/// `type` of a full article.
pub const TYPE_ARTICLE: &str = "post";
/// `type` of a brief (short news item, no subtitle, no named author).
pub const TYPE_BRIEF: &str = "lebrief";
/// Author shown on briefs.
pub const BRIEF_AUTHOR: &str = "l'équipe Next";
/// Custom tag wrapping quoted text in comments.
pub const QUOTE_TAG: &str = "myquote";

#[derive(Debug, Default, Deserialize)]
struct WpRendered {
    #[serde(default)]
    rendered: String,
}

#[derive(Debug, Deserialize)]
struct WpPost {
    id: i64,
    #[serde(default)]
    date: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    title: WpRendered,
    #[serde(default)]
    content: WpRendered,
    /// Custom fields; WordPress sends `[]` instead of `{}` when empty.
    #[serde(default)]
    acf: Value,
    #[serde(rename = "_embedded", default)]
    embedded: WpEmbedded,
}

#[derive(Debug, Default, Deserialize)]
struct WpEmbedded {
    #[serde(rename = "wp:featuredmedia", default)]
    featured_media: Vec<WpMedia>,
    #[serde(default)]
    author: Vec<WpAuthor>,
    #[serde(default)]
    replies: Vec<Vec<WpReply>>,
}

#[derive(Debug, Deserialize)]
struct WpMedia {
    #[serde(default)]
    source_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WpAuthor {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WpReply {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct WpComment {
    id: i64,
    #[serde(default)]
    author_name: String,
    #[serde(default)]
    date: String,
    #[serde(default)]
    content: WpRendered,
    #[serde(default)]
    parent: i64,
    #[serde(rename = "moderationReasonId", default)]
    moderation_reason_id: Option<i64>,
    #[serde(rename = "moderationReason", default)]
    moderation_reason: Option<WpModerationReason>,
}

#[derive(Debug, Deserialize)]
struct WpModerationReason {
    #[serde(default)]
    content: String,
}

fn decode(text: &str) -> String {
    decode_html_entities(text).into_owned()
}

/// Decode every element of a JSON array, skipping (and logging) the bad ones.
fn decode_elements<T: DeserializeOwned>(body: &str, what: &str) -> Result<Vec<T>> {
    let elements: Vec<Value> = serde_json::from_str(body)?;
    let total = elements.len();
    let decoded: Vec<T> = elements
        .into_iter()
        .enumerate()
        .filter_map(|(index, element)| match serde_json::from_value::<T>(element) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!(index, error = %e, what, "Skipping malformed element");
                None
            }
        })
        .collect();
    debug!(total, kept = decoded.len(), what, "Decoded JSON list");
    Ok(decoded)
}

fn timestamp_or_zero(date: &str, id: i64) -> i64 {
    timestamp_from_wp_date(date).unwrap_or_else(|| {
        warn!(id, date, "Unparseable publication date");
        0
    })
}

/// Parse one page of an article-list endpoint.
#[instrument(level = "debug", skip_all, fields(bytes = body.len()))]
pub fn parse_articles(body: &str, config: &ReaderConfig) -> Result<Vec<Article>> {
    let posts: Vec<WpPost> = decode_elements(body, "article")?;
    Ok(posts.into_iter().map(|p| article_from_post(p, config)).collect())
}

fn article_from_post(post: WpPost, config: &ReaderConfig) -> Article {
    let title = decode(&post.title.rendered);

    let subtitle = if post.kind == TYPE_ARTICLE {
        let subtitle = post
            .acf
            .get("subtitle")
            .and_then(Value::as_str)
            .map(decode)
            .filter(|s| !s.trim().is_empty());
        if subtitle.is_none() {
            debug!(id = post.id, "Article without subtitle");
        }
        subtitle
    } else {
        None
    };

    let author = if post.kind == TYPE_BRIEF {
        BRIEF_AUTHOR.to_string()
    } else {
        post.embedded
            .author
            .first()
            .and_then(|a| a.name.clone())
            .unwrap_or_else(|| BRIEF_AUTHOR.to_string())
    };

    let mut raw = String::with_capacity(post.content.rendered.len() + 512);
    raw.push_str("<article><h1>");
    raw.push_str(&title);
    raw.push_str("</h1>");
    if let Some(s) = &subtitle {
        raw.push_str("<span>");
        raw.push_str(s);
        raw.push_str("</span>");
    }
    raw.push_str(&post.content.rendered);
    raw.push_str("<footer>Par ");
    raw.push_str(&author);
    raw.push_str(" - actu@nextinpact.com<br /><br />Article publié sur <a href=\"");
    raw.push_str(&post.link);
    raw.push_str("\">");
    raw.push_str(&post.link);
    raw.push_str("</a></footer></article>");

    let base = Url::parse(&post.link).ok();
    let content = normalize_article_html(&raw, base.as_ref(), &config.local_asset_prefix);

    let parser_last_comment_id = post
        .embedded
        .replies
        .first()
        .and_then(|thread| thread.first())
        .map(|reply| reply.id)
        .unwrap_or(-1);

    Article {
        id: post.id,
        published_at: timestamp_or_zero(&post.date, post.id),
        title,
        subtitle,
        illustration_url: post
            .embedded
            .featured_media
            .into_iter()
            .next()
            .and_then(|m| m.source_url),
        content,
        seo_url: post.link,
        parser_last_comment_id,
        ..Article::default()
    }
}

/// Parse one page of the comments endpoint.
///
/// `total_header` is the raw `X-WP-Total` header, if the response had one.
#[instrument(level = "debug", skip(body, total_header, config), fields(bytes = body.len()))]
pub fn parse_comments(
    body: &str,
    total_header: Option<&str>,
    article_id: i64,
    config: &ReaderConfig,
) -> Result<CommentsPage> {
    let total = total_header.and_then(|h| h.trim().parse::<i64>().ok());
    if total.is_none() {
        debug!(header = ?total_header.map(|h| truncate_for_log(h, 40)), "No usable comment total");
    }

    let raw: Vec<WpComment> = decode_elements(body, "comment")?;
    let comments = raw
        .into_iter()
        .map(|c| comment_from_wp(c, article_id, config))
        .collect();

    Ok(CommentsPage {
        article_id,
        total,
        comments,
    })
}

fn comment_from_wp(wp: WpComment, article_id: i64, config: &ReaderConfig) -> Comment {
    let author = decode(&wp.author_name);
    let published_at = timestamp_or_zero(&wp.date, wp.id);

    let mut content = wp.content.rendered.trim().to_string();

    if wp.moderation_reason_id.unwrap_or(0) != 0 {
        let reason = wp.moderation_reason.map(|r| r.content).unwrap_or_default();
        content = format!(
            "<em>Commentaire de {} a été modéré {} : {}</em>",
            author,
            format_timestamp(published_at, COMMENT_DATE_FORMAT),
            reason
        );
    }

    let open_quote = format!("<div><{QUOTE_TAG}>");
    let close_quote = format!("</{QUOTE_TAG}></div>");

    if wp.parent != 0 {
        content = format!(
            "{open_quote}<b>En réponse à {}</b>{close_quote}{content}",
            wp.parent
        );
    }

    let content = content
        .replace("<blockquote>", &open_quote)
        .replace("</blockquote>", &close_quote);
    let content = replace_smileys(&content, &config.smiley_cdn_url);

    Comment {
        id: wp.id,
        article_id,
        author,
        published_at,
        content,
        display_number: 0,
    }
}
