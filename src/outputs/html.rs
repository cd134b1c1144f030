//! Standalone HTML pages for offline reading.

use crate::models::{Article, Comment};
use crate::parser::QUOTE_TAG;
use html_escape::encode_text;
use scraper::Html;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};

fn stylesheet() -> String {
    format!(
        "body {{ font-family: sans-serif; max-width: 50em; margin: auto; padding: 1em; }}
img {{ max-width: 100%; }}
footer {{ color: #666; font-size: 0.9em; }}
.comment {{ border-top: 1px solid #ddd; padding: 0.5em 0; }}
.comment-header {{ font-weight: bold; color: #333; }}
.last-read {{ background: #fff8dc; }}
{QUOTE_TAG} {{ display: block; border-left: 3px solid #aaa; margin: 0.5em 0; padding-left: 0.8em; color: #555; }}
"
    )
}

/// Build the page of an article followed by its comments.
///
/// The comment at the article's read position gets the `last-read` class and
/// every comment an anchor `#c{n}`.
pub fn render_article_page(article: &Article, comments: &[Comment]) -> String {
    let mut page = String::with_capacity(article.content.len() + comments.len() * 512 + 1024);
    page.push_str("<!DOCTYPE html>\n<html lang=\"fr\">\n<head>\n<meta charset=\"utf-8\">\n<title>");
    page.push_str(&encode_text(&article.title));
    page.push_str("</title>\n<style>\n");
    page.push_str(&stylesheet());
    page.push_str("</style>\n</head>\n<body>\n");
    page.push_str(&article.content);
    page.push('\n');

    if !comments.is_empty() {
        page.push_str(&format!(
            "<section id=\"comments\">\n<h2>Commentaires ({})</h2>\n",
            comments.len()
        ));
        for comment in comments {
            let class = if comment.display_number == article.last_read_comment_index {
                "comment last-read"
            } else {
                "comment"
            };
            page.push_str(&format!(
                "<div class=\"{class}\" id=\"c{n}\">\n<div class=\"comment-header\">#{n} {header}</div>\n{content}\n</div>\n",
                n = comment.display_number,
                header = encode_text(&comment.author_and_date()),
                content = comment.content,
            ));
        }
        page.push_str("</section>\n");
    }

    page.push_str("</body>\n</html>\n");
    page
}

/// Text of an HTML fragment, for terminal output. Paragraph breaks are kept.
pub fn plain_text(html: &str) -> String {
    let spaced = html
        .replace("</p>", "</p>\n")
        .replace("<br>", "<br>\n")
        .replace("<br />", "<br />\n");
    let fragment = Html::parse_fragment(&spaced);
    let text: String = fragment.root_element().text().collect();
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Write `{id}.html` into `dir` and return its path.
#[instrument(level = "info", skip_all, fields(id = article.id, dir = %dir.display()))]
pub async fn write_article_page(
    article: &Article,
    comments: &[Comment],
    dir: &Path,
) -> Result<PathBuf, Box<dyn Error>> {
    fs::create_dir_all(dir).await?;
    let path = dir.join(format!("{}.html", article.id));
    fs::write(&path, render_article_page(article, comments)).await?;
    info!(path = %path.display(), comments = comments.len(), "Wrote article page");
    Ok(path)
}
