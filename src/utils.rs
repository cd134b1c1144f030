//! Small helpers shared across modules: date conversion, URL fragments,
//! log truncation and file-system checks.

use chrono::{DateTime, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, instrument};

static SCHEME_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:https?:)?//").expect("static regex is valid"));

/// Convert a WordPress `date` field (`2023-11-10T14:30:00`) to epoch seconds.
///
/// The API returns a naive timestamp; it is read as UTC. A trailing offset
/// or `Z` is accepted as well.
pub fn timestamp_from_wp_date(date: &str) -> Option<i64> {
    let date = date.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(date) {
        return Some(dt.timestamp());
    }
    NaiveDateTime::parse_from_str(date, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc().timestamp())
}

/// Format epoch seconds with a `strftime` pattern (UTC).
pub fn format_timestamp(ts: i64, pattern: &str) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|dt| dt.format(pattern).to_string())
        .unwrap_or_default()
}

pub fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Drop a leading `https://`, `http://` or `//`.
pub fn strip_scheme(url: &str) -> &str {
    match SCHEME_PREFIX.find(url) {
        Some(m) => &url[m.end()..],
        None => url,
    }
}

/// Last path segment of a URL, without query string or fragment.
///
/// ```ignore
/// assert_eq!(last_segment("https://cdn/x/168187.png?w=300#top"), "168187.png");
/// ```
pub fn last_segment(url: &str) -> &str {
    let tail = match url.rfind('/') {
        Some(i) => &url[i + 1..],
        None => url,
    };
    let tail = tail.split('?').next().unwrap_or(tail);
    tail.split('#').next().unwrap_or(tail)
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut at `max` bytes (on a char boundary) and suffixed
/// with `"…(+N bytes)"`.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then writes and removes a scratch file.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    let scratch_path = path.join("..__write_check__");
    match stdfs::File::create(&scratch_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&scratch_path);
            debug!("Directory is writable");
            Ok(())
        }
        Err(e) => {
            info!(error = %e, "Directory is not writable");
            Err(Box::new(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_from_wp_date() {
        assert_eq!(timestamp_from_wp_date("2023-11-10T14:30:00"), Some(1_699_626_600));
        assert_eq!(timestamp_from_wp_date("2023-11-10T14:30:00Z"), Some(1_699_626_600));
        assert_eq!(
            timestamp_from_wp_date("2023-11-10T15:30:00+01:00"),
            Some(1_699_626_600)
        );
        assert_eq!(timestamp_from_wp_date("yesterday"), None);
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0, "%Y-%m-%d"), "1970-01-01");
        assert_eq!(format_timestamp(1_699_626_600, "%d/%m/%Y %H:%M"), "10/11/2023 14:30");
    }

    #[test]
    fn test_strip_scheme() {
        assert_eq!(strip_scheme("https://www.youtube.com/embed/x"), "www.youtube.com/embed/x");
        assert_eq!(strip_scheme("http://vid.me/abc"), "vid.me/abc");
        assert_eq!(strip_scheme("//player.vimeo.com/video/1"), "player.vimeo.com/video/1");
        assert_eq!(strip_scheme("www.arte.tv/fr"), "www.arte.tv/fr");
    }

    #[test]
    fn test_last_segment() {
        assert_eq!(last_segment("https://cdn2.nextinpact.com/images/bd/news/168187.png"), "168187.png");
        assert_eq!(last_segment("https://x.org/a/b.gif?v=2#top"), "b.gif");
        assert_eq!(last_segment("www.youtube.com/embed/dQw4w9WgXcQ?rel=0"), "dQw4w9WgXcQ");
        assert_eq!(last_segment("plain"), "plain");
    }

    #[test]
    fn test_truncate_for_log_short_string() {
        assert_eq!(truncate_for_log("Hello, world!", 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_for_log_multibyte() {
        let s = "éééé";
        let result = truncate_for_log(s, 3);
        assert!(result.starts_with('é'));
        assert!(result.contains("(+6 bytes)"));
    }

    #[tokio::test]
    async fn test_ensure_writable_dir_creates() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a/b");
        ensure_writable_dir(&target).await.unwrap();
        assert!(target.is_dir());
    }
}
