//! SQLite-backed cache of articles, comments and refresh dates.
//!
//! Every write goes through [`Cache`]; the schema and its upgrades are in
//! [`schema`].

pub mod schema;

use crate::error::Result;
use crate::models::{Article, Comment};
use schema::migrate;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use tracing::{debug, info, instrument};

const ARTICLE_COLUMNS: &str = "id, titre, soustitre, timestamp, urlillustration,
    COALESCE(contenu, '') AS contenu,
    COALESCE(nbcomms, 0) AS nbcomms,
    CAST(COALESCE(isabonne, 0) AS INTEGER) AS isabonne,
    CAST(COALESCE(islu, 0) AS INTEGER) AS islu,
    CAST(COALESCE(iscontenuabonnedl, 0) AS INTEGER) AS iscontenuabonnedl,
    COALESCE(indiceDernierCommentaireLu, 0) AS indiceDernierCommentaireLu,
    COALESCE(urlseo, '') AS urlseo,
    COALESCE(idDernierCommentaireParseur, -1) AS idDernierCommentaireParseur";

const COMMENT_COLUMNS: &str = "id, idarticle, COALESCE(auteur, '') AS auteur,
    COALESCE(timestamp, 0) AS timestamp, COALESCE(contenu, '') AS contenu";

/// Single-connection in-memory pool; every connection to `:memory:` is a
/// separate database, so the pool must never open a second one.
pub(crate) async fn memory_pool() -> Result<SqlitePool> {
    // Articles are replaced under their comments, and comments may arrive
    // before their article: the REFERENCES clauses are documentation only.
    let options = SqliteConnectOptions::new()
        .in_memory(true)
        .foreign_keys(false);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;
    Ok(pool)
}

fn article_from_row(row: &SqliteRow) -> Article {
    Article {
        id: row.get("id"),
        title: row.get("titre"),
        subtitle: row.get("soustitre"),
        published_at: row.get("timestamp"),
        illustration_url: row.get("urlillustration"),
        content: row.get("contenu"),
        comment_count: row.get("nbcomms"),
        is_subscriber_only: row.get::<i64, _>("isabonne") > 0,
        is_read: row.get::<i64, _>("islu") > 0,
        subscriber_content_downloaded: row.get::<i64, _>("iscontenuabonnedl") > 0,
        last_read_comment_index: row.get("indiceDernierCommentaireLu"),
        seo_url: row.get("urlseo"),
        parser_last_comment_id: row.get("idDernierCommentaireParseur"),
    }
}

fn comment_from_row(row: &SqliteRow) -> Comment {
    Comment {
        id: row.get("id"),
        article_id: row.get("idarticle"),
        author: row.get("auteur"),
        published_at: row.get("timestamp"),
        content: row.get("contenu"),
        display_number: 0,
    }
}

/// Handle on the local cache database.
#[derive(Debug, Clone)]
pub struct Cache {
    pool: SqlitePool,
}

impl Cache {
    /// Open the cache database, creating it if needed.
    ///
    /// # Arguments
    ///
    /// * `path` - SQLite file, usually `<data-dir>/nxidb.sqlite`.
    ///
    /// # Returns
    ///
    /// A cache whose schema is at the current version. Older schemas are
    /// migrated first.
    ///
    /// # Errors
    ///
    /// [`NewsError::SchemaTooNew`](crate::error::NewsError::SchemaTooNew) when
    /// the file was written by a newer release, `Database` for any other
    /// SQLite failure.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let cache = Cache::open(Path::new("nxi_data/nxidb.sqlite")).await?;
    /// let articles = cache.load_articles_by_date().await?;
    /// ```
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(false);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        migrate(&pool).await?;
        info!("Cache opened");
        Ok(Self { pool })
    }

    pub async fn open_in_memory() -> Result<Self> {
        let pool = memory_pool().await?;
        migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// Insert or replace an article. Its comments and refresh date are kept.
    #[instrument(level = "debug", skip_all, fields(id = article.id))]
    pub async fn save_article(&self, article: &Article) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM articles WHERE id = ?")
            .bind(article.id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO articles (id, titre, soustitre, timestamp, urlillustration, contenu,
                nbcomms, isabonne, islu, iscontenuabonnedl, indiceDernierCommentaireLu,
                urlseo, idDernierCommentaireParseur)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(article.id)
        .bind(&article.title)
        .bind(&article.subtitle)
        .bind(article.published_at)
        .bind(&article.illustration_url)
        .bind(&article.content)
        .bind(article.comment_count)
        .bind(article.is_subscriber_only)
        .bind(article.is_read)
        .bind(article.subscriber_content_downloaded)
        .bind(article.last_read_comment_index)
        .bind(&article.seo_url)
        .bind(article.parser_last_comment_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Remember how far the reader got in the comment thread. Returns
    /// `false` when the article is not cached.
    pub async fn set_last_read_comment_index(&self, article_id: i64, index: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE articles SET indiceDernierCommentaireLu = ? WHERE id = ?")
            .bind(index)
            .bind(article_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_parser_last_comment_id(&self, article_id: i64, comment_id: i64) -> Result<()> {
        sqlx::query("UPDATE articles SET idDernierCommentaireParseur = ? WHERE id = ?")
            .bind(comment_id)
            .bind(article_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Highest comment id stored for an article, `0` when there is none.
    pub async fn max_downloaded_comment_id(&self, article_id: i64) -> Result<i64> {
        let max: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(id), 0) FROM commentaires WHERE idarticle = ?")
                .bind(article_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(max.max(0))
    }

    pub async fn count_comments(&self, article_id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM commentaires WHERE idarticle = ?")
            .bind(article_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn update_comment_count(&self, article_id: i64, count: i64) -> Result<()> {
        sqlx::query("UPDATE articles SET nbcomms = ? WHERE id = ?")
            .bind(count)
            .bind(article_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Returns `false` when the article is not cached.
    pub async fn mark_article_read(&self, article_id: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE articles SET islu = 1 WHERE id = ?")
            .bind(article_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete an article; with `with_comments`, its comments and refresh
    /// date go too.
    #[instrument(level = "debug", skip(self))]
    pub async fn delete_article(&self, article_id: i64, with_comments: bool) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM articles WHERE id = ?")
            .bind(article_id)
            .execute(&mut *tx)
            .await?;
        if with_comments {
            sqlx::query("DELETE FROM commentaires WHERE idarticle = ?")
                .bind(article_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM refresh WHERE idarticle = ?")
                .bind(article_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn load_article(&self, article_id: i64) -> Result<Option<Article>> {
        let row = sqlx::query(&format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = ?"))
            .bind(article_id)
            .fetch_optional(&self.pool)
            .await?;
        if row.is_none() {
            debug!(article_id, "Unknown article");
        }
        Ok(row.as_ref().map(article_from_row))
    }

    /// All cached articles, newest first.
    pub async fn load_articles_by_date(&self) -> Result<Vec<Article>> {
        let rows = sqlx::query(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles ORDER BY timestamp DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(article_from_row).collect())
    }

    /// Store a comment unless it is already there. Returns `true` when a row
    /// was written.
    pub async fn save_comment_if_new(&self, comment: &Comment) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO commentaires (id, idarticle, auteur, timestamp, contenu)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(comment.id)
        .bind(comment.article_id)
        .bind(&comment.author)
        .bind(comment.published_at)
        .bind(&comment.content)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Comments of an article in id order, numbered from 1.
    pub async fn load_comments(&self, article_id: i64) -> Result<Vec<Comment>> {
        let rows = sqlx::query(&format!(
            "SELECT {COMMENT_COLUMNS} FROM commentaires WHERE idarticle = ? ORDER BY id ASC"
        ))
        .bind(article_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .zip(1..)
            .map(|(row, number)| Comment {
                display_number: number,
                ..comment_from_row(row)
            })
            .collect())
    }

    /// Last refresh time of an article (id `0` is the article list), `0` if
    /// never refreshed.
    pub async fn load_refresh_date(&self, article_id: i64) -> Result<i64> {
        let ts: Option<i64> =
            sqlx::query_scalar("SELECT COALESCE(timestamp, 0) FROM refresh WHERE idarticle = ?")
                .bind(article_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(ts.unwrap_or(0))
    }

    pub async fn save_refresh_date(&self, article_id: i64, ts: i64) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO refresh (idarticle, timestamp) VALUES (?, ?)")
            .bind(article_id)
            .bind(ts)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Empty the whole cache.
    #[instrument(level = "info", skip_all)]
    pub async fn clear(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for table in [schema::TABLE_ARTICLES, schema::TABLE_COMMENTS, schema::TABLE_REFRESH] {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        info!("Cache cleared");
        Ok(())
    }

    /// Drop every comment and reset the read positions.
    #[instrument(level = "info", skip_all)]
    pub async fn clear_comments(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM commentaires")
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE articles SET indiceDernierCommentaireLu = 0")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        info!("Comments cleared");
        Ok(())
    }

    /// Delete articles published before `cutoff` along with their comments
    /// and refresh dates. Returns the number of articles removed.
    #[instrument(level = "info", skip(self))]
    pub async fn purge_older_than(&self, cutoff: i64) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "DELETE FROM commentaires WHERE idarticle IN (SELECT id FROM articles WHERE timestamp < ?)",
        )
        .bind(cutoff)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "DELETE FROM refresh WHERE idarticle IN (SELECT id FROM articles WHERE timestamp < ?)",
        )
        .bind(cutoff)
        .execute(&mut *tx)
        .await?;
        let removed = sqlx::query("DELETE FROM articles WHERE timestamp < ?")
            .bind(cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        info!(removed, "Purged old articles");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(id: i64, published_at: i64) -> Article {
        Article {
            id,
            title: format!("Article {id}"),
            subtitle: Some("Sous-titre".to_string()),
            published_at,
            illustration_url: Some(format!("https://cdn.next.ink/{id}.jpg")),
            content: "<p>Contenu</p>".to_string(),
            comment_count: 3,
            seo_url: format!("https://next.ink/{id}/"),
            ..Article::default()
        }
    }

    fn comment(article_id: i64, id: i64) -> Comment {
        Comment {
            id,
            article_id,
            author: "Zed".to_string(),
            published_at: 1_000 + id,
            content: format!("<p>{id}</p>"),
            display_number: 0,
        }
    }

    #[tokio::test]
    async fn test_save_and_load_article() {
        let cache = Cache::open_in_memory().await.unwrap();
        let a = article(1, 100);
        cache.save_article(&a).await.unwrap();
        assert_eq!(cache.load_article(1).await.unwrap(), Some(a));
        assert_eq!(cache.load_article(2).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_article_replaces_but_keeps_comments() {
        let cache = Cache::open_in_memory().await.unwrap();
        cache.save_article(&article(1, 100)).await.unwrap();
        cache.save_comment_if_new(&comment(1, 10)).await.unwrap();

        let updated = Article {
            title: "Nouveau titre".to_string(),
            subtitle: None,
            ..article(1, 100)
        };
        cache.save_article(&updated).await.unwrap();

        let loaded = cache.load_article(1).await.unwrap().unwrap();
        assert_eq!(loaded.title, "Nouveau titre");
        assert!(loaded.subtitle.is_none());
        assert_eq!(cache.load_comments(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_article_flags_and_positions() {
        let cache = Cache::open_in_memory().await.unwrap();
        cache.save_article(&article(1, 100)).await.unwrap();

        assert!(cache.mark_article_read(1).await.unwrap());
        assert!(cache.set_last_read_comment_index(1, 42).await.unwrap());
        cache.set_parser_last_comment_id(1, 900).await.unwrap();
        cache.update_comment_count(1, 57).await.unwrap();

        let a = cache.load_article(1).await.unwrap().unwrap();
        assert!(a.is_read);
        assert_eq!(a.last_read_comment_index, 42);
        assert_eq!(a.parser_last_comment_id, 900);
        assert_eq!(a.comment_count, 57);
    }

    #[tokio::test]
    async fn test_flags_on_unknown_article() {
        let cache = Cache::open_in_memory().await.unwrap();
        assert!(!cache.mark_article_read(404).await.unwrap());
        assert!(!cache.set_last_read_comment_index(404, 3).await.unwrap());
        assert!(cache.load_article(404).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_comment_before_its_article() {
        let cache = Cache::open_in_memory().await.unwrap();
        assert!(cache.save_comment_if_new(&comment(7, 70)).await.unwrap());
        assert_eq!(cache.count_comments(7).await.unwrap(), 1);

        cache.save_article(&article(7, 100)).await.unwrap();
        cache.save_article(&article(7, 100)).await.unwrap();
        assert_eq!(cache.load_comments(7).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_articles_by_date_newest_first() {
        let cache = Cache::open_in_memory().await.unwrap();
        for (id, ts) in [(1, 300), (2, 100), (3, 200)] {
            cache.save_article(&article(id, ts)).await.unwrap();
        }
        let ids: Vec<i64> = cache
            .load_articles_by_date()
            .await
            .unwrap()
            .iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec![1, 3, 2]);
    }

    #[tokio::test]
    async fn test_comments_are_saved_once_and_numbered() {
        let cache = Cache::open_in_memory().await.unwrap();
        cache.save_article(&article(1, 100)).await.unwrap();

        assert!(cache.save_comment_if_new(&comment(1, 30)).await.unwrap());
        assert!(cache.save_comment_if_new(&comment(1, 10)).await.unwrap());
        assert!(!cache.save_comment_if_new(&comment(1, 10)).await.unwrap());

        let comments = cache.load_comments(1).await.unwrap();
        let shape: Vec<(i64, i64)> = comments.iter().map(|c| (c.id, c.display_number)).collect();
        assert_eq!(shape, vec![(10, 1), (30, 2)]);
        assert_eq!(comments[0].author, "Zed");

        assert_eq!(cache.max_downloaded_comment_id(1).await.unwrap(), 30);
        assert_eq!(cache.max_downloaded_comment_id(2).await.unwrap(), 0);
        assert_eq!(cache.count_comments(1).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_refresh_dates() {
        let cache = Cache::open_in_memory().await.unwrap();
        assert_eq!(cache.load_refresh_date(0).await.unwrap(), 0);
        cache.save_refresh_date(0, 1_000).await.unwrap();
        cache.save_refresh_date(0, 2_000).await.unwrap();
        assert_eq!(cache.load_refresh_date(0).await.unwrap(), 2_000);
    }

    #[tokio::test]
    async fn test_delete_article_with_and_without_comments() {
        let cache = Cache::open_in_memory().await.unwrap();
        for id in [1, 2] {
            cache.save_article(&article(id, 100)).await.unwrap();
            cache.save_comment_if_new(&comment(id, id * 10)).await.unwrap();
            cache.save_refresh_date(id, 500).await.unwrap();
        }

        cache.delete_article(1, false).await.unwrap();
        assert!(cache.load_article(1).await.unwrap().is_none());
        assert_eq!(cache.load_comments(1).await.unwrap().len(), 1);
        assert_eq!(cache.load_refresh_date(1).await.unwrap(), 500);

        cache.delete_article(2, true).await.unwrap();
        assert!(cache.load_comments(2).await.unwrap().is_empty());
        assert_eq!(cache.load_refresh_date(2).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_clear_comments_resets_positions() {
        let cache = Cache::open_in_memory().await.unwrap();
        cache.save_article(&article(1, 100)).await.unwrap();
        cache.save_comment_if_new(&comment(1, 10)).await.unwrap();
        cache.set_last_read_comment_index(1, 5).await.unwrap();

        cache.clear_comments().await.unwrap();

        assert!(cache.load_comments(1).await.unwrap().is_empty());
        let a = cache.load_article(1).await.unwrap().unwrap();
        assert_eq!(a.last_read_comment_index, 0);
    }

    #[tokio::test]
    async fn test_clear_empties_everything() {
        let cache = Cache::open_in_memory().await.unwrap();
        cache.save_article(&article(1, 100)).await.unwrap();
        cache.save_comment_if_new(&comment(1, 10)).await.unwrap();
        cache.save_refresh_date(0, 99).await.unwrap();

        cache.clear().await.unwrap();

        assert!(cache.load_articles_by_date().await.unwrap().is_empty());
        assert!(cache.load_comments(1).await.unwrap().is_empty());
        assert_eq!(cache.load_refresh_date(0).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_purge_older_than() {
        let cache = Cache::open_in_memory().await.unwrap();
        cache.save_article(&article(1, 100)).await.unwrap();
        cache.save_article(&article(2, 5_000)).await.unwrap();
        cache.save_comment_if_new(&comment(1, 10)).await.unwrap();
        cache.save_comment_if_new(&comment(2, 20)).await.unwrap();
        cache.save_refresh_date(1, 7).await.unwrap();
        cache.save_refresh_date(0, 8).await.unwrap();

        let removed = cache.purge_older_than(1_000).await.unwrap();

        assert_eq!(removed, 1);
        assert!(cache.load_article(1).await.unwrap().is_none());
        assert!(cache.load_comments(1).await.unwrap().is_empty());
        assert_eq!(cache.load_refresh_date(1).await.unwrap(), 0);
        assert_eq!(cache.load_refresh_date(0).await.unwrap(), 8);
        assert_eq!(cache.load_comments(2).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nxidb.sqlite");
        {
            let cache = Cache::open(&path).await.unwrap();
            cache.save_article(&article(1, 100)).await.unwrap();
        }
        let cache = Cache::open(&path).await.unwrap();
        assert!(cache.load_article(1).await.unwrap().is_some());

        cache.save_comment_if_new(&comment(1, 10)).await.unwrap();
        cache.save_article(&article(1, 200)).await.unwrap();
        assert_eq!(cache.load_comments(1).await.unwrap().len(), 1);
        cache.clear().await.unwrap();
        assert!(cache.load_articles_by_date().await.unwrap().is_empty());
    }
}
