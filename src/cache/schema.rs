//! Cache schema and its upgrade path.
//!
//! The schema version lives in SQLite's `PRAGMA user_version`:
//!
//! | stored version | action |
//! |----------------|--------|
//! | 0              | fresh database, create the tables |
//! | 1 ..= 9        | pre-Next layout, drop everything and recreate |
//! | 10             | rename the read-position column, add the last-comment column |
//! | 11             | current |
//! | > 11           | written by a newer reader, refuse to touch it |

use crate::error::{NewsError, Result};
use sqlx::SqlitePool;
use tracing::{info, instrument, warn};

pub const SCHEMA_VERSION: i64 = 11;

pub const TABLE_ARTICLES: &str = "articles";
pub const TABLE_COMMENTS: &str = "commentaires";
pub const TABLE_REFRESH: &str = "refresh";
/// Image cache table from old versions; only ever dropped.
const TABLE_LEGACY_IMAGE_CACHE: &str = "cacheImage";

const CREATE_ARTICLES: &str = "CREATE TABLE articles (
    id INTEGER NOT NULL PRIMARY KEY,
    titre TEXT NOT NULL,
    soustitre TEXT,
    timestamp INTEGER NOT NULL,
    urlillustration TEXT,
    contenu TEXT,
    nbcomms INTEGER,
    isabonne BOOLEAN,
    islu BOOLEAN,
    iscontenuabonnedl BOOLEAN,
    indiceDernierCommentaireLu INTEGER,
    urlseo TEXT,
    idDernierCommentaireParseur INTEGER
)";

const CREATE_COMMENTS: &str = "CREATE TABLE commentaires (
    id INTEGER NOT NULL PRIMARY KEY,
    idarticle INTEGER NOT NULL REFERENCES articles(id),
    auteur TEXT,
    timestamp INTEGER,
    contenu TEXT
)";

const CREATE_REFRESH: &str = "CREATE TABLE refresh (
    idarticle INTEGER PRIMARY KEY,
    timestamp INTEGER
)";

pub async fn user_version(pool: &SqlitePool) -> Result<i64> {
    Ok(sqlx::query_scalar::<_, i64>("PRAGMA user_version")
        .fetch_one(pool)
        .await?)
}

/// Bring the database to [`SCHEMA_VERSION`].
#[instrument(level = "info", skip_all)]
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    let found = user_version(pool).await?;
    if found == SCHEMA_VERSION {
        return Ok(());
    }
    if found > SCHEMA_VERSION {
        return Err(NewsError::SchemaTooNew {
            found,
            supported: SCHEMA_VERSION,
        });
    }

    let mut tx = pool.begin().await?;
    match found {
        0 => {
            info!("Creating cache schema");
            for ddl in [CREATE_ARTICLES, CREATE_COMMENTS, CREATE_REFRESH] {
                sqlx::query(ddl).execute(&mut *tx).await?;
            }
        }
        10 => {
            info!(from = found, "Upgrading cache schema");
            sqlx::query(
                "ALTER TABLE articles RENAME COLUMN dernierCommentaireLu TO indiceDernierCommentaireLu",
            )
            .execute(&mut *tx)
            .await?;
            sqlx::query("ALTER TABLE articles ADD COLUMN idDernierCommentaireParseur INTEGER")
                .execute(&mut *tx)
                .await?;
        }
        _ => {
            warn!(from = found, "Cache predates the Next API; rebuilding it from scratch");
            for table in [
                TABLE_ARTICLES,
                TABLE_COMMENTS,
                TABLE_REFRESH,
                TABLE_LEGACY_IMAGE_CACHE,
            ] {
                sqlx::query(&format!("DROP TABLE IF EXISTS {table}"))
                    .execute(&mut *tx)
                    .await?;
            }
            for ddl in [CREATE_ARTICLES, CREATE_COMMENTS, CREATE_REFRESH] {
                sqlx::query(ddl).execute(&mut *tx).await?;
            }
        }
    }
    sqlx::query(&format!("PRAGMA user_version = {SCHEMA_VERSION}"))
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(from = found, to = SCHEMA_VERSION, "Cache schema ready");
    Ok(())
}
