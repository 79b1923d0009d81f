//! Database module: connection setup and the query execution seam.
//!
//! - `source`: the `DataSource` trait the query builder executes through, and
//!   its SQLite implementation.

pub mod source;

use anyhow::{Context, Result};
use sqlx::SqlitePool;

pub use source::{DataSource, QueryError};

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized)
        .await
        .with_context(|| format!("failed to open database {normalized}"))?;
    if !normalized.starts_with("sqlite::memory") {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&pool)
            .await?;
    }
    sqlx::query("PRAGMA foreign_keys=ON;").execute(&pool).await?;
    Ok(pool)
}

/// Apply the bundled demo schema.
pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// For file-backed SQLite URLs expand a leading `~/`, make sure the parent
/// directory exists and ask for the file to be created when missing.
/// In-memory and non-SQLite URLs pass through untouched.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let query = match query_part {
        Some(q) if q.contains("mode=") => q.to_string(),
        Some(q) if !q.is_empty() => format!("{q}&mode=rwc"),
        _ => "mode=rwc".to_string(),
    };
    format!("sqlite://{expanded_path}?{query}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_urls_pass_through() {
        assert_eq!(prepare_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(
            prepare_sqlite_url("postgres://localhost/db"),
            "postgres://localhost/db"
        );
    }

    #[test]
    fn file_urls_get_create_mode_and_parent_dir() {
        let td = tempfile::tempdir().unwrap();
        let db_path = td.path().join("nested").join("grid.db");
        let url = format!("sqlite://{}", db_path.display());
        let prepared = prepare_sqlite_url(&url);
        assert_eq!(prepared, format!("sqlite://{}?mode=rwc", db_path.display()));
        assert!(db_path.parent().unwrap().exists());

        let prepared = prepare_sqlite_url(&format!("{url}?mode=ro"));
        assert!(prepared.ends_with("?mode=ro"));
    }

    #[tokio::test]
    async fn migrations_create_demo_tables() {
        let pool = init_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let n: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name LIKE 'app_%'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(n, 2);
    }
}
