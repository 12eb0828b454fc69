//! Database access for tapedeck-fetch
//!
//! A single SQLite file records which catalog resources have been fully
//! processed, so that converted or relocated files are still recognized on
//! later runs.

pub mod ledger;

pub use ledger::{Ledger, LedgerRecord};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use tapedeck_common::Result;

/// Open (creating if needed) the ledger database at `db_path`
pub async fn init_ledger_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    tracing::debug!(path = %db_path.display(), "Connecting to ledger database");

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await?;

    init_tables(&pool).await?;
    Ok(pool)
}

/// In-memory ledger database (one connection, so every query sees the same data)
pub async fn init_memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    init_tables(&pool).await?;
    Ok(pool)
}

async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS downloads (
            resource_url TEXT NOT NULL,
            album_context TEXT NOT NULL,
            download_path TEXT NOT NULL,
            final_path TEXT NOT NULL,
            bytes INTEGER NOT NULL,
            completed_at TEXT NOT NULL,
            PRIMARY KEY (resource_url, album_context)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
