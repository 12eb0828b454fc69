//! Download ledger
//!
//! One row per catalog entry `(resource, album context)` that made it
//! through the pipeline. The final
//! path is where the file ended up after conversion and relocation, which
//! the destination-path check alone cannot know.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use tapedeck_common::Result;

/// One completed resource
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerRecord {
    pub resource_url: String,
    pub album_context: String,
    /// Where the body was first written
    pub download_path: PathBuf,
    /// Where the file lives after conversion and relocation
    pub final_path: PathBuf,
    pub bytes: u64,
    pub completed_at: DateTime<Utc>,
}

/// Handle to the ledger table
#[derive(Clone)]
pub struct Ledger {
    pool: SqlitePool,
}

impl Ledger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open the file-backed ledger at `path`
    pub async fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(super::init_ledger_pool(path).await?))
    }

    /// Ledger that lives only as long as the handle
    pub async fn in_memory() -> Result<Self> {
        Ok(Self::new(super::init_memory_pool().await?))
    }

    pub async fn lookup(&self, resource_url: &str, album_context: &str) -> Result<Option<LedgerRecord>> {
        let row = sqlx::query(
            r#"
            SELECT resource_url, album_context, download_path, final_path, bytes, completed_at
            FROM downloads
            WHERE resource_url = ? AND album_context = ?
            "#,
        )
        .bind(resource_url)
        .bind(album_context)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let completed_at: String = row.get("completed_at");
        let completed_at = DateTime::parse_from_rfc3339(&completed_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        let bytes: i64 = row.get("bytes");

        Ok(Some(LedgerRecord {
            resource_url: row.get("resource_url"),
            album_context: row.get("album_context"),
            download_path: PathBuf::from(row.get::<String, _>("download_path")),
            final_path: PathBuf::from(row.get::<String, _>("final_path")),
            bytes: bytes.max(0) as u64,
            completed_at,
        }))
    }

    /// Final path of a completed entry, if it still exists on disk
    pub async fn existing_final_path(
        &self,
        resource_url: &str,
        album_context: &str,
    ) -> Result<Option<PathBuf>> {
        Ok(self
            .lookup(resource_url, album_context)
            .await?
            .map(|record| record.final_path)
            .filter(|path| path.exists()))
    }

    /// Insert or replace the record for the entry
    pub async fn record(&self, record: &LedgerRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO downloads (resource_url, album_context, download_path, final_path, bytes, completed_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(resource_url, album_context) DO UPDATE SET
                download_path = excluded.download_path,
                final_path = excluded.final_path,
                bytes = excluded.bytes,
                completed_at = excluded.completed_at
            "#,
        )
        .bind(&record.resource_url)
        .bind(&record.album_context)
        .bind(record.download_path.to_string_lossy().to_string())
        .bind(record.final_path.to_string_lossy().to_string())
        .bind(record.bytes as i64)
        .bind(record.completed_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Resource URL of a different entry whose final path is `final_path`
    pub async fn other_owner(
        &self,
        final_path: &Path,
        resource_url: &str,
        album_context: &str,
    ) -> Result<Option<String>> {
        let owner: Option<String> = sqlx::query_scalar(
            r#"
            SELECT resource_url
            FROM downloads
            WHERE final_path = ? AND NOT (resource_url = ? AND album_context = ?)
            LIMIT 1
            "#,
        )
        .bind(final_path.to_string_lossy().to_string())
        .bind(resource_url)
        .bind(album_context)
        .fetch_optional(&self.pool)
        .await?;

        Ok(owner)
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM downloads")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(url: &str, final_path: &Path) -> LedgerRecord {
        LedgerRecord {
            resource_url: url.to_string(),
            album_context: "Holiday!!".to_string(),
            download_path: final_path.with_extension("m4a"),
            final_path: final_path.to_path_buf(),
            bytes: 1234,
            completed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_record_and_lookup() {
        let ledger = Ledger::in_memory().await.unwrap();
        let rec = record("http://host/a.m4a", Path::new("/r/Holiday__/a.mp3"));

        ledger.record(&rec).await.unwrap();
        let loaded = ledger.lookup("http://host/a.m4a", "Holiday!!").await.unwrap().unwrap();

        assert_eq!(loaded.final_path, PathBuf::from("/r/Holiday__/a.mp3"));
        assert_eq!(loaded.download_path, PathBuf::from("/r/Holiday__/a.m4a"));
        assert_eq!(loaded.bytes, 1234);
        assert!(ledger.lookup("http://host/missing", "Holiday!!").await.unwrap().is_none());
        assert!(ledger.lookup("http://host/a.m4a", "Other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_record_is_upsert() {
        let ledger = Ledger::in_memory().await.unwrap();
        ledger.record(&record("u", Path::new("/one.mp3"))).await.unwrap();
        ledger.record(&record("u", Path::new("/two.mp3"))).await.unwrap();

        assert_eq!(ledger.count().await.unwrap(), 1);
        let loaded = ledger.lookup("u", "Holiday!!").await.unwrap().unwrap();
        assert_eq!(loaded.final_path, PathBuf::from("/two.mp3"));
    }

    #[tokio::test]
    async fn test_existing_final_path_requires_file() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("here.mp3");
        std::fs::write(&present, b"x").unwrap();

        let ledger = Ledger::in_memory().await.unwrap();
        ledger.record(&record("present", &present)).await.unwrap();
        ledger.record(&record("gone", &dir.path().join("gone.mp3"))).await.unwrap();

        assert_eq!(ledger.existing_final_path("present", "Holiday!!").await.unwrap(), Some(present));
        assert_eq!(ledger.existing_final_path("gone", "Holiday!!").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_other_owner_ignores_own_row() {
        let ledger = Ledger::in_memory().await.unwrap();
        ledger.record(&record("x", Path::new("/r/A/a.mp3"))).await.unwrap();

        assert_eq!(
            ledger.other_owner(Path::new("/r/A/a.mp3"), "y", "A").await.unwrap(),
            Some("x".to_string())
        );
        assert_eq!(
            ledger.other_owner(Path::new("/r/A/a.mp3"), "x", "Holiday!!").await.unwrap(),
            None
        );
        assert_eq!(ledger.other_owner(Path::new("/r/A/b.mp3"), "y", "A").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_backed_ledger_persists() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("ledger.db");

        {
            let ledger = Ledger::open(&db_path).await.unwrap();
            ledger.record(&record("u", Path::new("/x.mp3"))).await.unwrap();
        }

        let reopened = Ledger::open(&db_path).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
    }
}
