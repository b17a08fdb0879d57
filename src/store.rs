//! Persistence of the listing catalog.
//!
//! The catalog is the set of listings already ingested. The pipeline only
//! reads it during reconciliation; inserts happen when the caller decides to
//! keep an [`InsertDelta`](crate::reconcile::InsertDelta).
//!
//! [`JsonFileStore`] keeps the whole catalog as one JSON array. A missing
//! file reads as an empty catalog. Writes go to a sibling temp file which is
//! then renamed over the original.

use crate::error::StoreError;
use crate::models::ListingRecord;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument};

/// Selects catalog records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordFilter {
    All,
    /// Records whose url is one of these keys.
    UrlIn(HashSet<String>),
}

impl RecordFilter {
    pub fn matches(&self, record: &ListingRecord) -> bool {
        match self {
            RecordFilter::All => true,
            RecordFilter::UrlIn(keys) => keys.contains(record.key()),
        }
    }
}

/// The persisted catalog.
pub trait CatalogStore {
    async fn read(&self, filter: &RecordFilter) -> Result<Vec<ListingRecord>, StoreError>;
    /// Append records; returns how many were written.
    async fn insert(&self, records: &[ListingRecord]) -> Result<usize, StoreError>;
    /// Remove everything; returns how many records were removed.
    async fn delete_all(&self) -> Result<usize, StoreError>;
}

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    async fn load(&self) -> Result<Vec<ListingRecord>, StoreError> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Catalog file absent; treating as empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(self.io_error(e)),
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
            path: self.path.display().to_string(),
            source,
        })
    }

    async fn save(&self, records: &[ListingRecord]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| self.io_error(e))?;
        }
        let json = serde_json::to_string_pretty(records).map_err(|source| StoreError::Corrupt {
            path: self.path.display().to_string(),
            source,
        })?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).await.map_err(|e| self.io_error(e))?;
        fs::rename(&tmp, &self.path).await.map_err(|e| self.io_error(e))?;
        Ok(())
    }
}

impl CatalogStore for JsonFileStore {
    #[instrument(level = "debug", skip_all, fields(path = %self.path.display()))]
    async fn read(&self, filter: &RecordFilter) -> Result<Vec<ListingRecord>, StoreError> {
        let records = self.load().await?;
        Ok(records.into_iter().filter(|r| filter.matches(r)).collect())
    }

    #[instrument(level = "info", skip_all, fields(path = %self.path.display(), count = records.len()))]
    async fn insert(&self, records: &[ListingRecord]) -> Result<usize, StoreError> {
        let mut catalog = self.load().await?;
        catalog.extend_from_slice(records);
        self.save(&catalog).await?;
        info!(total = catalog.len(), "Inserted records into catalog");
        Ok(records.len())
    }

    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    async fn delete_all(&self) -> Result<usize, StoreError> {
        let removed = self.load().await?.len();
        self.save(&[]).await?;
        info!(removed, "Deleted all catalog records");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_file_reads_empty() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("catalog.json"));
        assert!(store.read(&RecordFilter::All).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_insert_then_filtered_read() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("catalog.json"));
        let inserted = store
            .insert(&[
                ListingRecord::with_url("https://a"),
                ListingRecord::with_url("https://b"),
            ])
            .await
            .unwrap();
        assert_eq!(inserted, 2);

        let filter = RecordFilter::UrlIn(HashSet::from(["https://b".to_string(), "https://z".to_string()]));
        let found = store.read(&filter).await.unwrap();
        assert_eq!(found, vec![ListingRecord::with_url("https://b")]);
    }

    #[tokio::test]
    async fn test_delete_all() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("catalog.json"));
        store.insert(&[ListingRecord::with_url("https://a")]).await.unwrap();
        assert_eq!(store.delete_all().await.unwrap(), 1);
        assert!(store.read(&RecordFilter::All).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = JsonFileStore::new(&path);
        assert!(matches!(
            store.read(&RecordFilter::All).await,
            Err(StoreError::Corrupt { .. })
        ));
    }
}
