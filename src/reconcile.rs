//! Reconciliation of freshly scraped listings against the catalog.
//!
//! A listing is new when its `url` is not in the catalog. The engine fetches
//! the catalog entries for the batch's keys in a single query and filters the
//! batch against that key set.
//!
//! There is no deduplication within a batch: two scraped records sharing an
//! absent url both end up in the delta, exactly as a per-record existence
//! check would behave.

use crate::error::ReconcileError;
use crate::models::ListingRecord;
use crate::store::{CatalogStore, RecordFilter};
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, error, info, instrument};

/// The keys already present in the catalog at diff time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogSnapshot {
    keys: HashSet<String>,
}

impl CatalogSnapshot {
    pub fn from_records(records: &[ListingRecord]) -> Self {
        Self {
            keys: records.iter().map(|r| r.key().to_string()).collect(),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Records of `batch` whose key is absent, in batch order.
    pub fn diff(&self, batch: &[ListingRecord]) -> InsertDelta {
        let mut records = Vec::new();
        for record in batch {
            if self.contains(record.key()) {
                debug!(url = %record.url, "Skipping; url already in catalog");
            } else {
                debug!(url = %record.url, "New url found");
                records.push(record.clone());
            }
        }
        InsertDelta { records }
    }
}

/// The part of a scraped batch that should be stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertDelta {
    records: Vec<ListingRecord>,
}

impl InsertDelta {
    pub fn records(&self) -> &[ListingRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug)]
pub struct ReconciliationEngine<'a, S> {
    store: &'a S,
}

impl<'a, S: CatalogStore> ReconciliationEngine<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Diff `batch` against the catalog.
    ///
    /// The batch is only borrowed, so on error the caller still holds every
    /// scraped record and can retry.
    #[instrument(level = "info", skip_all, fields(batch = batch.len()))]
    pub async fn reconcile(&self, batch: &[ListingRecord]) -> Result<InsertDelta, ReconcileError> {
        if batch.is_empty() {
            info!("Nothing to reconcile");
            return Ok(InsertDelta::default());
        }

        let t0 = Instant::now();
        let keys: HashSet<String> = batch.iter().map(|r| r.key().to_string()).collect();
        let existing = self
            .store
            .read(&RecordFilter::UrlIn(keys))
            .await
            .inspect_err(|e| error!(error = %e, "Catalog query failed"))?;
        let delta = CatalogSnapshot::from_records(&existing).diff(batch);

        info!(
            elapsed_ms = t0.elapsed().as_millis() as u64,
            scraped = batch.len(),
            already_stored = batch.len() - delta.len(),
            new = delta.len(),
            "Compared scraped listings with catalog"
        );
        Ok(delta)
    }
}
