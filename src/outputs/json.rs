//! JSON export of an insert delta.
//!
//! Each export is a standalone, pretty-printed array of listing records:
//!
//! ```text
//! export_dir/
//! ├── sauto_data_20240506_142501.json
//! └── tipcars_data_20240507_090000.json
//! ```

use crate::models::ListingRecord;
use crate::scrapers::Site;
use crate::utils::ensure_writable_dir;
use chrono::NaiveDateTime;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

/// File name for an export of `site` taken at `at`.
pub fn export_file_name(site: Site, at: NaiveDateTime) -> String {
    format!("{site}_data_{}.json", at.format("%Y%m%d_%H%M%S"))
}

/// Write `records` to `{export_dir}/{site}_data_{YYYYmmdd_HHMMSS}.json`.
///
/// The directory is created and checked for writability first. Returns the
/// path written.
#[instrument(level = "info", skip_all, fields(export_dir = %export_dir.display(), %site, count = records.len()))]
pub async fn write_delta(
    records: &[ListingRecord],
    site: Site,
    export_dir: &Path,
    at: NaiveDateTime,
) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(records)?;

    if let Err(e) = ensure_writable_dir(export_dir).await {
        error!(error = %e, "Export directory is not writable");
        return Err(e);
    }

    let path = export_dir.join(export_file_name(site, at));
    info!(path = %path.display(), "Writing JSON export");
    fs::write(&path, json).await?;
    info!(path = %path.display(), "Wrote JSON export");

    Ok(path)
}
