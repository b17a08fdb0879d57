//! Command-line interface definitions.
//!
//! Every subcommand reads the same YAML config, given by `--config` or the
//! `HARVEST_CONFIG` environment variable.

use crate::scrapers::Site;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Harvest vehicle listings through verified proxies and keep only the new ones.
///
/// # Examples
///
/// ```sh
/// # Scrape pages 1-20 of SAuto, store new listings and export them
/// listing_harvest -c harvest.yaml scrape --site sauto --start 1 --end 20 --insert --export ./exports
///
/// # Only verify proxies
/// listing_harvest -c harvest.yaml check-proxies --site tipcars --proxies 10
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the YAML config file
    #[arg(short, long, env = "HARVEST_CONFIG", default_value = "harvest.yaml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scrape a page range and reconcile it against the catalog
    Scrape(ScrapeArgs),
    /// Acquire and probe proxies, then print the verified ones
    CheckProxies {
        /// Site whose proxy settings to use; the global ones otherwise
        #[arg(long, value_enum)]
        site: Option<Site>,

        /// Number of candidates to sample (defaults to `proxy.count`)
        #[arg(long)]
        proxies: Option<usize>,
    },
    /// Print every catalog record
    Show,
    /// Delete every catalog record
    Purge,
}

#[derive(clap::Args, Debug)]
pub struct ScrapeArgs {
    #[arg(long, value_enum)]
    pub site: Site,

    /// First results page
    #[arg(long)]
    pub start: u32,

    /// Last results page (inclusive)
    #[arg(long)]
    pub end: u32,

    /// Number of candidates to sample (defaults to `proxy.count`)
    #[arg(long)]
    pub proxies: Option<usize>,

    /// Insert the new listings into the catalog
    #[arg(long)]
    pub insert: bool,

    /// Write the new listings to a timestamped JSON file in this directory
    #[arg(long)]
    pub export: Option<PathBuf>,
}

impl ScrapeArgs {
    /// Reject an empty page range before anything touches the network.
    pub fn validate(&self) -> Result<(), String> {
        if self.start > self.end {
            return Err(format!(
                "--start ({}) must not be greater than --end ({})",
                self.start, self.end
            ));
        }
        Ok(())
    }
}
