//! Output writers for scraped listings.
//!
//! - [`json`]: exports an insert delta as a timestamped JSON file

pub mod json;
