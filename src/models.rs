//! Data models for scraped listings and the proxies used to fetch them.
//!
//! This module defines the core data structures used throughout the application:
//! - [`ListingRecord`]: One vehicle listing, keyed by its `url`
//! - [`ListingField`]: The declared column schema of a listing, in output order
//! - [`RawBatch`]: Column-oriented output of a site parser for a single page
//! - [`ProxyCandidate`] / [`VerifiedProxy`]: Proxy addresses before and after probing
//!
//! Parsers produce one [`RawBatch`] per page; the orchestrator flattens it into
//! rows with [`RawBatch::into_records`] before handing them to reconciliation.

use crate::error::FlattenError;
use chrono::NaiveDate;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::{debug, warn};

/// A set of request headers drawn from the header pool for one page fetch.
pub type HeaderSet = BTreeMap<String, String>;

/// The columns of a [`ListingRecord`] in declared schema order.
///
/// The derived `Ord` follows declaration order, so a `BTreeMap` keyed by
/// `ListingField` iterates in schema order regardless of insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ListingField {
    Brand,
    Model,
    Year,
    Mileage,
    Fuel,
    Transmission,
    Power,
    Displacement,
    Price,
    Url,
    Country,
    AddedDate,
}

impl ListingField {
    /// Every field, in schema order.
    pub const ALL: [ListingField; 12] = [
        ListingField::Brand,
        ListingField::Model,
        ListingField::Year,
        ListingField::Mileage,
        ListingField::Fuel,
        ListingField::Transmission,
        ListingField::Power,
        ListingField::Displacement,
        ListingField::Price,
        ListingField::Url,
        ListingField::Country,
        ListingField::AddedDate,
    ];

    /// Column name as it appears in the catalog and in exports.
    pub fn name(self) -> &'static str {
        match self {
            ListingField::Brand => "brand",
            ListingField::Model => "model",
            ListingField::Year => "year",
            ListingField::Mileage => "mileage",
            ListingField::Fuel => "fuel",
            ListingField::Transmission => "transmission",
            ListingField::Power => "power",
            ListingField::Displacement => "displacement",
            ListingField::Price => "price",
            ListingField::Url => "url",
            ListingField::Country => "country",
            ListingField::AddedDate => "added_date",
        }
    }
}

impl fmt::Display for ListingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single vehicle listing extracted from a results page.
///
/// Field order matches [`ListingField::ALL`], which keeps serialized output in
/// schema order. `url` is the natural unique key used by reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub brand: Option<String>,
    pub model: Option<String>,
    pub year: Option<String>,
    pub mileage: Option<String>,
    pub fuel: Option<String>,
    pub transmission: Option<String>,
    pub power: Option<String>,
    pub displacement: Option<String>,
    pub price: Option<String>,
    pub url: String,
    pub country: Option<String>,
    pub added_date: Option<NaiveDate>,
}

impl ListingRecord {
    /// A record with only its key set.
    #[cfg(test)]
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            brand: None,
            model: None,
            year: None,
            mileage: None,
            fuel: None,
            transmission: None,
            power: None,
            displacement: None,
            price: None,
            url: url.into(),
            country: None,
            added_date: None,
        }
    }

    /// The reconciliation key.
    pub fn key(&self) -> &str {
        &self.url
    }
}

/// Column-oriented parse result for one page.
///
/// Every column is expected to hold the same number of values; that is only
/// checked when the batch is flattened.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawBatch {
    columns: BTreeMap<ListingField, Vec<Option<String>>>,
}

impl RawBatch {
    /// An empty batch with every declared column present and zero rows.
    pub fn new() -> Self {
        Self {
            columns: ListingField::ALL
                .into_iter()
                .map(|field| (field, Vec::new()))
                .collect(),
        }
    }

    /// A batch with no columns at all; used to assemble columns one by one.
    #[cfg(test)]
    pub fn empty() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn with_column(mut self, field: ListingField, values: Vec<Option<String>>) -> Self {
        self.columns.insert(field, values);
        self
    }

    /// Append one value to a column, creating the column if needed.
    pub fn push(&mut self, field: ListingField, value: Option<String>) {
        let value = value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        self.columns.entry(field).or_default().push(value);
    }

    /// Number of values in the longest column.
    pub fn len(&self) -> usize {
        self.columns.values().map(Vec::len).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Align every column by position into one [`ListingRecord`] per index.
    ///
    /// # Errors
    ///
    /// - [`FlattenError::MissingField`] if a declared column is absent
    /// - [`FlattenError::LengthMismatch`] if the columns differ in length
    /// - [`FlattenError::InvalidDate`] if an `added_date` value is not `YYYY-MM-DD`
    ///
    /// Rows without a `url` cannot be reconciled and are dropped with a warning.
    pub fn into_records(self) -> Result<Vec<ListingRecord>, FlattenError> {
        if let Some(missing) = ListingField::ALL
            .into_iter()
            .find(|field| !self.columns.contains_key(field))
        {
            return Err(FlattenError::MissingField(missing.name()));
        }

        if !self.columns.values().map(Vec::len).all_equal() {
            let lengths = self
                .columns
                .iter()
                .map(|(field, values)| (field.name(), values.len()))
                .collect();
            return Err(FlattenError::LengthMismatch { lengths });
        }

        let rows = self.len();
        let mut columns: HashMap<ListingField, std::vec::IntoIter<Option<String>>> = self
            .columns
            .into_iter()
            .map(|(field, values)| (field, values.into_iter()))
            .collect();
        let mut cell = |field: ListingField| {
            columns
                .get_mut(&field)
                .and_then(Iterator::next)
                .flatten()
        };

        let mut records = Vec::with_capacity(rows);
        for index in 0..rows {
            let brand = cell(ListingField::Brand);
            let model = cell(ListingField::Model);
            let year = cell(ListingField::Year);
            let mileage = cell(ListingField::Mileage);
            let fuel = cell(ListingField::Fuel);
            let transmission = cell(ListingField::Transmission);
            let power = cell(ListingField::Power);
            let displacement = cell(ListingField::Displacement);
            let price = cell(ListingField::Price);
            let url = cell(ListingField::Url);
            let country = cell(ListingField::Country);
            let added_date = match cell(ListingField::AddedDate) {
                Some(raw) => Some(
                    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                        .map_err(|_| FlattenError::InvalidDate { index, value: raw })?,
                ),
                None => None,
            };

            let Some(url) = url else {
                warn!(index, "Listing without url; dropping row");
                continue;
            };

            records.push(ListingRecord {
                brand,
                model,
                year,
                mileage,
                fuel,
                transmission,
                power,
                displacement,
                price,
                url,
                country,
                added_date,
            });
        }
        Ok(records)
    }
}

/// Proxy URL schemes the transport can dial.
const SUPPORTED_SCHEMES: [&str; 2] = ["http", "https"];

/// A proxy address (`host:port`) as read from the candidate source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProxyCandidate(String);

impl ProxyCandidate {
    /// Parse one line of a candidate source.
    ///
    /// Blank lines, `#` comments and anything without a port (such as a CSV
    /// header) yield `None`. For CSV rows only the first column is used. An
    /// `http://` or `https://` prefix is kept; other schemes (`socks5://`)
    /// cannot be dialed by the transport and are skipped.
    pub fn from_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        let first = line.split(',').next()?.trim().trim_matches('"');
        if !first.contains(':') {
            return None;
        }
        match first.split_once("://") {
            Some((scheme, _)) if !SUPPORTED_SCHEMES.contains(&scheme.to_ascii_lowercase().as_str()) => {
                debug!(candidate = first, scheme, "Skipping proxy with unsupported scheme");
                None
            }
            _ => Some(Self(first.to_string())),
        }
    }

    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Proxy URL suitable for an HTTP client; bare `host:port` becomes `http://host:port`.
    pub fn to_url(&self) -> String {
        if self.0.contains("://") {
            self.0.clone()
        } else {
            format!("http://{}", self.0)
        }
    }
}

impl fmt::Display for ProxyCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A candidate that answered the probe, with the origin the probe endpoint saw.
///
/// Requests dial `address`; `egress` is the identity the upstream site observes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedProxy {
    pub address: ProxyCandidate,
    pub egress: String,
}
