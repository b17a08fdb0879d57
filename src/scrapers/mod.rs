//! Site-specific parsers for listing result pages.
//!
//! Every supported site has one [`Parser`] implementation that turns a
//! results page into a column-oriented [`RawBatch`], or reports that the site
//! has run out of pages. The orchestrator depends only on the trait.
//!
//! # Supported Sites
//!
//! | Site | Module | End-of-results signal |
//! |------|--------|-----------------------|
//! | AAA Auto | [`aaaauto`] | Pagination nav disappears; a "no results" paragraph is shown |
//! | SAuto | [`sauto`] | Error box title is rendered |
//! | TipCars | [`tipcars`] | "Next page" arrow icon disappears |
//!
//! Fields that cannot be found on a card become empty values rather than
//! errors; the page still yields one row per card.

use crate::error::ParseError;
use crate::models::{ListingField, RawBatch};
use chrono::NaiveDate;
use clap::ValueEnum;
use scraper::ElementRef;
use serde::Deserialize;
use std::fmt;

pub mod aaaauto;
pub mod sauto;
pub mod tipcars;

/// Every listing scraped here is from the Czech market.
pub const COUNTRY: &str = "Czech Republic";

/// What a results page turned out to contain.
#[derive(Debug, Clone, PartialEq)]
pub enum PageParse {
    Batch(RawBatch),
    /// The site has no more pages.
    EndOfResults,
}

/// Turns one page body into listing columns, or reports the end of results.
pub trait Parser {
    fn parse(&self, body: &str) -> Result<PageParse, ParseError>;
}

/// A source site, as named on the command line and in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Site {
    Aaaauto,
    Sauto,
    Tipcars,
}

impl Site {
    /// Lowercase name, as used in config keys and export file names.
    pub fn as_str(self) -> &'static str {
        match self {
            Site::Aaaauto => "aaaauto",
            Site::Sauto => "sauto",
            Site::Tipcars => "tipcars",
        }
    }

    /// The parser for this site, stamping rows with `today`.
    pub fn parser(self, today: NaiveDate) -> Box<dyn Parser> {
        match self {
            Site::Aaaauto => Box::new(aaaauto::AaaAutoParser::new(today)),
            Site::Sauto => Box::new(sauto::SAutoParser::new(today)),
            Site::Tipcars => Box::new(tipcars::TipCarsParser::new(today)),
        }
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One card's worth of extracted values.
#[derive(Debug, Default)]
pub(crate) struct ListingRow {
    pub brand: Option<String>,
    pub model: Option<String>,
    pub year: Option<String>,
    pub mileage: Option<String>,
    pub fuel: Option<String>,
    pub transmission: Option<String>,
    pub power: Option<String>,
    pub displacement: Option<String>,
    pub price: Option<String>,
    pub url: Option<String>,
}

impl ListingRow {
    /// Append this row to every column of `batch`, keeping them aligned.
    pub fn push_into(self, batch: &mut RawBatch, today: NaiveDate) {
        batch.push(ListingField::Brand, self.brand);
        batch.push(ListingField::Model, self.model);
        batch.push(ListingField::Year, self.year);
        batch.push(ListingField::Mileage, self.mileage);
        batch.push(ListingField::Fuel, self.fuel);
        batch.push(ListingField::Transmission, self.transmission);
        batch.push(ListingField::Power, self.power);
        batch.push(ListingField::Displacement, self.displacement);
        batch.push(ListingField::Price, self.price);
        batch.push(ListingField::Url, self.url);
        batch.push(ListingField::Country, Some(COUNTRY.to_string()));
        batch.push(
            ListingField::AddedDate,
            Some(today.format("%Y-%m-%d").to_string()),
        );
    }
}

/// Element text with whitespace runs collapsed to single spaces.
pub(crate) fn text_of(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Drop every whitespace character, including non-breaking spaces.
pub(crate) fn squash(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}
