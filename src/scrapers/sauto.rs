//! SAuto results page parser.
//!
//! Listings are `div.c-item__data-wrap` blocks. Past the last page the site
//! renders an error box (`h1.c-error-box__title`) instead of results.

use super::{squash, text_of, ListingRow, PageParse, Parser};
use crate::error::ParseError;
use crate::models::RawBatch;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

static ITEM: Lazy<Selector> = Lazy::new(|| Selector::parse("div.c-item__data-wrap").unwrap());
static ERROR_BOX: Lazy<Selector> = Lazy::new(|| Selector::parse("h1.c-error-box__title").unwrap());
static NAME: Lazy<Selector> = Lazy::new(|| Selector::parse("span.c-item__name").unwrap());
static NAME_SUFFIX: Lazy<Selector> = Lazy::new(|| Selector::parse("span.c-item__name--suffix").unwrap());
static INFO: Lazy<Selector> = Lazy::new(|| Selector::parse("div.c-item__info").unwrap());
static FUEL: Lazy<Selector> = Lazy::new(|| Selector::parse("span.c-item__info-mobile-medium").unwrap());
static GEARBOX: Lazy<Selector> = Lazy::new(|| Selector::parse("span.c-item__info-mobile-wide").unwrap());
static PRICE: Lazy<Selector> = Lazy::new(|| Selector::parse("div.c-item__price").unwrap());
static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a.c-item__link").unwrap());

/// Parser for SAuto result pages (`div.c-item__data-wrap` items).
#[derive(Debug, Clone)]
pub struct SAutoParser {
    today: NaiveDate,
}

impl SAutoParser {
    /// Creates a parser.
    ///
    /// # Arguments
    ///
    /// * `today` - Date written into every row's `added_date` column
    ///
    /// # Returns
    ///
    /// An `SAutoParser` ready to be boxed as a [`Parser`].
    pub fn new(today: NaiveDate) -> Self {
        Self { today }
    }

    fn first_text(item: ElementRef<'_>, selector: &Selector) -> Option<String> {
        item.select(selector).next().map(text_of)
    }

    fn item(item: ElementRef<'_>) -> ListingRow {
        let mut row = ListingRow::default();

        // the suffix span sits inside the name span; take the name without it
        if let Some(name) = item.select(&NAME).next() {
            let full = text_of(name);
            let suffix = Self::first_text(name, &NAME_SUFFIX).unwrap_or_default();
            let head = full.strip_suffix(suffix.as_str()).unwrap_or(&full);
            let head = head.split(',').next().unwrap_or_default();
            let mut words = head.split_whitespace();
            row.brand = words.next().map(str::to_string);
            row.model = words.next().map(str::to_string);
            row.displacement = suffix.split(',').next().map(str::to_string);
        }

        if let Some(info) = Self::first_text(item, &INFO) {
            let mut parts = info.split(',');
            row.year = parts.next().map(str::to_string);
            row.mileage = parts.next().map(|km| squash(&km.replace("km", "")));
        }

        row.fuel = Self::first_text(item, &FUEL).map(|f| f.replace(", ", "").trim_matches(',').to_string());
        row.transmission =
            Self::first_text(item, &GEARBOX).map(|g| g.replace(", ", "").trim_matches(',').to_string());
        row.price = Self::first_text(item, &PRICE).map(|p| squash(&p.replace("Kč", "")));
        row.url = item
            .select(&LINK)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(str::to_string);
        row
    }
}

impl Parser for SAutoParser {
    fn parse(&self, body: &str) -> Result<PageParse, ParseError> {
        let document = Html::parse_document(body);
        if document.select(&ERROR_BOX).next().is_some() {
            return Ok(PageParse::EndOfResults);
        }

        let mut batch = RawBatch::new();
        for item in document.select(&ITEM) {
            Self::item(item).push_into(&mut batch, self.today);
        }
        debug!(rows = batch.len(), "Parsed SAuto page");
        Ok(PageParse::Batch(batch))
    }
}
