//! AAA Auto results page parser.
//!
//! Listings are `div.card.box` cards. Each card's title link reads like
//! `Škoda Octavia Combi 2.0 TDI, 2019` and its feature list holds mileage,
//! gearbox, fuel and engine (`1.6 / 85kW`) in that order.

use super::{squash, text_of, ListingRow, PageParse, Parser};
use crate::error::ParseError;
use crate::models::RawBatch;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};

static CARD: Lazy<Selector> = Lazy::new(|| Selector::parse("div.card.box").unwrap());
static PAGINATION: Lazy<Selector> = Lazy::new(|| Selector::parse("nav.pagenav").unwrap());
static NO_RESULTS: Lazy<Selector> = Lazy::new(|| Selector::parse("div.paragraphWithIcon h3").unwrap());
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("a.primary.notranslate").unwrap());
static FEATURE: Lazy<Selector> = Lazy::new(|| Selector::parse("ul.carFeaturesList li").unwrap());
static PRICE: Lazy<Selector> = Lazy::new(|| Selector::parse("h3.notranslate").unwrap());

/// Parser for AAA Auto result pages (`div.card.box` listing cards).
#[derive(Debug, Clone)]
pub struct AaaAutoParser {
    today: NaiveDate,
}

impl AaaAutoParser {
    /// Creates a parser.
    ///
    /// # Arguments
    ///
    /// * `today` - Date written into every row's `added_date` column
    ///
    /// # Returns
    ///
    /// An `AaaAutoParser` ready to be boxed as a [`Parser`].
    pub fn new(today: NaiveDate) -> Self {
        Self { today }
    }

    fn card(card: ElementRef<'_>) -> ListingRow {
        let mut row = ListingRow::default();

        if let Some(link) = card.select(&TITLE).next() {
            let title = text_of(link);
            let (name, year) = title.split_once(',').unwrap_or((title.as_str(), ""));
            let mut words = name.split_whitespace();
            row.brand = words.next().map(str::to_string);
            row.model = Some(words.collect::<Vec<_>>().join(" "));
            row.year = Some(year.trim().to_string());
            row.url = link.value().attr("href").map(str::to_string);
        }

        let features: Vec<String> = card.select(&FEATURE).map(text_of).collect();
        row.mileage = features.first().map(|km| squash(&km.replace("km", "")));
        row.transmission = features
            .get(1)
            .and_then(|t| t.split('/').next())
            .map(str::to_string);
        row.fuel = features.get(2).cloned();
        if let Some(engine) = features.get(3) {
            let mut parts = engine.split('/');
            row.displacement = parts.next().map(str::to_string);
            row.power = parts
                .next()
                .map(|p| p.replace(", 4x4", "").replace("kW", "").trim().to_string());
        }

        row.price = card
            .select(&PRICE)
            .next()
            .map(|price| squash(&text_of(price).replace("Kč", "")));
        row
    }
}

impl Parser for AaaAutoParser {
    fn parse(&self, body: &str) -> Result<PageParse, ParseError> {
        let document = Html::parse_document(body);

        if document.select(&PAGINATION).next().is_none() {
            return match document.select(&NO_RESULTS).next() {
                Some(notice) => {
                    info!(notice = %text_of(notice), "AAA Auto reports no more results");
                    Ok(PageParse::EndOfResults)
                }
                None => Err(ParseError::UnrecognizedPage),
            };
        }

        let mut batch = RawBatch::new();
        for card in document.select(&CARD) {
            Self::card(card).push_into(&mut batch, self.today);
        }
        debug!(rows = batch.len(), "Parsed AAA Auto page");
        Ok(PageParse::Batch(batch))
    }
}
