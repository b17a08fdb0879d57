//! TipCars results page parser.
//!
//! Each listing is an `a.w-100.float-l` block whose `h2` holds brand and
//! model, followed by data boxes for year, mileage, power, displacement and
//! fuel. While more pages exist the page shows a right-arrow icon
//! (`i.icon-doprava`); its absence means the run is over.

use super::{squash, text_of, ListingRow, PageParse, Parser};
use crate::error::ParseError;
use crate::models::RawBatch;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

const BASE_URL: &str = "https://www.tipcars.com";

static LISTING: Lazy<Selector> = Lazy::new(|| Selector::parse("a.w-100.float-l").unwrap());
static NEXT_PAGE: Lazy<Selector> = Lazy::new(|| Selector::parse("i.icon-doprava").unwrap());
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("h2").unwrap());
static DATA_BOX: Lazy<Selector> = Lazy::new(|| Selector::parse("div.boxiky_s_udaji").unwrap());
static PRICE: Lazy<Selector> = Lazy::new(|| Selector::parse("div.fs-22px").unwrap());
static MILEAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*([\d\s]+?)\s*(tkm|km)\s*$").unwrap());

#[derive(Debug, Clone)]
pub struct TipCarsParser {
    today: NaiveDate,
}

/// `85 tkm` is thousands of kilometres; `85 000 km` is kilometres.
fn mileage(raw: &str) -> String {
    match MILEAGE.captures(raw) {
        Some(caps) if &caps[2] == "tkm" => format!("{}000", squash(&caps[1])),
        Some(caps) => squash(&caps[1]),
        None => raw.trim().to_string(),
    }
}

impl TipCarsParser {
    /// Creates a parser stamping rows with `today`.
    pub fn new(today: NaiveDate) -> Self {
        Self { today }
    }

    fn listing(listing: ElementRef<'_>) -> ListingRow {
        let mut row = ListingRow::default();

        if let Some(title) = listing.select(&TITLE).next() {
            let title = text_of(title);
            let words: Vec<&str> = title.split_whitespace().collect();
            if words.len() >= 2 {
                row.brand = Some(words[0].to_string());
                row.model = Some(words[1..].join(" "));
            }
        }

        let boxes: Vec<String> = listing.select(&DATA_BOX).map(text_of).collect();
        row.year = boxes.first().cloned();
        row.mileage = boxes.get(1).map(|km| mileage(km));
        row.power = boxes.get(2).map(|p| p.replace("kW", "").trim().to_string());
        row.displacement = boxes.get(3).cloned();
        row.fuel = boxes.get(4).cloned();

        row.price = listing
            .select(&PRICE)
            .next()
            .map(|p| squash(&text_of(p).replace("Kč", "")));
        row.url = listing
            .value()
            .attr("href")
            .map(|href| format!("{BASE_URL}{href}"));
        row
    }
}

impl Parser for TipCarsParser {
    fn parse(&self, body: &str) -> Result<PageParse, ParseError> {
        let document = Html::parse_document(body);
        if document.select(&NEXT_PAGE).next().is_none() {
            return Ok(PageParse::EndOfResults);
        }

        let mut batch = RawBatch::new();
        for listing in document.select(&LISTING) {
            Self::listing(listing).push_into(&mut batch, self.today);
        }
        debug!(rows = batch.len(), "Parsed TipCars page");
        Ok(PageParse::Batch(batch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <div>
          <a class="w-100 float-l" href="/ford-focus/12345.html">
            <h2 class="fs-20px lh-19 fs-tucne">Ford Focus Kombi</h2>
            <div class="w-100 boxiky_s_udaji">2018</div>
            <div class="w-100 boxiky_s_udaji">152 tkm</div>
            <div class="w-100 boxiky_s_udaji">85 kW</div>
            <div class="w-100 boxiky_s_udaji">1 499 ccm</div>
            <div class="w-100 boxiky_s_udaji">benzín</div>
            <div class="fs-22px lh-19 fs-tucne mb-5">219&nbsp;000 Kč</div>
          </a>
          <a class="w-100 float-l" href="/tatra/1.html"><h2>Tatra</h2></a>
          <i class="icon-doprava"></i>
        </div>
    "#;

    fn parser() -> TipCarsParser {
        TipCarsParser::new(NaiveDate::from_ymd_opt(2024, 5, 6).unwrap())
    }

    #[test]
    fn test_parses_listing() {
        let PageParse::Batch(batch) = parser().parse(PAGE).unwrap() else {
            panic!("expected a batch");
        };
        let records = batch.into_records().unwrap();
        assert_eq!(records.len(), 2);
        let car = &records[0];
        assert_eq!(car.brand.as_deref(), Some("Ford"));
        assert_eq!(car.model.as_deref(), Some("Focus Kombi"));
        assert_eq!(car.year.as_deref(), Some("2018"));
        assert_eq!(car.mileage.as_deref(), Some("152000"));
        assert_eq!(car.power.as_deref(), Some("85"));
        assert_eq!(car.displacement.as_deref(), Some("1 499 ccm"));
        assert_eq!(car.fuel.as_deref(), Some("benzín"));
        assert_eq!(car.transmission, None);
        assert_eq!(car.price.as_deref(), Some("219000"));
        assert_eq!(car.url, "https://www.tipcars.com/ford-focus/12345.html");

        assert_eq!(records[1].brand, None);
        assert_eq!(records[1].url, "https://www.tipcars.com/tatra/1.html");
    }

    #[test]
    fn test_missing_next_arrow_ends_run() {
        assert_eq!(
            parser().parse("<html><body></body></html>").unwrap(),
            PageParse::EndOfResults
        );
    }

    #[test]
    fn test_mileage_units() {
        assert_eq!(mileage("152 tkm"), "152000");
        assert_eq!(mileage("85 000 km"), "85000");
        assert_eq!(mileage("n/a"), "n/a");
    }
}
