//! Field extraction from rendered listing pages
//!
//! This module turns page HTML into listing records:
//! - Search result pages into `RawListing`s (one per card)
//! - Listing pages into a `DetailRecord`
//!
//! Extraction is pure and never touches the store. Each site family has its
//! own `Extractor`, built from ordered locator chains so that markup drift
//! degrades gracefully. One malformed card never aborts the rest of the page.

mod block;
mod centris;
mod detail;
mod identifier;
mod locator;
mod numeric;
mod realtor;

pub use block::{BlockCheck, BlockDetector};
pub use centris::CentrisExtractor;
pub use identifier::{resolve_natural_id, url_hash_id, IdSource, MAX_ID_LEN};
pub use locator::{collapse_whitespace, first_match, Locator};
pub use numeric::{parse_area_sqft, parse_decimal, parse_integer, parse_price};
pub use realtor::RealtorExtractor;

use crate::state::{PropertyType, SourceFamily};
use scraper::Html;
use serde::Serialize;

/// Minimum viable record extracted from one search result card
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawListing {
    pub natural_id: String,
    pub detail_url: String,
    pub address: String,
    pub price: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bedrooms: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bathrooms: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_count: Option<i32>,
}

/// Full, best-effort attribute set read from a listing page
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetailRecord {
    pub municipality: Option<String>,
    pub postal_code: Option<String>,
    pub property_type: Option<PropertyType>,
    pub year_built: Option<i32>,
    pub lot_size_sqft: Option<i64>,
    pub living_area_sqft: Option<i64>,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<i32>,
    pub bathrooms_half: Option<i32>,
    pub stories: Option<f64>,
    pub has_garage: bool,
    pub has_basement: bool,
    pub has_pool: bool,
    pub has_ac: bool,
    pub has_fireplace: bool,
    pub heating_type: Option<String>,
    pub description: Option<String>,
    pub photo_urls: Vec<String>,
    pub broker_name: Option<String>,
    pub broker_agency: Option<String>,
    pub days_on_market: Option<i64>,
}

/// Outcome of parsing one search result page
#[derive(Debug, Clone, Default)]
pub struct SearchExtraction {
    pub listings: Vec<RawListing>,
    /// Number of card elements found on the page
    pub cards_seen: usize,
    /// Cards skipped because a required field was missing
    pub cards_failed: usize,
}

impl SearchExtraction {
    /// True when the page had no cards at all (end of pagination or a block page)
    pub fn is_empty_page(&self) -> bool {
        self.cards_seen == 0
    }
}

/// Per-family page parser
pub trait Extractor: Send + Sync {
    fn family(&self) -> SourceFamily;

    /// Parses every listing card on a search result page
    fn extract_search_results(&self, html: &str) -> SearchExtraction;

    /// Parses a single listing page
    fn extract_detail(&self, html: &str) -> DetailRecord;
}

/// Returns the extractor for a site family
pub fn extractor_for(family: SourceFamily) -> Box<dyn Extractor> {
    match family {
        SourceFamily::Realtor => Box::new(RealtorExtractor),
        SourceFamily::Centris => Box::new(CentrisExtractor),
    }
}

/// Makes a possibly-relative link absolute against the family origin
pub(crate) fn absolutize(family: SourceFamily, href: &str) -> String {
    let href = href.trim();
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else if href.starts_with('/') {
        format!("{}{}", family.origin(), href)
    } else {
        format!("{}/{}", family.origin(), href)
    }
}

/// Parses a document and runs `f` over its root element
pub(crate) fn with_document<T>(html: &str, f: impl FnOnce(scraper::ElementRef<'_>) -> T) -> T {
    let document = Html::parse_document(html);
    f(document.root_element())
}
