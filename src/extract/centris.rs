//! centris.ca page extraction
//!
//! Centris publishes schema.org markup, so most fields come from `itemprop`
//! attributes rather than layout classes. Detail characteristics are laid out
//! as title/value pairs inside `.carac-container` blocks, labelled in either
//! French or English.

use crate::extract::detail::{apply_amenities, municipality, postal_code};
use crate::extract::locator::{
    element_text, first_match, first_parsed, select_all, select_first, truncate_chars, Locator,
};
use crate::extract::{
    absolutize, parse_area_sqft, parse_integer, parse_price, with_document, DetailRecord,
    Extractor, RawListing, SearchExtraction,
};
use crate::state::{PropertyType, SourceFamily};
use scraper::ElementRef;

const MAX_ADDRESS_LEN: usize = 500;
const MAX_PHOTOS: usize = 50;

const CARD_SELECTOR: &str = ".property-thumbnail-item";

const CARD_ID: &[Locator] = &[Locator::Attr("[itemprop=\"sku\"]", "content")];

const CARD_PRICE: &[Locator] = &[
    Locator::Attr("[itemprop=\"price\"]", "content"),
    Locator::Text(".price span"),
];

const CARD_LINK: &[Locator] = &[
    Locator::Attr(".property-thumbnail-summary-link", "href"),
    Locator::Attr(".a-more-detail", "href"),
];

const DETAIL_ADDRESS: &[Locator] = &[
    Locator::Text("[itemprop=\"address\"]"),
    Locator::Text(".address"),
];

const DETAIL_CATEGORY: &[Locator] = &[
    Locator::Text("[itemprop=\"category\"]"),
    Locator::Text("[data-id=\"PageTitle\"]"),
];

const DETAIL_DESCRIPTION: &[Locator] = &[Locator::Text("[itemprop=\"description\"]")];

const DETAIL_BROKER: &[Locator] = &[
    Locator::Text(".broker-info__broker-title"),
    Locator::Text(".broker-info .name"),
];

const DETAIL_AGENCY: &[Locator] = &[
    Locator::Text(".broker-info__agency-name"),
    Locator::Text(".broker-info .agency"),
];

const PHOTO_SELECTORS: &[&str] = &["[itemprop=\"image\"]", "#photoViewerCarousel img"];

/// Characteristic labels, French and English, lowercase
const YEAR_LABELS: &[&str] = &["year built", "année de construction"];
const LOT_LABELS: &[&str] = &["lot area", "superficie du terrain"];
const LIVING_LABELS: &[&str] = &[
    "net area",
    "living area",
    "superficie nette",
    "superficie habitable",
];
const HEATING_LABELS: &[&str] = &["heating system", "heating energy", "mode de chauffage"];
const STOREY_LABELS: &[&str] = &["number of storeys", "nombre d'étages"];

fn to_i32(value: i64) -> Option<i32> {
    i32::try_from(value).ok()
}

/// Reads the value of the first characteristic whose title matches a label
fn characteristic(root: ElementRef<'_>, labels: &[&str]) -> Option<String> {
    select_all(root, ".carac-container").into_iter().find_map(|block| {
        let title = select_first(block, ".carac-title").map(element_text)?;
        let title = title.to_lowercase();
        if !labels.iter().any(|label| title.contains(label)) {
            return None;
        }
        select_first(block, ".carac-value")
            .map(element_text)
            .filter(|value| !value.is_empty())
    })
}

fn parse_card(card: ElementRef<'_>) -> Result<RawListing, &'static str> {
    let natural_id = first_match(card, CARD_ID).ok_or("no Centris number")?;
    let href = first_match(card, CARD_LINK).ok_or("no detail link")?;
    let price = first_parsed(card, CARD_PRICE, parse_price).ok_or("no price")?;

    let address = select_first(card, ".address")
        .map(element_text)
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| "Unknown".to_string());

    let category = select_first(card, "[itemprop=\"category\"]")
        .map(element_text)
        .filter(|c| !c.is_empty());

    let count = |css: &str| {
        select_first(card, css)
            .map(element_text)
            .and_then(|text| parse_integer(&text))
            .and_then(to_i32)
    };

    Ok(RawListing {
        natural_id: truncate_chars(&natural_id, crate::extract::MAX_ID_LEN),
        detail_url: absolutize(SourceFamily::Centris, &href),
        address: truncate_chars(&address, MAX_ADDRESS_LEN),
        price,
        category,
        bedrooms: count(".cac"),
        bathrooms: count(".sdb"),
        photo_count: count(".photo-btn"),
    })
}

/// Extractor for centris.ca thumbnail-view pages and listing pages
#[derive(Debug, Clone, Copy, Default)]
pub struct CentrisExtractor;

impl Extractor for CentrisExtractor {
    fn family(&self) -> SourceFamily {
        SourceFamily::Centris
    }

    fn extract_search_results(&self, html: &str) -> SearchExtraction {
        with_document(html, |root| {
            let cards = select_all(root, CARD_SELECTOR);
            let mut extraction = SearchExtraction {
                cards_seen: cards.len(),
                ..Default::default()
            };

            for (i, card) in cards.into_iter().enumerate() {
                match parse_card(card) {
                    Ok(listing) => extraction.listings.push(listing),
                    Err(reason) => {
                        tracing::warn!("Centris card {}: {}", i + 1, reason);
                        extraction.cards_failed += 1;
                    }
                }
            }

            tracing::debug!(
                "Centris page parsed: {} ok, {} failed",
                extraction.listings.len(),
                extraction.cards_failed
            );
            extraction
        })
    }

    fn extract_detail(&self, html: &str) -> DetailRecord {
        with_document(html, |root| {
            let mut detail = DetailRecord::default();

            if let Some(address) = first_match(root, DETAIL_ADDRESS) {
                detail.postal_code = postal_code(&address);
                detail.municipality = municipality(&address)
                    .or_else(|| address.rsplit(',').next().map(|s| s.trim().to_string()))
                    .filter(|m| !m.is_empty() && !m.starts_with(|c: char| c.is_ascii_digit()));
            }

            detail.property_type =
                first_match(root, DETAIL_CATEGORY).map(|c| PropertyType::from_label(&c));
            detail.year_built = characteristic(root, YEAR_LABELS)
                .and_then(|v| parse_integer(&v))
                .and_then(to_i32);
            detail.lot_size_sqft =
                characteristic(root, LOT_LABELS).and_then(|v| parse_area_sqft(&v));
            detail.living_area_sqft =
                characteristic(root, LIVING_LABELS).and_then(|v| parse_area_sqft(&v));
            detail.heating_type = characteristic(root, HEATING_LABELS);
            detail.stories = characteristic(root, STOREY_LABELS)
                .and_then(|v| crate::extract::parse_decimal(&v));

            detail.bedrooms = select_first(root, ".cac")
                .and_then(|el| parse_integer(&element_text(el)))
                .and_then(to_i32);
            detail.bathrooms = select_first(root, ".sdb")
                .and_then(|el| parse_integer(&element_text(el)))
                .and_then(to_i32);

            detail.description = first_match(root, DETAIL_DESCRIPTION);
            detail.broker_name = first_match(root, DETAIL_BROKER);
            detail.broker_agency = first_match(root, DETAIL_AGENCY);
            detail.photo_urls = photo_urls(root);

            let body = select_first(root, "body").map(element_text).unwrap_or_default();
            apply_amenities(&body, &mut detail);

            detail
        })
    }
}

fn photo_urls(root: ElementRef<'_>) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for css in PHOTO_SELECTORS {
        for img in select_all(root, css) {
            let src = img
                .value()
                .attr("content")
                .or_else(|| img.value().attr("src"))
                .map(str::trim)
                .unwrap_or_default();
            if !src.is_empty() && !urls.iter().any(|u| u == src) {
                urls.push(src.to_string());
            }
            if urls.len() >= MAX_PHOTOS {
                return urls;
            }
        }
    }
    urls
}
