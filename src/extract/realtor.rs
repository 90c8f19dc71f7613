//! realtor.ca page extraction

use crate::extract::detail::{apply_amenities, days_on_market, municipality, postal_code};
use crate::extract::identifier::resolve_natural_id;
use crate::extract::locator::{
    element_text, first_match, first_parsed, select_all, select_first, truncate_chars, Locator,
};
use crate::extract::{
    absolutize, parse_area_sqft, parse_decimal, parse_integer, parse_price, with_document,
    DetailRecord, Extractor, RawListing, SearchExtraction,
};
use crate::state::{PropertyType, SourceFamily};
use regex::Regex;
use scraper::ElementRef;
use std::sync::LazyLock;

const MAX_ADDRESS_LEN: usize = 500;
const MAX_PHOTOS: usize = 50;

/// Card containers, most specific first. The first selector that yields any
/// element decides the card set for the whole page.
const CARD_SELECTORS: &[&str] = &[
    "div.listingCard",
    "li.cardCon",
    "[data-testid*=\"listing-card\"]",
    "[data-testid*=\"listing\"]",
    "[data-listing-id]",
    "article[class*=\"listing\"]",
    "article[class*=\"card\"]",
    "[class*=\"ListingCard\"]",
    "[class*=\"PropertyCard\"]",
    "article",
    "[role=\"article\"]",
];

const CARD_PRICE: &[Locator] = &[
    Locator::Text("[data-testid*=\"price\"]"),
    Locator::Attr("[data-price]", "data-price"),
    Locator::Text("[class*=\"Price\"]"),
    Locator::Text("[class*=\"price\"]"),
    Locator::Attr("[itemprop=\"price\"]", "content"),
    Locator::Text("[itemprop=\"price\"]"),
];

const CARD_ADDRESS: &[Locator] = &[
    Locator::Text("[data-testid*=\"address\"]"),
    Locator::Text("[data-testid*=\"location\"]"),
    Locator::Text("[itemprop=\"address\"]"),
    Locator::Text("[class*=\"Address\"]"),
    Locator::Text("[class*=\"address\"]"),
    Locator::Text("[class*=\"Location\"]"),
    Locator::Text("[class*=\"location\"]"),
];

const CARD_BEDS: &[Locator] = &[
    Locator::Text("[data-testid*=\"bed\"]"),
    Locator::Text("[class*=\"Bed\"]"),
    Locator::Text("[class*=\"bed\"]"),
];

const CARD_BATHS: &[Locator] = &[
    Locator::Text("[data-testid*=\"bath\"]"),
    Locator::Text("[class*=\"Bath\"]"),
    Locator::Text("[class*=\"bath\"]"),
];

const CARD_ID: &[Locator] = &[
    Locator::Attr("[data-mls-number]", "data-mls-number"),
    Locator::Text("[data-mls-number]"),
    Locator::Attr("[data-listing-id]", "data-listing-id"),
    Locator::Text("[data-testid*=\"mls\"]"),
    Locator::Text("[class*=\"MLS\"]"),
    Locator::Text("[class*=\"mls\"]"),
];

const CARD_LINK: &[Locator] = &[
    Locator::Attr("a[href*=\"/real-estate/\"]", "href"),
    Locator::Attr("a[href*=\"/property/\"]", "href"),
    Locator::Attr("a[href*=\"/listing/\"]", "href"),
    Locator::Attr("a[data-testid*=\"listing-link\"]", "href"),
    Locator::Attr("a[class*=\"listing\"]", "href"),
    Locator::Custom(any_property_link),
    Locator::Custom(own_href),
];

const DETAIL_ADDRESS: &[Locator] = &[
    Locator::Text("[data-testid=\"address\"]"),
    Locator::Text("[data-testid*=\"address\"]"),
    Locator::Text("[itemprop=\"address\"]"),
    Locator::Text("address"),
    Locator::Text("[class*=\"Address\"]"),
    Locator::Text("[class*=\"property-address\"]"),
    Locator::Text("[class*=\"address\"]"),
];

const DETAIL_YEAR: &[Locator] = &[
    Locator::Text("[data-testid*=\"year\"]"),
    Locator::Text("[class*=\"YearBuilt\"]"),
    Locator::Text("[class*=\"year-built\"]"),
    Locator::Text("[class*=\"year\"]"),
];

const DETAIL_LOT: &[Locator] = &[
    Locator::Text("[data-testid*=\"lot\"]"),
    Locator::Text("[class*=\"LotSize\"]"),
    Locator::Text("[class*=\"lot-size\"]"),
    Locator::Text("[class*=\"lot\"]"),
];

const DETAIL_LIVING: &[Locator] = &[
    Locator::Text("[data-testid*=\"living\"]"),
    Locator::Text("[data-testid*=\"sqft\"]"),
    Locator::Text("[class*=\"LivingArea\"]"),
    Locator::Text("[class*=\"living-area\"]"),
    Locator::Text("[class*=\"square-feet\"]"),
];

const DETAIL_BEDS: &[Locator] = &[
    Locator::Text("[data-testid*=\"bed\"]"),
    Locator::Text("[class*=\"Bedroom\"]"),
    Locator::Text("[class*=\"bedroom\"]"),
    Locator::Text("[class*=\"bed\"]"),
];

const DETAIL_BATHS: &[Locator] = &[
    Locator::Text("[data-testid*=\"bath\"]"),
    Locator::Text("[class*=\"Bathroom\"]"),
    Locator::Text("[class*=\"bathroom\"]"),
    Locator::Text("[class*=\"bath\"]"),
];

const DETAIL_HALF_BATHS: &[Locator] = &[
    Locator::Text("[data-testid*=\"half-bath\"]"),
    Locator::Text("[class*=\"HalfBath\"]"),
    Locator::Text("[class*=\"half-bath\"]"),
];

const DETAIL_STORIES: &[Locator] = &[
    Locator::Text("[data-testid*=\"stor\"]"),
    Locator::Text("[class*=\"Stories\"]"),
    Locator::Text("[class*=\"stories\"]"),
    Locator::Text("[class*=\"storey\"]"),
];

const DETAIL_TYPE: &[Locator] = &[
    Locator::Text("[data-testid*=\"type\"]"),
    Locator::Text("[class*=\"PropertyType\"]"),
    Locator::Text("[class*=\"property-type\"]"),
];

const DETAIL_HEATING: &[Locator] = &[
    Locator::Text("[data-testid*=\"heating\"]"),
    Locator::Text("[class*=\"HeatingType\"]"),
    Locator::Text("[class*=\"heating\"]"),
];

const DETAIL_DESCRIPTION: &[Locator] = &[
    Locator::Text("[data-testid=\"description\"]"),
    Locator::Text("[data-testid*=\"description\"]"),
    Locator::Text("[itemprop=\"description\"]"),
    Locator::Text("[class*=\"Description\"]"),
    Locator::Text("[class*=\"description\"]"),
];

const DETAIL_BROKER: &[Locator] = &[
    Locator::Text("[data-testid*=\"agent\"]"),
    Locator::Text("[data-testid*=\"broker\"]"),
    Locator::Text("[class*=\"AgentName\"]"),
    Locator::Text("[class*=\"agent-name\"]"),
    Locator::Text("[class*=\"realtor-name\"]"),
];

const DETAIL_AGENCY: &[Locator] = &[
    Locator::Text("[data-testid*=\"agency\"]"),
    Locator::Text("[data-testid*=\"brokerage\"]"),
    Locator::Text("[class*=\"Agency\"]"),
    Locator::Text("[class*=\"agency-name\"]"),
    Locator::Text("[class*=\"brokerage\"]"),
];

const PHOTO_SELECTORS: &[&str] = &[
    "[data-testid*=\"gallery\"] img",
    "[data-testid*=\"photo\"] img",
    "[class*=\"Gallery\"] img",
    "[class*=\"Carousel\"] img",
    "[class*=\"photo-gallery\"] img",
    "[class*=\"carousel\"] img",
    "img[src*=\"photo\"]",
    "img[src*=\"image\"]",
];

static PROPERTY_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)/real-estate/|/property|/listing|MLS|/map#|\d{6,}").unwrap()
});

/// Any anchor in the card whose target looks like a listing page
fn any_property_link(card: ElementRef<'_>) -> Option<String> {
    select_all(card, "a[href]")
        .into_iter()
        .filter_map(|a| a.value().attr("href"))
        .find(|href| PROPERTY_LINK.is_match(href))
        .map(str::to_string)
}

/// The card itself, when the whole card is a link
fn own_href(card: ElementRef<'_>) -> Option<String> {
    card.value().attr("href").map(str::to_string)
}

fn select_cards(root: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    for css in CARD_SELECTORS {
        let cards = select_all(root, css);
        if !cards.is_empty() {
            tracing::debug!("Matched {} realtor cards with {}", cards.len(), css);
            return cards;
        }
    }
    Vec::new()
}

fn to_i32(value: i64) -> Option<i32> {
    i32::try_from(value).ok()
}

/// Why a card was skipped
#[derive(Debug)]
enum CardSkip {
    NoLink,
    NoPrice(String),
}

fn parse_card(card: ElementRef<'_>) -> Result<RawListing, CardSkip> {
    let href = first_match(card, CARD_LINK).ok_or(CardSkip::NoLink)?;
    let detail_url = absolutize(SourceFamily::Realtor, &href);

    let price = first_parsed(card, CARD_PRICE, parse_price).ok_or_else(|| {
        CardSkip::NoPrice(first_match(card, CARD_PRICE).unwrap_or_default())
    })?;

    let address = first_match(card, CARD_ADDRESS).unwrap_or_else(|| "Unknown".to_string());
    let (natural_id, _) = resolve_natural_id(card, CARD_ID, &detail_url);

    Ok(RawListing {
        natural_id,
        detail_url,
        address: truncate_chars(&address, MAX_ADDRESS_LEN),
        price,
        category: None,
        bedrooms: first_parsed(card, CARD_BEDS, parse_integer).and_then(to_i32),
        bathrooms: first_parsed(card, CARD_BATHS, parse_integer).and_then(to_i32),
        photo_count: None,
    })
}

/// Extractor for realtor.ca list-view pages and listing pages
#[derive(Debug, Clone, Copy, Default)]
pub struct RealtorExtractor;

impl Extractor for RealtorExtractor {
    fn family(&self) -> SourceFamily {
        SourceFamily::Realtor
    }

    fn extract_search_results(&self, html: &str) -> SearchExtraction {
        with_document(html, |root| {
            let cards = select_cards(root);
            let mut extraction = SearchExtraction {
                cards_seen: cards.len(),
                ..Default::default()
            };

            for (i, card) in cards.into_iter().enumerate() {
                match parse_card(card) {
                    Ok(listing) => extraction.listings.push(listing),
                    Err(CardSkip::NoLink) => {
                        tracing::warn!("Realtor card {}: no detail link found", i + 1);
                        extraction.cards_failed += 1;
                    }
                    Err(CardSkip::NoPrice(text)) => {
                        tracing::warn!("Realtor card {}: no price found (text: {:?})", i + 1, text);
                        extraction.cards_failed += 1;
                    }
                }
            }

            tracing::debug!(
                "Realtor page parsed: {} ok, {} failed",
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
                detail.municipality = municipality(&address);
            }

            detail.year_built = first_parsed(root, DETAIL_YEAR, parse_integer)
                .and_then(to_i32)
                .filter(|year| (1600..=2100).contains(year));
            detail.lot_size_sqft = first_parsed(root, DETAIL_LOT, parse_area_sqft);
            detail.living_area_sqft = first_parsed(root, DETAIL_LIVING, parse_area_sqft);
            detail.bedrooms = first_parsed(root, DETAIL_BEDS, parse_integer).and_then(to_i32);
            detail.bathrooms = first_parsed(root, DETAIL_BATHS, parse_integer).and_then(to_i32);
            detail.bathrooms_half =
                first_parsed(root, DETAIL_HALF_BATHS, parse_integer).and_then(to_i32);
            detail.stories = first_parsed(root, DETAIL_STORIES, parse_decimal);
            detail.property_type = first_match(root, DETAIL_TYPE).map(|t| PropertyType::from_label(&t));
            detail.heating_type = first_match(root, DETAIL_HEATING);
            detail.description = first_match(root, DETAIL_DESCRIPTION);
            detail.broker_name = first_match(root, DETAIL_BROKER);
            detail.broker_agency = first_match(root, DETAIL_AGENCY);
            detail.photo_urls = photo_urls(root);

            let body = select_first(root, "body").map(element_text).unwrap_or_default();
            apply_amenities(&body, &mut detail);
            detail.days_on_market = days_on_market(&body);

            detail
        })
    }
}

fn photo_urls(root: ElementRef<'_>) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for css in PHOTO_SELECTORS {
        for img in select_all(root, css) {
            if urls.len() >= MAX_PHOTOS {
                return urls;
            }
            if let Some(src) = img.value().attr("src").map(str::trim) {
                if !src.is_empty() && !urls.iter().any(|u| u == src) {
                    urls.push(src.to_string());
                }
            }
        }
    }
    urls
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEARCH_PAGE: &str = r#"
        <html><body>
          <div class="listingCard">
            <a href="/real-estate/26543210/123-rue-principale-montreal">
              <div class="listingCardPrice">$450,000</div>
              <div class="listingCardAddress">123 Rue Principale, Montréal, QC H2X 1Y4</div>
              <div class="listingCardIconNum bedrooms">3</div>
            </a>
          </div>
          <div class="listingCard">
            <a href="https://www.realtor.ca/real-estate/26543211/45-av-des-pins">
              <div class="listingCardPrice">1 299 000 $</div>
            </a>
          </div>
          <div class="listingCard">
            <a href="/real-estate/26543212/no-price">
              <div class="listingCardPrice">Price on request</div>
            </a>
          </div>
          <div class="listingCard">
            <div class="listingCardPrice">$300,000</div>
          </div>
        </body></html>
    "#;

    #[test]
    fn test_search_results_parse_cards() {
        let extraction = RealtorExtractor.extract_search_results(SEARCH_PAGE);

        assert_eq!(extraction.cards_seen, 4);
        assert_eq!(extraction.cards_failed, 2);
        assert_eq!(extraction.listings.len(), 2);

        let first = &extraction.listings[0];
        assert_eq!(first.natural_id, "26543210");
        assert_eq!(first.price, 450_000);
        assert_eq!(
            first.detail_url,
            "https://www.realtor.ca/real-estate/26543210/123-rue-principale-montreal"
        );
        assert_eq!(first.address, "123 Rue Principale, Montréal, QC H2X 1Y4");
        assert_eq!(first.bedrooms, Some(3));

        let second = &extraction.listings[1];
        assert_eq!(second.natural_id, "26543211");
        assert_eq!(second.price, 1_299_000);
        assert_eq!(second.address, "Unknown");
    }

    #[test]
    fn test_fallback_card_selector() {
        let html = r#"
            <ul>
              <li class="cardCon">
                <span data-mls-number="27000001"></span>
                <a href="/listing/abc">See</a>
                <span class="price">$250,000</span>
              </li>
            </ul>
        "#;
        let extraction = RealtorExtractor.extract_search_results(html);
        assert_eq!(extraction.listings.len(), 1);
        assert_eq!(extraction.listings[0].natural_id, "27000001");
    }

    #[test]
    fn test_generic_link_with_digits() {
        let html = r#"
            <div class="listingCard">
              <a href="/help">Help</a>
              <a href="/fr/12345678/maison">Voir</a>
              <span class="price">$250,000</span>
            </div>
        "#;
        let extraction = RealtorExtractor.extract_search_results(html);
        assert_eq!(
            extraction.listings[0].detail_url,
            "https://www.realtor.ca/fr/12345678/maison"
        );
    }

    #[test]
    fn test_empty_page() {
        let extraction = RealtorExtractor.extract_search_results("<html><body><p>No results</p></body></html>");
        assert!(extraction.is_empty_page());
        assert!(extraction.listings.is_empty());
    }

    #[test]
    fn test_detail_page() {
        let html = r#"
            <html><body>
              <h1 data-testid="address">123 Rue Principale, Montréal, QC H2X 1Y4</h1>
              <div class="propertyDetailsYearBuilt">Built in 1985</div>
              <div class="propertyDetailsSectionContentValue bedrooms">4</div>
              <div class="propertyDetailsSectionContentValue bathrooms">2</div>
              <div data-testid="property-type">Single Family Detached</div>
              <div data-testid="description">Bright home with a double garage and central air.</div>
              <div data-testid="gallery">
                <img src="https://cdn.realtor.ca/photo1.jpg">
                <img src="https://cdn.realtor.ca/photo2.jpg">
                <img src="https://cdn.realtor.ca/photo1.jpg">
              </div>
              <div data-testid="agent-name">Jane Doe</div>
              <p>Time on REALTOR.ca: 2 weeks</p>
            </body></html>
        "#;

        let detail = RealtorExtractor.extract_detail(html);
        assert_eq!(detail.postal_code.as_deref(), Some("H2X 1Y4"));
        assert_eq!(detail.municipality.as_deref(), Some("Montréal"));
        assert_eq!(detail.year_built, Some(1985));
        assert_eq!(detail.bedrooms, Some(4));
        assert_eq!(detail.bathrooms, Some(2));
        assert_eq!(detail.property_type, Some(PropertyType::Detached));
        assert_eq!(detail.photo_urls.len(), 2);
        assert_eq!(detail.broker_name.as_deref(), Some("Jane Doe"));
        assert_eq!(detail.days_on_market, Some(14));
        assert!(detail.has_garage);
        assert!(detail.has_ac);
        assert!(!detail.has_pool);
    }

    #[test]
    fn test_detail_page_missing_fields() {
        let detail = RealtorExtractor.extract_detail("<html><body><p>Sparse</p></body></html>");
        assert_eq!(detail, DetailRecord::default());
    }
}
