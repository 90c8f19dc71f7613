//! Natural-id resolution for listing cards
//!
//! Every card that has a detail link yields a non-empty, stable identifier:
//! 1. a 6+ digit number inside a dedicated identifier element
//! 2. a 6+ digit run in the detail URL
//! 3. an `MLS#`-prefixed number, then any standalone 6+ digit number, in the card text
//! 4. a hash of the detail URL, prefixed with `URL`

use crate::extract::locator::{element_text, first_match, Locator};
use regex::Regex;
use scraper::ElementRef;
use sha2::{Digest, Sha256};
use std::sync::LazyLock;

/// Maximum stored identifier length
pub const MAX_ID_LEN: usize = 50;

static SIX_DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d{6,}").unwrap());
static MLS_PREFIXED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)MLS[®#\s:]*(\d{6,})").unwrap());
static STANDALONE_SIX_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{6,})\b").unwrap());

/// Which step of the cascade produced an identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdSource {
    Locator,
    DetailUrl,
    CardText,
    UrlHash,
}

/// Resolves the identifier of a card through the fallback cascade
pub fn resolve_natural_id(
    card: ElementRef<'_>,
    id_locators: &[Locator],
    detail_url: &str,
) -> (String, IdSource) {
    let (id, source) = if let Some(id) = first_match(card, id_locators)
        .and_then(|value| SIX_DIGITS.find(&value).map(|m| m.as_str().to_string()))
    {
        (id, IdSource::Locator)
    } else if let Some(m) = SIX_DIGITS.find(detail_url) {
        (m.as_str().to_string(), IdSource::DetailUrl)
    } else if let Some(id) = id_from_text(&element_text(card)) {
        (id, IdSource::CardText)
    } else {
        (url_hash_id(detail_url), IdSource::UrlHash)
    };

    (crate::extract::locator::truncate_chars(&id, MAX_ID_LEN), source)
}

/// Finds an identifier in free text
fn id_from_text(text: &str) -> Option<String> {
    MLS_PREFIXED
        .captures(text)
        .or_else(|| STANDALONE_SIX_DIGITS.captures(text))
        .map(|caps| caps[1].to_string())
}

/// Deterministic identifier of last resort
pub fn url_hash_id(detail_url: &str) -> String {
    let digest = Sha256::digest(detail_url.as_bytes());
    format!("URL{}", &hex::encode(digest)[..16])
}
