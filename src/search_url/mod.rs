//! Search URL construction for saved searches
//!
//! This module maps a saved search's structured criteria (or its verbatim
//! custom URL) onto a crawlable search URL for one site family, and injects
//! the page-number parameter used for pagination.
//!
//! Construction is deterministic: the same criteria always produce the same
//! URL, with query parameters in a fixed order.

mod centris;
mod realtor;

use crate::state::{PropertyType, SourceFamily};
use crate::{SearchUrlError, SearchUrlResult};
use serde::{Deserialize, Serialize};
use url::Url;

/// Structured search criteria stored on a saved search
///
/// Stored as camelCase JSON. Every field is optional; an empty criteria set
/// searches the family's default area.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchCriteria {
    pub regions: Vec<String>,
    pub municipalities: Vec<String>,
    pub price_min: Option<u64>,
    pub price_max: Option<u64>,
    pub bedrooms_min: Option<u32>,
    pub bedrooms_max: Option<u32>,
    pub bathrooms_min: Option<u32>,
    pub property_types: Vec<PropertyType>,
    pub year_built_min: Option<u32>,
    pub year_built_max: Option<u32>,
    pub lot_size_min_sqft: Option<u64>,
    pub living_area_min_sqft: Option<u64>,
}

impl SearchCriteria {
    /// Rejects inverted ranges
    pub fn validate(&self) -> SearchUrlResult<()> {
        check_range("price", self.price_min, self.price_max)?;
        check_range("bedrooms", self.bedrooms_min, self.bedrooms_max)?;
        check_range("year built", self.year_built_min, self.year_built_max)?;
        Ok(())
    }
}

fn check_range<T: PartialOrd + std::fmt::Display>(
    name: &str,
    min: Option<T>,
    max: Option<T>,
) -> SearchUrlResult<()> {
    match (min, max) {
        (Some(min), Some(max)) if min > max => Err(SearchUrlError::InvalidCriteria(format!(
            "{} minimum {} is greater than maximum {}",
            name, min, max
        ))),
        _ => Ok(()),
    }
}

/// Builds the first-page search URL for a saved search
///
/// A custom URL, when present, overrides the criteria entirely.
///
/// # Arguments
///
/// * `family` - The site family the saved search targets
/// * `criteria` - Structured criteria, used when there is no custom URL
/// * `custom_url` - Verbatim search URL supplied by the user
///
/// # Returns
///
/// * `Ok(Url)` - The search URL
/// * `Err(SearchUrlError)` - Inverted criteria ranges, or a custom URL that is
///   malformed or belongs to another site
///
/// # Examples
///
/// ```
/// use listing_tracker::search_url::{build_search_url, SearchCriteria};
/// use listing_tracker::SourceFamily;
///
/// let criteria = SearchCriteria {
///     price_min: Some(300_000),
///     ..Default::default()
/// };
/// let url = build_search_url(SourceFamily::Realtor, &criteria, None).unwrap();
/// assert!(url.as_str().contains("PriceMin=300000"));
/// ```
pub fn build_search_url(
    family: SourceFamily,
    criteria: &SearchCriteria,
    custom_url: Option<&str>,
) -> SearchUrlResult<Url> {
    if let Some(custom) = custom_url.map(str::trim).filter(|u| !u.is_empty()) {
        return from_custom_url(family, custom);
    }

    criteria.validate()?;

    match family {
        SourceFamily::Realtor => realtor::build(criteria),
        SourceFamily::Centris => centris::build(criteria),
    }
}

/// Validates a user-supplied search URL against the family's domain
pub fn from_custom_url(family: SourceFamily, custom_url: &str) -> SearchUrlResult<Url> {
    let mut url = Url::parse(custom_url).map_err(|e| SearchUrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(SearchUrlError::Parse(format!(
            "unsupported scheme: {}",
            url.scheme()
        )));
    }

    let host = url.host_str().unwrap_or_default().to_lowercase();
    let domain = family.registrable_domain();
    let belongs = host == domain || host.ends_with(&format!(".{}", domain));
    if !belongs {
        return Err(SearchUrlError::ForeignDomain {
            url: custom_url.to_string(),
            expected: family.host().to_string(),
        });
    }

    if family == SourceFamily::Centris && !url.query_pairs().any(|(k, _)| k == "view") {
        url.query_pairs_mut().append_pair("view", "Thumbnail");
    }

    Ok(url)
}

/// Query key carrying the page number for a family
pub fn page_param(family: SourceFamily) -> &'static str {
    match family {
        SourceFamily::Realtor => "CurrentPage",
        SourceFamily::Centris => "page",
    }
}

/// Returns a copy of `url` pointing at page `page`
///
/// Any existing occurrence of the page key is replaced, so the key appears
/// exactly once. Other parameters keep their order.
pub fn with_page(url: &Url, family: SourceFamily, page: u32) -> Url {
    let key = page_param(family);
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != key)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut paged = url.clone();
    paged
        .query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair(key, &page.to_string());
    paged
}
