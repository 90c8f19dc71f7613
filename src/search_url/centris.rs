use super::SearchCriteria;
use crate::state::PropertyType;
use crate::{SearchUrlError, SearchUrlResult};
use url::Url;

const BASE_URL: &str = "https://www.centris.ca/en";
const DEFAULT_REGION: &str = "montreal-region";

/// Path category for the first requested property type
fn category(property_type: Option<PropertyType>) -> &'static str {
    match property_type {
        Some(PropertyType::Detached)
        | Some(PropertyType::SemiDetached)
        | Some(PropertyType::Townhouse) => "houses",
        Some(PropertyType::Condo) => "condos",
        Some(PropertyType::Duplex) => "duplexes",
        Some(PropertyType::Triplex) => "triplexes",
        Some(PropertyType::MultiFamily) => "multiplexes",
        Some(PropertyType::Land) => "lots",
        Some(PropertyType::Farm) => "farms",
        Some(PropertyType::Other) | None => "properties",
    }
}

/// Region slug for a municipality or region name
fn region_slug(place: Option<&str>) -> &'static str {
    let Some(place) = place else {
        return DEFAULT_REGION;
    };
    let lower = place.to_lowercase();

    if lower.contains("montreal") || lower.contains("montréal") {
        "montreal-region"
    } else if lower.contains("quebec") || lower.contains("québec") {
        "quebec-city-area"
    } else if lower.contains("laval") {
        "laval"
    } else if lower.contains("longueuil") {
        "longueuil"
    } else {
        DEFAULT_REGION
    }
}

pub(super) fn build(criteria: &SearchCriteria) -> SearchUrlResult<Url> {
    let place = criteria
        .municipalities
        .first()
        .or_else(|| criteria.regions.first())
        .map(String::as_str);

    let base = format!(
        "{}/{}~for-sale~{}",
        BASE_URL,
        category(criteria.property_types.first().copied()),
        region_slug(place)
    );
    let mut url = Url::parse(&base).map_err(|e| SearchUrlError::Parse(e.to_string()))?;

    {
        let mut query = url.query_pairs_mut();
        query.append_pair("view", "Thumbnail");

        if let Some(min) = criteria.price_min {
            query.append_pair("priceMin", &min.to_string());
        }
        if let Some(max) = criteria.price_max {
            query.append_pair("priceMax", &max.to_string());
        }
        if let Some(beds) = criteria.bedrooms_min {
            query.append_pair("rooms", &format!("{}+", beds));
        }
        if let Some(baths) = criteria.bathrooms_min {
            query.append_pair("bathrooms", &format!("{}+", baths));
        }
        if let Some(min) = criteria.year_built_min {
            query.append_pair("yearBuiltMin", &min.to_string());
        }
        if let Some(max) = criteria.year_built_max {
            query.append_pair("yearBuiltMax", &max.to_string());
        }
        if let Some(lot) = criteria.lot_size_min_sqft {
            query.append_pair("lotSizeMin", &lot.to_string());
        }
        if let Some(living) = criteria.living_area_min_sqft {
            query.append_pair("livingAreaMin", &living.to_string());
        }

        query.append_pair("sort", "-datePost");
    }

    Ok(url)
}
