use super::SearchCriteria;
use crate::state::PropertyType;
use crate::{SearchUrlError, SearchUrlResult};
use url::Url;

/// List view of the greater Montreal area
const BASE_URL: &str = "https://www.realtor.ca/qc/greater-montreal/real-estate";

const RECORDS_PER_PAGE: &str = "50";

/// realtor.ca property-type group codes
fn type_code(property_type: PropertyType) -> &'static str {
    match property_type {
        PropertyType::Detached | PropertyType::Other => "1",
        PropertyType::SemiDetached => "2",
        PropertyType::Townhouse => "3",
        PropertyType::Duplex => "4",
        PropertyType::Triplex => "5",
        PropertyType::MultiFamily => "6",
        PropertyType::Farm => "8",
        PropertyType::Condo => "9",
        PropertyType::Land => "0",
    }
}

/// `min-max` range where `0` means unbounded
fn range(min: Option<impl ToString>, max: Option<impl ToString>) -> Option<String> {
    if min.is_none() && max.is_none() {
        return None;
    }
    let min = min.map(|v| v.to_string()).unwrap_or_else(|| "0".to_string());
    let max = max.map(|v| v.to_string()).unwrap_or_else(|| "0".to_string());
    Some(format!("{}-{}", min, max))
}

pub(super) fn build(criteria: &SearchCriteria) -> SearchUrlResult<Url> {
    let mut url = Url::parse(BASE_URL).map_err(|e| SearchUrlError::Parse(e.to_string()))?;

    let mut codes: Vec<&str> = Vec::new();
    for code in criteria.property_types.iter().copied().map(type_code) {
        if !codes.contains(&code) {
            codes.push(code);
        }
    }

    {
        let mut query = url.query_pairs_mut();
        query.append_pair("TransactionTypeId", "2");

        if let Some(min) = criteria.price_min {
            query.append_pair("PriceMin", &min.to_string());
        }
        if let Some(max) = criteria.price_max {
            query.append_pair("PriceMax", &max.to_string());
        }
        if let Some(beds) = range(criteria.bedrooms_min, criteria.bedrooms_max) {
            query.append_pair("BedRange", &beds);
        }
        if let Some(baths) = range(criteria.bathrooms_min, None::<u32>) {
            query.append_pair("BathRange", &baths);
        }
        if !codes.is_empty() {
            query.append_pair("PropertyTypeGroupID", &codes.join(","));
        }
        if let Some(min) = criteria.year_built_min {
            query.append_pair("BuildingAgeMin", &min.to_string());
        }
        if let Some(max) = criteria.year_built_max {
            query.append_pair("BuildingAgeMax", &max.to_string());
        }
        if let Some(lot) = range(criteria.lot_size_min_sqft, None::<u64>) {
            query.append_pair("LandSizeRange", &lot);
        }
        if let Some(living) = range(criteria.living_area_min_sqft, None::<u64>) {
            query.append_pair("BuildingSizeRange", &living);
        }

        query.append_pair("Sort", "1-D");
        query.append_pair("RecordsPerPage", RECORDS_PER_PAGE);
    }

    Ok(url)
}
