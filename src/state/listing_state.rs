/// Listing-level state definitions
///
/// This module defines the source families a listing can come from, the
/// lifecycle status of a listing, and the normalized property types.
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two listing-site families the tracker crawls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFamily {
    Realtor,
    Centris,
}

impl SourceFamily {
    /// Canonical host serving this family's pages
    pub fn host(&self) -> &'static str {
        match self {
            Self::Realtor => "www.realtor.ca",
            Self::Centris => "www.centris.ca",
        }
    }

    /// Registrable domain used to validate custom search URLs
    pub fn registrable_domain(&self) -> &'static str {
        match self {
            Self::Realtor => "realtor.ca",
            Self::Centris => "centris.ca",
        }
    }

    /// Origin (scheme + host) prefixed to relative links
    pub fn origin(&self) -> &'static str {
        match self {
            Self::Realtor => "https://www.realtor.ca",
            Self::Centris => "https://www.centris.ca",
        }
    }

    /// Name of the circuit breaker guarding this family
    pub fn service_name(&self) -> &'static str {
        self.to_db_string()
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Realtor => "realtor",
            Self::Centris => "centris",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "realtor" => Some(Self::Realtor),
            "centris" => Some(Self::Centris),
            _ => None,
        }
    }

    pub fn all() -> [Self; 2] {
        [Self::Realtor, Self::Centris]
    }
}

impl fmt::Display for SourceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Lifecycle status of a listing
///
/// Listings are never deleted; only the status changes once a listing exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListingStatus {
    Active,
    Delisted,
    Sold,
    Expired,
    Unknown,
}

impl ListingStatus {
    /// Returns true if the listing is currently on the market
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Delisted => "delisted",
            Self::Sold => "sold",
            Self::Expired => "expired",
            Self::Unknown => "unknown",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "delisted" => Some(Self::Delisted),
            "sold" => Some(Self::Sold),
            "expired" => Some(Self::Expired),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Active,
            Self::Delisted,
            Self::Sold,
            Self::Expired,
            Self::Unknown,
        ]
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Normalized property type shared by criteria and extracted details
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    Detached,
    SemiDetached,
    Townhouse,
    Condo,
    Duplex,
    Triplex,
    MultiFamily,
    Land,
    Farm,
    Other,
}

impl PropertyType {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Detached => "detached",
            Self::SemiDetached => "semi_detached",
            Self::Townhouse => "townhouse",
            Self::Condo => "condo",
            Self::Duplex => "duplex",
            Self::Triplex => "triplex",
            Self::MultiFamily => "multi_family",
            Self::Land => "land",
            Self::Farm => "farm",
            Self::Other => "other",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "detached" => Some(Self::Detached),
            "semi_detached" => Some(Self::SemiDetached),
            "townhouse" => Some(Self::Townhouse),
            "condo" => Some(Self::Condo),
            "duplex" => Some(Self::Duplex),
            "triplex" => Some(Self::Triplex),
            "multi_family" => Some(Self::MultiFamily),
            "land" => Some(Self::Land),
            "farm" => Some(Self::Farm),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    /// Normalizes free text found on a listing page
    ///
    /// Matching is keyword based and case-insensitive; French and English
    /// labels are both recognized.
    pub fn from_label(label: &str) -> Self {
        let lower = label.to_lowercase();

        if lower.contains("semi") || lower.contains("jumel") {
            Self::SemiDetached
        } else if lower.contains("town") || lower.contains("row") || lower.contains("en rangée")
        {
            Self::Townhouse
        } else if lower.contains("condo") || lower.contains("apartment") {
            Self::Condo
        } else if lower.contains("triplex") {
            Self::Triplex
        } else if lower.contains("duplex") {
            Self::Duplex
        } else if lower.contains("plex") || lower.contains("multi") {
            Self::MultiFamily
        } else if lower.contains("land") || lower.contains("lot") || lower.contains("terrain") {
            Self::Land
        } else if lower.contains("farm") || lower.contains("ferme") {
            Self::Farm
        } else if lower.contains("house")
            || lower.contains("single family")
            || lower.contains("detached")
            || lower.contains("bungalow")
            || lower.contains("maison")
        {
            Self::Detached
        } else {
            Self::Other
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
