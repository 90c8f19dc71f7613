//! Storage module for persisting tracker data
//!
//! This module handles all database operations for the tracker, including:
//! - SQLite database initialization and schema management
//! - Listings, snapshots and saved-search memberships
//! - Scrape run tracking with structured errors
//! - Persisted evasion state (circuit breakers, fingerprint usage, proxy budget)

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{Store, StoreError, StoreResult};

use crate::extract::DetailRecord;
use crate::search_url::SearchCriteria;
use crate::state::{BreakerState, ListingStatus, RunStatus, RunType, ScrapeError, SourceFamily};
use crate::{SearchUrlError, SearchUrlResult, TrackerError};
use chrono::{DateTime, Utc};

use std::path::Path;

/// Initializes or opens a store database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStore)` - Successfully initialized store
/// * `Err(TrackerError)` - Failed to initialize store
pub fn open_store(path: &Path) -> Result<SqliteStore, TrackerError> {
    SqliteStore::new(path)
}

/// A listing as stored
#[derive(Debug, Clone)]
pub struct ListingRecord {
    pub id: i64,
    pub source: SourceFamily,
    pub natural_id: String,
    pub source_url: String,
    pub address: String,
    pub municipality: Option<String>,
    pub postal_code: Option<String>,
    pub original_price: Option<i64>,
    pub current_price: Option<i64>,
    pub price_change_count: u32,
    pub status: ListingStatus,
    pub property_type: Option<String>,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<i32>,
    pub year_built: Option<i32>,
    pub photo_count: Option<i32>,
    pub first_seen_at: String,
    pub last_seen_at: String,
    pub delisted_at: Option<String>,
    pub last_detail_scrape_at: Option<String>,
}

/// Everything needed to insert a listing seen for the first time
#[derive(Debug, Clone)]
pub struct NewListing {
    pub source: SourceFamily,
    pub natural_id: String,
    pub source_url: String,
    pub address: String,
    pub price: i64,
    /// Detail attributes, when the detail page could be fetched
    pub detail: Option<DetailRecord>,
    pub photo_count: Option<i32>,
    /// Opaque card payload kept for forward compatibility
    pub raw_data: serde_json::Value,
}

/// A point-in-time observation of a listing
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRecord {
    pub listing_id: i64,
    pub captured_at: String,
    pub price: Option<i64>,
    pub status: ListingStatus,
}

/// A saved search as stored by the CRUD layer
///
/// The criteria column is kept as written so one malformed row cannot hide
/// the other searches; it is decoded per search with [`SavedSearch::criteria`].
#[derive(Debug, Clone)]
pub struct SavedSearch {
    pub id: i64,
    pub name: String,
    pub source: SourceFamily,
    pub criteria_json: String,
    pub custom_url: Option<String>,
    pub is_active: bool,
}

impl SavedSearch {
    /// Decodes the stored criteria
    pub fn criteria(&self) -> SearchUrlResult<SearchCriteria> {
        serde_json::from_str(&self.criteria_json).map_err(|e| {
            SearchUrlError::InvalidCriteria(format!("saved search {}: {}", self.id, e))
        })
    }
}

/// Fields for inserting a saved search
#[derive(Debug, Clone)]
pub struct NewSavedSearch {
    pub name: String,
    pub source: SourceFamily,
    pub criteria: SearchCriteria,
    pub custom_url: Option<String>,
    pub is_active: bool,
}

/// Membership of a listing in a saved search
#[derive(Debug, Clone, PartialEq)]
pub struct MembershipRecord {
    pub listing_id: i64,
    pub search_id: i64,
    pub first_matched_at: String,
    pub is_active: bool,
}

/// An active membership joined with the listing fields reconciliation needs
#[derive(Debug, Clone)]
pub struct ActiveMember {
    pub listing_id: i64,
    pub natural_id: String,
    pub status: ListingStatus,
    pub current_price: Option<i64>,
}

/// Represents a scrape run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub run_type: RunType,
    pub status: RunStatus,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub config_hash: String,
    pub searches_processed: u32,
    pub listings_found: u32,
    pub listings_new: u32,
    pub listings_updated: u32,
    pub listings_delisted: u32,
    pub errors: Vec<ScrapeError>,
}

/// Persisted circuit breaker state for one service
#[derive(Debug, Clone, PartialEq)]
pub struct BreakerRecord {
    pub state: BreakerState,
    pub failure_count: u32,
    pub success_count: u32,
    pub opened_at: Option<DateTime<Utc>>,
    pub last_failure_reason: Option<String>,
    pub last_checked_at: DateTime<Utc>,
}

impl BreakerRecord {
    /// A closed breaker with zeroed counters
    pub fn closed(now: DateTime<Utc>) -> Self {
        Self {
            state: BreakerState::Closed,
            failure_count: 0,
            success_count: 0,
            opened_at: None,
            last_failure_reason: None,
            last_checked_at: now,
        }
    }
}

/// Usage history of one fingerprint bundle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FingerprintUsage {
    pub use_count: u32,
    pub success_count: u32,
    pub failure_count: u32,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl FingerprintUsage {
    /// Fraction of recorded uses that succeeded, if any use was recorded
    pub fn success_rate(&self) -> Option<f64> {
        let total = self.success_count + self.failure_count;
        if total == 0 {
            None
        } else {
            Some(self.success_count as f64 / total as f64)
        }
    }
}

/// The singleton proxy bandwidth record
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyBudgetRecord {
    pub monthly_usage_gb: f64,
    pub last_reset_at: DateTime<Utc>,
}

/// Parses an RFC 3339 column value
pub(crate) fn parse_timestamp(
    column: &'static str,
    value: &str,
) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StoreError::InvalidValue {
            column,
            value: value.to_string(),
        })
}
