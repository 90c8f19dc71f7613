//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::state::{ListingStatus, RunStats, RunStatus, RunType, ScrapeError, SourceFamily};
use crate::storage::{
    ActiveMember, BreakerRecord, FingerprintUsage, ListingRecord, MembershipRecord, NewListing,
    NewSavedSearch, ProxyBudgetRecord, RunRecord, SavedSearch, SnapshotRecord,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Listing not found: {0}")]
    ListingNotFound(i64),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Run {0} was already finalized")]
    RunAlreadyFinalized(i64),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid stored value in {column}: {value}")]
    InvalidValue { column: &'static str, value: String },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Trait for storage backend implementations
///
/// This trait defines every persistence operation the tracker needs. Listing
/// mutations are only issued by the reconciliation engine; evasion state
/// (breakers, fingerprint usage, proxy budget) is persisted here so it
/// survives restarts.
pub trait Store {
    /// Runs `f` inside a single transaction, rolling back if it fails
    fn atomically<T, F>(&mut self, f: F) -> StoreResult<T>
    where
        Self: Sized,
        F: FnOnce(&mut Self) -> StoreResult<T>;

    // ===== Run Management =====

    /// Creates a new `running` scrape run and returns its ID
    fn create_run(&mut self, run_type: RunType, config_hash: &str) -> StoreResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StoreResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StoreResult<Option<RunRecord>>;

    /// Gets the run currently marked `running`, if any
    fn find_running_run(&self) -> StoreResult<Option<i64>>;

    /// Writes the terminal status, counters and errors of a run
    ///
    /// Fails with `RunAlreadyFinalized` if the run is no longer `running`.
    fn finalize_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        stats: &RunStats,
        errors: &[ScrapeError],
    ) -> StoreResult<()>;

    // ===== Saved Searches =====

    /// Inserts a saved search (used by the CRUD layer and fixtures)
    fn insert_saved_search(&mut self, search: &NewSavedSearch) -> StoreResult<i64>;

    /// Lists active saved searches in insertion order
    fn active_saved_searches(&self) -> StoreResult<Vec<SavedSearch>>;

    // ===== Listings =====

    /// Looks up a listing by its source-scoped natural id
    fn find_listing(
        &self,
        source: SourceFamily,
        natural_id: &str,
    ) -> StoreResult<Option<ListingRecord>>;

    /// Gets a listing by ID
    fn get_listing(&self, listing_id: i64) -> StoreResult<ListingRecord>;

    /// Inserts a new active listing and returns its ID
    fn insert_listing(&mut self, listing: &NewListing, now: DateTime<Utc>) -> StoreResult<i64>;

    /// Records a re-observation of an existing listing
    ///
    /// Updates `last_seen_at` and `current_price`, forces the status back to
    /// active and clears `delisted_at`. Returns true if the price changed, in
    /// which case the price-change counter was incremented.
    fn record_sighting(
        &mut self,
        listing_id: i64,
        price: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Marks a listing delisted at `now`
    fn mark_delisted(&mut self, listing_id: i64, now: DateTime<Utc>) -> StoreResult<()>;

    /// Appends a snapshot row
    fn insert_snapshot(
        &mut self,
        listing_id: i64,
        price: Option<i64>,
        status: ListingStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Gets every snapshot of a listing, oldest first
    fn snapshots_for(&self, listing_id: i64) -> StoreResult<Vec<SnapshotRecord>>;

    /// Counts listings by status
    fn count_listings_by_status(&self) -> StoreResult<HashMap<ListingStatus, u64>>;

    // ===== Memberships =====

    /// Links a listing to a saved search, re-activating an existing link
    fn upsert_membership(
        &mut self,
        listing_id: i64,
        search_id: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Gets a single membership row
    fn get_membership(
        &self,
        listing_id: i64,
        search_id: i64,
    ) -> StoreResult<Option<MembershipRecord>>;

    /// Lists the active memberships of a saved search with their listing state
    fn active_members(&self, search_id: i64) -> StoreResult<Vec<ActiveMember>>;

    /// Marks a membership inactive without deleting it
    fn deactivate_membership(&mut self, listing_id: i64, search_id: i64) -> StoreResult<()>;

    // ===== Circuit Breakers =====

    fn load_breaker(&self, service: &str) -> StoreResult<Option<BreakerRecord>>;

    fn save_breaker(&mut self, service: &str, record: &BreakerRecord) -> StoreResult<()>;

    // ===== Fingerprint Usage =====

    fn load_fingerprint_usage(&self) -> StoreResult<HashMap<String, FingerprintUsage>>;

    fn save_fingerprint_usage(&mut self, id: &str, usage: &FingerprintUsage) -> StoreResult<()>;

    fn clear_fingerprint_usage(&mut self) -> StoreResult<()>;

    // ===== Proxy Budget =====

    fn load_proxy_budget(&self) -> StoreResult<Option<ProxyBudgetRecord>>;

    fn save_proxy_budget(&mut self, record: &ProxyBudgetRecord) -> StoreResult<()>;
}
