//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Store trait.

use crate::state::{
    BreakerState, ListingStatus, RunStats, RunStatus, RunType, ScrapeError, SourceFamily,
};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Store, StoreError, StoreResult};
use crate::storage::{
    parse_timestamp, ActiveMember, BreakerRecord, FingerprintUsage, ListingRecord,
    MembershipRecord, NewListing, NewSavedSearch, ProxyBudgetRecord, RunRecord, SavedSearch,
    SnapshotRecord,
};
use crate::TrackerError;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;

const LISTING_COLUMNS: &str = "id, source, natural_id, source_url, address, municipality,
     postal_code, original_price, current_price, price_change_count, status, property_type,
     bedrooms, bathrooms, year_built, photo_count, first_seen_at, last_seen_at, delisted_at,
     last_detail_scrape_at";

const RUN_COLUMNS: &str = "id, run_type, status, started_at, completed_at, config_hash,
     searches_processed, listings_found, listings_new, listings_updated, listings_delisted,
     errors";

/// SQLite storage backend
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Creates a new SqliteStore instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStore)` - Successfully opened/created database
    /// * `Err(TrackerError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, TrackerError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for tests and dry runs)
    pub fn new_in_memory() -> Result<Self, TrackerError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn source_column(row: &Row, idx: usize) -> rusqlite::Result<SourceFamily> {
    let value: String = row.get(idx)?;
    SourceFamily::from_db_string(&value)
        .ok_or_else(|| conversion_error(idx, format!("unknown source '{}'", value)))
}

fn timestamp_column(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let value: Option<String> = row.get(idx)?;
    value
        .map(|v| {
            DateTime::parse_from_rfc3339(&v)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
        })
        .transpose()
}

fn listing_from_row(row: &Row) -> rusqlite::Result<ListingRecord> {
    Ok(ListingRecord {
        id: row.get(0)?,
        source: source_column(row, 1)?,
        natural_id: row.get(2)?,
        source_url: row.get(3)?,
        address: row.get(4)?,
        municipality: row.get(5)?,
        postal_code: row.get(6)?,
        original_price: row.get(7)?,
        current_price: row.get(8)?,
        price_change_count: row.get(9)?,
        status: ListingStatus::from_db_string(&row.get::<_, String>(10)?)
            .unwrap_or(ListingStatus::Unknown),
        property_type: row.get(11)?,
        bedrooms: row.get(12)?,
        bathrooms: row.get(13)?,
        year_built: row.get(14)?,
        photo_count: row.get(15)?,
        first_seen_at: row.get(16)?,
        last_seen_at: row.get(17)?,
        delisted_at: row.get(18)?,
        last_detail_scrape_at: row.get(19)?,
    })
}

fn run_from_row(row: &Row) -> rusqlite::Result<RunRecord> {
    let errors_json: String = row.get(11)?;
    let errors: Vec<ScrapeError> = serde_json::from_str(&errors_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(11, Type::Text, Box::new(e)))?;

    Ok(RunRecord {
        id: row.get(0)?,
        run_type: RunType::from_db_string(&row.get::<_, String>(1)?).unwrap_or(RunType::Manual),
        status: RunStatus::from_db_string(&row.get::<_, String>(2)?)
            .unwrap_or(RunStatus::Failed),
        started_at: row.get(3)?,
        completed_at: row.get(4)?,
        config_hash: row.get(5)?,
        searches_processed: row.get(6)?,
        listings_found: row.get(7)?,
        listings_new: row.get(8)?,
        listings_updated: row.get(9)?,
        listings_delisted: row.get(10)?,
        errors,
    })
}

impl Store for SqliteStore {
    fn atomically<T, F>(&mut self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Self) -> StoreResult<T>,
    {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        match f(self) {
            Ok(value) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = self.conn.execute_batch("ROLLBACK") {
                    tracing::error!("Rollback failed: {}", rollback_err);
                }
                Err(e)
            }
        }
    }

    // ===== Run Management =====

    fn create_run(&mut self, run_type: RunType, config_hash: &str) -> StoreResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO scrape_runs (run_type, status, started_at, config_hash)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                run_type.to_db_string(),
                RunStatus::Running.to_db_string(),
                now,
                config_hash
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StoreResult<RunRecord> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM scrape_runs WHERE id = ?1", RUN_COLUMNS),
                params![run_id],
                run_from_row,
            )
            .optional()?
            .ok_or(StoreError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StoreResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM scrape_runs ORDER BY id DESC LIMIT 1",
                    RUN_COLUMNS
                ),
                [],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    fn find_running_run(&self) -> StoreResult<Option<i64>> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM scrape_runs WHERE status = ?1 ORDER BY id DESC LIMIT 1",
                params![RunStatus::Running.to_db_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    fn finalize_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        stats: &RunStats,
        errors: &[ScrapeError],
    ) -> StoreResult<()> {
        let now = Utc::now().to_rfc3339();
        let errors_json = serde_json::to_string(errors)?;

        let updated = self.conn.execute(
            "UPDATE scrape_runs SET status = ?1, completed_at = ?2, searches_processed = ?3,
             listings_found = ?4, listings_new = ?5, listings_updated = ?6,
             listings_delisted = ?7, errors = ?8
             WHERE id = ?9 AND status = ?10",
            params![
                status.to_db_string(),
                now,
                stats.searches_processed,
                stats.listings_found,
                stats.listings_new,
                stats.listings_updated,
                stats.listings_delisted,
                errors_json,
                run_id,
                RunStatus::Running.to_db_string()
            ],
        )?;

        if updated == 0 {
            // Distinguish a missing run from a double finalization
            self.get_run(run_id)?;
            return Err(StoreError::RunAlreadyFinalized(run_id));
        }

        Ok(())
    }

    // ===== Saved Searches =====

    fn insert_saved_search(&mut self, search: &NewSavedSearch) -> StoreResult<i64> {
        let now = Utc::now().to_rfc3339();
        let criteria = serde_json::to_string(&search.criteria)?;
        self.conn.execute(
            "INSERT INTO saved_searches (name, source, criteria, custom_url, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                search.name,
                search.source.to_db_string(),
                criteria,
                search.custom_url,
                search.is_active,
                now
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn active_saved_searches(&self) -> StoreResult<Vec<SavedSearch>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, source, criteria, custom_url, is_active
             FROM saved_searches WHERE is_active = 1 ORDER BY id",
        )?;

        let searches = stmt
            .query_map([], |row| {
                Ok(SavedSearch {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    source: source_column(row, 2)?,
                    criteria_json: row.get(3)?,
                    custom_url: row.get(4)?,
                    is_active: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(searches)
    }

    // ===== Listings =====

    fn find_listing(
        &self,
        source: SourceFamily,
        natural_id: &str,
    ) -> StoreResult<Option<ListingRecord>> {
        let listing = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM listings WHERE source = ?1 AND natural_id = ?2",
                    LISTING_COLUMNS
                ),
                params![source.to_db_string(), natural_id],
                listing_from_row,
            )
            .optional()?;
        Ok(listing)
    }

    fn get_listing(&self, listing_id: i64) -> StoreResult<ListingRecord> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM listings WHERE id = ?1", LISTING_COLUMNS),
                params![listing_id],
                listing_from_row,
            )
            .optional()?
            .ok_or(StoreError::ListingNotFound(listing_id))
    }

    fn insert_listing(&mut self, listing: &NewListing, now: DateTime<Utc>) -> StoreResult<i64> {
        let now = now.to_rfc3339();
        let raw_data = serde_json::to_string(&listing.raw_data)?;
        let detail = listing.detail.clone().unwrap_or_default();
        let detail_scraped_at = listing.detail.as_ref().map(|_| now.clone());
        let photo_urls = if detail.photo_urls.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&detail.photo_urls)?)
        };
        let photo_count = listing.photo_count.or_else(|| {
            listing
                .detail
                .as_ref()
                .filter(|d| !d.photo_urls.is_empty())
                .map(|d| d.photo_urls.len() as i32)
        });
        // Amenity flags are only meaningful when a detail page was read
        let flag = |value: bool| listing.detail.as_ref().map(|_| value);

        self.conn.execute(
            "INSERT INTO listings (
                source, natural_id, source_url, address, municipality, postal_code,
                original_price, current_price, price_change_count, status, property_type,
                year_built, lot_size_sqft, living_area_sqft, bedrooms, bathrooms,
                bathrooms_half, stories, has_garage, has_basement, has_pool, has_ac,
                has_fireplace, heating_type, description_text, photo_urls, photo_count,
                broker_name, broker_agency, days_on_market, raw_data, first_seen_at,
                last_seen_at, last_detail_scrape_at
             ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, 0, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30, ?30, ?31
             )",
            params![
                listing.source.to_db_string(),
                listing.natural_id,
                listing.source_url,
                listing.address,
                detail.municipality,
                detail.postal_code,
                listing.price,
                ListingStatus::Active.to_db_string(),
                detail.property_type.map(|t| t.to_db_string()),
                detail.year_built,
                detail.lot_size_sqft,
                detail.living_area_sqft,
                detail.bedrooms,
                detail.bathrooms,
                detail.bathrooms_half,
                detail.stories,
                flag(detail.has_garage),
                flag(detail.has_basement),
                flag(detail.has_pool),
                flag(detail.has_ac),
                flag(detail.has_fireplace),
                detail.heating_type,
                detail.description,
                photo_urls,
                photo_count,
                detail.broker_name,
                detail.broker_agency,
                detail.days_on_market,
                raw_data,
                now,
                detail_scraped_at,
            ],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    fn record_sighting(
        &mut self,
        listing_id: i64,
        price: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let current: Option<i64> = self
            .conn
            .query_row(
                "SELECT current_price FROM listings WHERE id = ?1",
                params![listing_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(StoreError::ListingNotFound(listing_id))?;

        let price_changed = current != Some(price);

        self.conn.execute(
            "UPDATE listings SET last_seen_at = ?1, current_price = ?2,
             price_change_count = price_change_count + ?3, status = ?4, delisted_at = NULL
             WHERE id = ?5",
            params![
                now.to_rfc3339(),
                price,
                if price_changed { 1 } else { 0 },
                ListingStatus::Active.to_db_string(),
                listing_id
            ],
        )?;

        Ok(price_changed)
    }

    fn mark_delisted(&mut self, listing_id: i64, now: DateTime<Utc>) -> StoreResult<()> {
        let updated = self.conn.execute(
            "UPDATE listings SET status = ?1, delisted_at = ?2 WHERE id = ?3",
            params![
                ListingStatus::Delisted.to_db_string(),
                now.to_rfc3339(),
                listing_id
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::ListingNotFound(listing_id));
        }
        Ok(())
    }

    fn insert_snapshot(
        &mut self,
        listing_id: i64,
        price: Option<i64>,
        status: ListingStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO snapshots (listing_id, captured_at, price, status) VALUES (?1, ?2, ?3, ?4)",
            params![listing_id, now.to_rfc3339(), price, status.to_db_string()],
        )?;
        Ok(())
    }

    fn snapshots_for(&self, listing_id: i64) -> StoreResult<Vec<SnapshotRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT listing_id, captured_at, price, status FROM snapshots
             WHERE listing_id = ?1 ORDER BY id",
        )?;

        let snapshots = stmt
            .query_map(params![listing_id], |row| {
                Ok(SnapshotRecord {
                    listing_id: row.get(0)?,
                    captured_at: row.get(1)?,
                    price: row.get(2)?,
                    status: ListingStatus::from_db_string(&row.get::<_, String>(3)?)
                        .unwrap_or(ListingStatus::Unknown),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(snapshots)
    }

    fn count_listings_by_status(&self) -> StoreResult<HashMap<ListingStatus, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM listings GROUP BY status")?;

        let mut counts = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        for row in rows {
            let (status, count) = row?;
            let status = ListingStatus::from_db_string(&status).unwrap_or(ListingStatus::Unknown);
            *counts.entry(status).or_insert(0) += count as u64;
        }

        Ok(counts)
    }

    // ===== Memberships =====

    fn upsert_membership(
        &mut self,
        listing_id: i64,
        search_id: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO listing_memberships (listing_id, search_id, first_matched_at, is_active)
             VALUES (?1, ?2, ?3, 1)
             ON CONFLICT(listing_id, search_id) DO UPDATE SET is_active = 1",
            params![listing_id, search_id, now.to_rfc3339()],
        )?;
        Ok(())
    }

    fn get_membership(
        &self,
        listing_id: i64,
        search_id: i64,
    ) -> StoreResult<Option<MembershipRecord>> {
        let membership = self
            .conn
            .query_row(
                "SELECT listing_id, search_id, first_matched_at, is_active
                 FROM listing_memberships WHERE listing_id = ?1 AND search_id = ?2",
                params![listing_id, search_id],
                |row| {
                    Ok(MembershipRecord {
                        listing_id: row.get(0)?,
                        search_id: row.get(1)?,
                        first_matched_at: row.get(2)?,
                        is_active: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(membership)
    }

    fn active_members(&self, search_id: i64) -> StoreResult<Vec<ActiveMember>> {
        let mut stmt = self.conn.prepare(
            "SELECT l.id, l.natural_id, l.status, l.current_price
             FROM listing_memberships m
             JOIN listings l ON l.id = m.listing_id
             WHERE m.search_id = ?1 AND m.is_active = 1
             ORDER BY l.id",
        )?;

        let members = stmt
            .query_map(params![search_id], |row| {
                Ok(ActiveMember {
                    listing_id: row.get(0)?,
                    natural_id: row.get(1)?,
                    status: ListingStatus::from_db_string(&row.get::<_, String>(2)?)
                        .unwrap_or(ListingStatus::Unknown),
                    current_price: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(members)
    }

    fn deactivate_membership(&mut self, listing_id: i64, search_id: i64) -> StoreResult<()> {
        self.conn.execute(
            "UPDATE listing_memberships SET is_active = 0 WHERE listing_id = ?1 AND search_id = ?2",
            params![listing_id, search_id],
        )?;
        Ok(())
    }

    // ===== Circuit Breakers =====

    fn load_breaker(&self, service: &str) -> StoreResult<Option<BreakerRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT state, failure_count, success_count, opened_at, last_failure_reason,
                 last_checked_at FROM circuit_breakers WHERE service = ?1",
                params![service],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, u32>(1)?,
                        row.get::<_, u32>(2)?,
                        timestamp_column(row, 3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((state, failure_count, success_count, opened_at, reason, checked)) = row else {
            return Ok(None);
        };

        let state = BreakerState::from_db_string(&state).ok_or(StoreError::InvalidValue {
            column: "circuit_breakers.state",
            value: state.clone(),
        })?;

        Ok(Some(BreakerRecord {
            state,
            failure_count,
            success_count,
            opened_at,
            last_failure_reason: reason,
            last_checked_at: parse_timestamp("circuit_breakers.last_checked_at", &checked)?,
        }))
    }

    fn save_breaker(&mut self, service: &str, record: &BreakerRecord) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO circuit_breakers (service, state, failure_count, success_count,
                opened_at, last_failure_reason, last_checked_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(service) DO UPDATE SET
                state = excluded.state,
                failure_count = excluded.failure_count,
                success_count = excluded.success_count,
                opened_at = excluded.opened_at,
                last_failure_reason = excluded.last_failure_reason,
                last_checked_at = excluded.last_checked_at,
                updated_at = excluded.updated_at",
            params![
                service,
                record.state.to_db_string(),
                record.failure_count,
                record.success_count,
                record.opened_at.map(|t| t.to_rfc3339()),
                record.last_failure_reason,
                record.last_checked_at.to_rfc3339(),
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    // ===== Fingerprint Usage =====

    fn load_fingerprint_usage(&self) -> StoreResult<HashMap<String, FingerprintUsage>> {
        let mut stmt = self.conn.prepare(
            "SELECT fingerprint_id, use_count, success_count, failure_count, last_used_at
             FROM fingerprint_usage",
        )?;

        let usage = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    FingerprintUsage {
                        use_count: row.get(1)?,
                        success_count: row.get(2)?,
                        failure_count: row.get(3)?,
                        last_used_at: timestamp_column(row, 4)?,
                    },
                ))
            })?
            .collect::<Result<HashMap<_, _>, _>>()?;

        Ok(usage)
    }

    fn save_fingerprint_usage(&mut self, id: &str, usage: &FingerprintUsage) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO fingerprint_usage (fingerprint_id, use_count, success_count,
                failure_count, last_used_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(fingerprint_id) DO UPDATE SET
                use_count = excluded.use_count,
                success_count = excluded.success_count,
                failure_count = excluded.failure_count,
                last_used_at = excluded.last_used_at",
            params![
                id,
                usage.use_count,
                usage.success_count,
                usage.failure_count,
                usage.last_used_at.map(|t| t.to_rfc3339())
            ],
        )?;
        Ok(())
    }

    fn clear_fingerprint_usage(&mut self) -> StoreResult<()> {
        self.conn.execute("DELETE FROM fingerprint_usage", [])?;
        Ok(())
    }

    // ===== Proxy Budget =====

    fn load_proxy_budget(&self) -> StoreResult<Option<ProxyBudgetRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT monthly_usage_gb, last_reset_at FROM proxy_budget WHERE id = 'current'",
                [],
                |row| Ok((row.get::<_, f64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        row.map(|(usage, reset)| {
            Ok(ProxyBudgetRecord {
                monthly_usage_gb: usage,
                last_reset_at: parse_timestamp("proxy_budget.last_reset_at", &reset)?,
            })
        })
        .transpose()
    }

    fn save_proxy_budget(&mut self, record: &ProxyBudgetRecord) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO proxy_budget (id, monthly_usage_gb, last_reset_at, updated_at)
             VALUES ('current', ?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
                monthly_usage_gb = excluded.monthly_usage_gb,
                last_reset_at = excluded.last_reset_at,
                updated_at = excluded.updated_at",
            params![
                record.monthly_usage_gb,
                record.last_reset_at.to_rfc3339(),
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }
}
