//! Database schema definitions and migrations
//!
//! This module contains all SQL schema definitions for the Listing-Tracker database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Saved searches, owned by the CRUD layer
CREATE TABLE IF NOT EXISTS saved_searches (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    source TEXT NOT NULL,
    criteria TEXT NOT NULL DEFAULT '{}',
    custom_url TEXT,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);

-- One row per external advertisement
CREATE TABLE IF NOT EXISTS listings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source TEXT NOT NULL,
    natural_id TEXT NOT NULL,
    source_url TEXT NOT NULL,
    address TEXT NOT NULL,
    municipality TEXT,
    postal_code TEXT,
    original_price INTEGER,
    current_price INTEGER,
    price_change_count INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL,
    property_type TEXT,
    year_built INTEGER,
    lot_size_sqft INTEGER,
    living_area_sqft INTEGER,
    bedrooms INTEGER,
    bathrooms INTEGER,
    bathrooms_half INTEGER,
    stories REAL,
    has_garage INTEGER,
    has_basement INTEGER,
    has_pool INTEGER,
    has_ac INTEGER,
    has_fireplace INTEGER,
    heating_type TEXT,
    description_text TEXT,
    photo_urls TEXT,
    photo_count INTEGER,
    broker_name TEXT,
    broker_agency TEXT,
    days_on_market INTEGER,
    raw_data TEXT,
    first_seen_at TEXT NOT NULL,
    last_seen_at TEXT NOT NULL,
    last_detail_scrape_at TEXT,
    delisted_at TEXT,
    UNIQUE(source, natural_id)
);

CREATE INDEX IF NOT EXISTS idx_listings_status ON listings(status);

-- Append-only observations
CREATE TABLE IF NOT EXISTS snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    listing_id INTEGER NOT NULL REFERENCES listings(id) ON DELETE CASCADE,
    captured_at TEXT NOT NULL,
    price INTEGER,
    status TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_snapshots_listing ON snapshots(listing_id);

-- Listing <-> saved search links
CREATE TABLE IF NOT EXISTS listing_memberships (
    listing_id INTEGER NOT NULL REFERENCES listings(id) ON DELETE CASCADE,
    search_id INTEGER NOT NULL REFERENCES saved_searches(id) ON DELETE CASCADE,
    first_matched_at TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    PRIMARY KEY (listing_id, search_id)
);

CREATE INDEX IF NOT EXISTS idx_memberships_search ON listing_memberships(search_id, is_active);

-- Track scrape runs
CREATE TABLE IF NOT EXISTS scrape_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_type TEXT NOT NULL,
    status TEXT NOT NULL,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    config_hash TEXT NOT NULL,
    searches_processed INTEGER NOT NULL DEFAULT 0,
    listings_found INTEGER NOT NULL DEFAULT 0,
    listings_new INTEGER NOT NULL DEFAULT 0,
    listings_updated INTEGER NOT NULL DEFAULT 0,
    listings_delisted INTEGER NOT NULL DEFAULT 0,
    errors TEXT NOT NULL DEFAULT '[]'
);

CREATE INDEX IF NOT EXISTS idx_scrape_runs_status ON scrape_runs(status);

-- Per-service circuit breakers
CREATE TABLE IF NOT EXISTS circuit_breakers (
    service TEXT PRIMARY KEY,
    state TEXT NOT NULL,
    failure_count INTEGER NOT NULL DEFAULT 0,
    success_count INTEGER NOT NULL DEFAULT 0,
    opened_at TEXT,
    last_failure_reason TEXT,
    last_checked_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Fingerprint rotation history
CREATE TABLE IF NOT EXISTS fingerprint_usage (
    fingerprint_id TEXT PRIMARY KEY,
    use_count INTEGER NOT NULL DEFAULT 0,
    success_count INTEGER NOT NULL DEFAULT 0,
    failure_count INTEGER NOT NULL DEFAULT 0,
    last_used_at TEXT
);

-- Singleton proxy bandwidth budget
CREATE TABLE IF NOT EXISTS proxy_budget (
    id TEXT PRIMARY KEY CHECK (id = 'current'),
    monthly_usage_gb REAL NOT NULL DEFAULT 0,
    last_reset_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
