//! Listing-Tracker: a real-estate listing tracker
//!
//! This crate re-crawls saved searches on two listing sites, extracts listing
//! records from the rendered pages, and reconciles them against a SQLite store
//! to detect new listings, price changes and delistings. Every navigation goes
//! through an evasion toolkit (fingerprints, pacing, retries, circuit breaker,
//! proxy budget, session persistence).

pub mod browser;
pub mod config;
pub mod crawler;
pub mod evasion;
pub mod extract;
pub mod healthcheck;
pub mod reconcile;
pub mod search_url;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Listing-Tracker operations
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Store(#[from] storage::StoreError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Browser error: {0}")]
    Browser(#[from] browser::BrowserError),

    #[error("Navigation error: {0}")]
    Navigation(#[from] evasion::NavigationError),

    #[error("Search URL error: {0}")]
    SearchUrl(#[from] SearchUrlError),

    #[error("Blocked by anti-bot protection at {url}")]
    Blocked { url: String },

    #[error("None of the {cards} result cards at {url} could be parsed")]
    Unparseable { url: String, cards: usize },

    #[error("Circuit breaker open for {service}")]
    CircuitOpen { service: String },

    #[error("A scrape run is already in progress (run {0})")]
    RunInProgress(i64),

    #[error("Invalid saved search {id}: {message}")]
    InvalidSearch { id: i64, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store lock poisoned")]
    LockPoisoned,
}

impl TrackerError {
    /// Maps the error onto the scrape error taxonomy recorded on a run
    pub fn category(&self) -> state::ErrorCategory {
        use state::ErrorCategory;

        match self {
            Self::Navigation(e) => e.category(),
            Self::Browser(_) => ErrorCategory::Network,
            Self::Blocked { .. } | Self::CircuitOpen { .. } => ErrorCategory::Blocked,
            Self::Store(_) | Self::Database(_) | Self::LockPoisoned => ErrorCategory::Database,
            Self::SearchUrl(_)
            | Self::Unparseable { .. }
            | Self::InvalidSearch { .. }
            | Self::Json(_) => ErrorCategory::Parse,
            Self::Config(_) | Self::RunInProgress(_) | Self::Io(_) => ErrorCategory::Unknown,
        }
    }

    /// HTTP status carried by the error, if any
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Navigation(e) => e.http_status(),
            _ => None,
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for TrackerError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Self::LockPoisoned
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Search URL construction errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SearchUrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Custom URL {url} does not belong to {expected}")]
    ForeignDomain { url: String, expected: String },

    #[error("Invalid search criteria: {0}")]
    InvalidCriteria(String),
}

/// Result type alias for Listing-Tracker operations
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for search URL operations
pub type SearchUrlResult<T> = std::result::Result<T, SearchUrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::Coordinator;
pub use state::{ListingStatus, RunStatus, RunType, SourceFamily};
