//! State module for listings, runs and guards
//!
//! This module provides the enums and small value types shared by storage,
//! the evasion toolkit and the run controller.
//!
//! # Components
//!
//! - `SourceFamily`: The listing site a record comes from (realtor, centris)
//! - `ListingStatus`: Lifecycle of a listing (active, delisted, sold, ...)
//! - `RunStatus` / `RunType`: Lifecycle and trigger of a scrape run
//! - `ScrapeError`: Structured error entries recorded on a run
//! - `BreakerState`: Per-service circuit breaker state

mod listing_state;
mod run_state;

// Re-export main types
pub use listing_state::{ListingStatus, PropertyType, SourceFamily};
pub use run_state::{
    BreakerState, ErrorCategory, ErrorContext, ErrorSeverity, RunStats, RunStatus, RunType,
    ScrapeError,
};
