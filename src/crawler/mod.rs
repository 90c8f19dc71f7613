//! Crawler module for scrape run execution
//!
//! This module contains the run controller, including:
//! - Run record lifecycle and single-run exclusion
//! - Per-family browser contexts with fingerprint, proxy and session setup
//! - Search pagination, block detection and detail fetching
//! - Reconciliation, statistics and run finalization

mod coordinator;

pub use coordinator::{Coordinator, RunReport};

use crate::browser::HttpBrowser;
use crate::config::Config;
use crate::state::RunType;
use crate::storage::open_store;
use crate::TrackerError;
use std::path::Path;

/// Runs a complete scrape run
///
/// This is the main entry point for a run. It will:
/// 1. Open the store
/// 2. Create the run record, refusing if another run is in progress
/// 3. Crawl every active saved search of every enabled source
/// 4. Finalize the run record and ping the liveness endpoint
///
/// # Arguments
///
/// * `config` - The tracker configuration
/// * `config_hash` - Hash of the configuration file contents
/// * `run_type` - Whether the run was scheduled or started by hand
///
/// # Returns
///
/// * `Ok(RunReport)` - The run was finalized, possibly as failed
/// * `Err(TrackerError)` - The run could not be started or finalized
pub async fn track(
    config: Config,
    config_hash: String,
    run_type: RunType,
) -> Result<RunReport, TrackerError> {
    let store = open_store(Path::new(&config.database.path))?;
    let browser = HttpBrowser::default();

    let coordinator = Coordinator::new(config, config_hash, store, browser);
    coordinator.run(run_type).await
}
