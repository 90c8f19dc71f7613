//! Listing-Tracker main entry point
//!
//! This is the command-line interface for the Listing-Tracker scraper.

use chrono::Utc;
use clap::{Parser, Subcommand};
use listing_tracker::config::{load_config_with_hash, Config};
use listing_tracker::crawler::track;
use listing_tracker::evasion::{CircuitBreaker, FingerprintRotator, ProxyBudgetTracker};
use listing_tracker::search_url::build_search_url;
use listing_tracker::storage::{open_store, Store};
use listing_tracker::{ListingStatus, RunType, SourceFamily};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Listing-Tracker: a real-estate listing tracker
///
/// Listing-Tracker re-crawls saved searches on realtor and centris, records
/// new listings, price changes and delistings, and keeps its anti-blocking
/// state (breakers, fingerprints, proxy budget) between runs.
#[derive(Parser, Debug)]
#[command(name = "listing-tracker")]
#[command(version = "1.0.0")]
#[command(about = "A real-estate listing tracker", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a scrape of every active saved search (default)
    Run {
        /// Record the run as scheduled rather than manual
        #[arg(long)]
        scheduled: bool,
    },

    /// Show the latest run and listing counts
    Status,

    /// Show or reset the circuit breaker of a service
    Breaker {
        /// Service name (realtor or centris)
        service: String,

        /// Force the breaker closed
        #[arg(long)]
        reset: bool,
    },

    /// Show fingerprint usage statistics
    Fingerprints,

    /// Show proxy bandwidth usage for the current month
    Budget,

    /// Validate config and show the URLs that would be crawled
    DryRun,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    match cli.command.unwrap_or(Command::Run { scheduled: false }) {
        Command::Run { scheduled } => handle_run(config, config_hash, scheduled).await?,
        Command::Status => handle_status(&config)?,
        Command::Breaker { service, reset } => handle_breaker(&config, &service, reset)?,
        Command::Fingerprints => handle_fingerprints(&config)?,
        Command::Budget => handle_budget(&config)?,
        Command::DryRun => handle_dry_run(&config)?,
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("listing_tracker=info,warn"),
            1 => EnvFilter::new("listing_tracker=debug,info"),
            2 => EnvFilter::new("listing_tracker=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the run command: executes one scrape run
async fn handle_run(
    config: Config,
    config_hash: String,
    scheduled: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let run_type = if scheduled {
        RunType::Scheduled
    } else {
        RunType::Manual
    };

    tracing::info!(
        "Starting {} run (max {} requests, {} pages per search)",
        run_type.to_db_string(),
        config.crawler.max_requests_per_run,
        config.crawler.max_pages_per_search
    );

    match track(config, config_hash, run_type).await {
        Ok(report) => {
            println!("Run {} finished: {}", report.run_id, report.status);
            println!("  Searches processed: {}", report.stats.searches_processed);
            println!("  Listings found:     {}", report.stats.listings_found);
            println!("  New:                {}", report.stats.listings_new);
            println!("  Price changes:      {}", report.stats.listings_updated);
            println!("  Delisted:           {}", report.stats.listings_delisted);
            println!("  Errors:             {}", report.errors.len());
            Ok(())
        }
        Err(e) => {
            tracing::error!("Run failed: {}", e);
            Err(e.into())
        }
    }
}

/// Handles the status command: shows the latest run and listing counts
fn handle_status(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("Database: {}\n", config.database.path);

    let store = open_store(Path::new(&config.database.path))?;

    match store.get_latest_run()? {
        Some(run) => {
            println!("Latest run #{} ({})", run.id, run.run_type.to_db_string());
            println!("  Status:    {}", run.status);
            println!("  Started:   {}", run.started_at);
            println!(
                "  Completed: {}",
                run.completed_at.as_deref().unwrap_or("-")
            );
            println!(
                "  Searches: {}, found: {}, new: {}, updated: {}, delisted: {}",
                run.searches_processed,
                run.listings_found,
                run.listings_new,
                run.listings_updated,
                run.listings_delisted
            );
            println!("  Errors: {}", run.errors.len());
            for error in run.errors.iter().filter(|e| e.is_critical()) {
                println!("    ! {}", error.message);
            }
        }
        None => println!("No runs recorded yet"),
    }

    let counts = store.count_listings_by_status()?;
    println!("\nListings:");
    for status in ListingStatus::all_states() {
        println!("  {:<10} {}", status, counts.get(&status).copied().unwrap_or(0));
    }

    Ok(())
}

/// Handles the breaker command: shows or resets one service's breaker
fn handle_breaker(
    config: &Config,
    service: &str,
    reset: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let family = SourceFamily::from_db_string(service)
        .ok_or_else(|| format!("Unknown service: {} (expected realtor or centris)", service))?;

    let mut store = open_store(Path::new(&config.database.path))?;
    let now = Utc::now();

    if reset {
        CircuitBreaker::reset(&mut store, family.service_name(), now)?;
        println!("✓ Circuit breaker for {} reset to closed", family);
    }

    let record = CircuitBreaker::status(&mut store, family.service_name(), now)?;
    println!("Circuit breaker: {}", family);
    println!("  State:     {}", record.state);
    println!("  Failures:  {}", record.failure_count);
    println!("  Successes: {}", record.success_count);
    if let Some(opened_at) = record.opened_at {
        println!("  Opened at: {}", opened_at.to_rfc3339());
    }
    if let Some(reason) = &record.last_failure_reason {
        println!("  Last failure: {}", reason);
    }

    Ok(())
}

/// Handles the fingerprints command: shows per-bundle usage
fn handle_fingerprints(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(Path::new(&config.database.path))?;
    let stats = FingerprintRotator::stats(&store)?;

    println!(
        "Fingerprints: {} of {} used (rotation: {:?})",
        stats.used, stats.total, config.stealth.fingerprint_rotation
    );
    for entry in &stats.entries {
        println!(
            "  {:<14} uses: {:>4}  success: {:>5.1}%  last used: {}",
            entry.id,
            entry.uses,
            entry.success_rate * 100.0,
            entry
                .last_used_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "-".to_string())
        );
    }

    Ok(())
}

/// Handles the budget command: shows proxy bandwidth for the month
fn handle_budget(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = open_store(Path::new(&config.database.path))?;
    let tracker = ProxyBudgetTracker::new(config.proxy.clone(), config.budget.clone());
    let usage = tracker.usage(&mut store, Utc::now())?;

    if !usage.enabled {
        println!("Proxy budget tracking is disabled");
        return Ok(());
    }

    println!("Proxy budget:");
    println!(
        "  Used:   {:.3} GB of {:.1} GB ({:.1}%)",
        usage.usage_gb, usage.limit_gb, usage.usage_percent
    );
    println!("  Status: {:?}", usage.status);

    Ok(())
}

/// Handles the dry-run command: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Listing-Tracker Dry Run ===\n");

    println!("Crawler Configuration:");
    println!(
        "  Max requests per run: {}",
        config.crawler.max_requests_per_run
    );
    println!(
        "  Max pages per search: {}",
        config.crawler.max_pages_per_search
    );
    println!(
        "  Consecutive failure threshold: {}",
        config.crawler.consecutive_failure_threshold
    );
    println!(
        "  Navigation timeout: {}ms",
        config.crawler.navigation_timeout_ms
    );

    println!("\nSources:");
    for family in SourceFamily::all() {
        let source = config.source(family);
        println!(
            "  - {} (enabled: {}, stealth: {})",
            family, source.enabled, source.stealth
        );
    }

    println!("\nStealth:");
    println!(
        "  Fingerprint rotation: {:?}",
        config.stealth.fingerprint_rotation
    );
    println!(
        "  Session persistence: {} ({})",
        config.stealth.session_persistence, config.stealth.session_dir
    );
    println!("  Proxy enabled: {}", config.proxy.enabled);

    println!("\nDatabase: {}", config.database.path);

    let store = open_store(Path::new(&config.database.path))?;
    let searches = store.active_saved_searches()?;

    println!("\nActive Saved Searches ({}):", searches.len());
    let mut crawlable = 0;
    for search in &searches {
        let url = search
            .criteria()
            .and_then(|criteria| build_search_url(search.source, &criteria, search.custom_url.as_deref()));
        match url {
            Ok(url) => {
                crawlable += 1;
                println!("  - #{} {} [{}]", search.id, search.name, search.source);
                println!("    * {}", url);
            }
            Err(e) => {
                println!("  - #{} {} [{}] INVALID: {}", search.id, search.name, search.source, e);
            }
        }
    }

    println!("\n✓ Configuration is valid");
    println!("✓ Would crawl {} saved searches", crawlable);

    Ok(())
}
