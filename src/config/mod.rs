//! Configuration module for Listing-Tracker
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Only the `[database]` section is required; every other section falls back
//! to defaults.
//!
//! # Example
//!
//! ```no_run
//! use listing_tracker::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("tracker.toml")).unwrap();
//! println!("Max requests per run: {}", config.crawler.max_requests_per_run);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    BudgetConfig, CircuitBreakerConfig, Config, CrawlerConfig, DatabaseConfig,
    FingerprintRotation, HealthcheckConfig, ProxyConfig, RetryConfig, SourceConfig,
    SourcesConfig, StealthConfig, TimingConfig,
};

// Re-export parser functions
pub use parser::{
    apply_env_overrides, compute_config_hash, load_config, load_config_with_hash, PING_URL_ENV,
    PROXY_PASSWORD_ENV,
};
