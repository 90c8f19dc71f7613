use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Environment variable overriding `healthcheck.ping-url`
pub const PING_URL_ENV: &str = "HEALTHCHECKS_PING_URL";

/// Environment variable overriding `proxy.password`
pub const PROXY_PASSWORD_ENV: &str = "PROXY_PASSWORD";

/// Loads and parses a configuration file from the given path
///
/// Secrets may be left out of the file and supplied through the environment
/// (`HEALTHCHECKS_PING_URL`, `PROXY_PASSWORD`). Overrides are applied before
/// validation.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use listing_tracker::config::load_config;
///
/// let config = load_config(Path::new("tracker.toml")).unwrap();
/// println!("Database: {}", config.database.path);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut config: Config = toml::from_str(&content)?;

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    validate(&config)?;

    Ok(config)
}

/// Applies environment overrides through the given lookup
///
/// Empty values are ignored.
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

    if let Some(ping_url) = lookup(PING_URL_ENV) {
        config.healthcheck.ping_url = Some(ping_url);
    }

    if let Some(password) = lookup(PROXY_PASSWORD_ENV) {
        config.proxy.password = password;
    }
}

/// Computes a SHA-256 hash of the configuration file content
///
/// The hash is stored on every scrape run so that runs made under different
/// settings can be told apart.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}
