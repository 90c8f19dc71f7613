use crate::config::types::{
    BudgetConfig, CircuitBreakerConfig, Config, CrawlerConfig, HealthcheckConfig, ProxyConfig,
    RetryConfig, TimingConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.database.path.is_empty() {
        return Err(ConfigError::Validation(
            "database path cannot be empty".to_string(),
        ));
    }

    validate_crawler_config(&config.crawler)?;
    validate_timing_config(&config.timing)?;
    validate_retry_config(&config.retry)?;
    validate_proxy_config(&config.proxy)?;
    validate_budget_config(&config.budget)?;
    validate_breaker_config(&config.circuit_breaker)?;
    validate_healthcheck_config(&config.healthcheck)?;

    if config.stealth.session_persistence && config.stealth.session_dir.is_empty() {
        return Err(ConfigError::Validation(
            "session-dir cannot be empty when session persistence is enabled".to_string(),
        ));
    }

    Ok(())
}

/// Validates run-level crawl limits
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_requests_per_run < 1 {
        return Err(ConfigError::Validation(format!(
            "max-requests-per-run must be >= 1, got {}",
            config.max_requests_per_run
        )));
    }

    if config.max_pages_per_search < 1 {
        return Err(ConfigError::Validation(format!(
            "max-pages-per-search must be >= 1, got {}",
            config.max_pages_per_search
        )));
    }

    if config.consecutive_failure_threshold < 1 {
        return Err(ConfigError::Validation(format!(
            "consecutive-failure-threshold must be >= 1, got {}",
            config.consecutive_failure_threshold
        )));
    }

    if config.navigation_timeout_ms < 1000 {
        return Err(ConfigError::Validation(format!(
            "navigation-timeout-ms must be >= 1000ms, got {}ms",
            config.navigation_timeout_ms
        )));
    }

    Ok(())
}

/// Validates pacing ranges
fn validate_timing_config(config: &TimingConfig) -> Result<(), ConfigError> {
    if config.search_min_ms > config.search_max_ms {
        return Err(ConfigError::Validation(format!(
            "search-min-ms ({}) must not exceed search-max-ms ({})",
            config.search_min_ms, config.search_max_ms
        )));
    }

    if config.detail_min_ms > config.detail_max_ms {
        return Err(ConfigError::Validation(format!(
            "detail-min-ms ({}) must not exceed detail-max-ms ({})",
            config.detail_min_ms, config.detail_max_ms
        )));
    }

    Ok(())
}

/// Validates retry settings
fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 || config.max_attempts > 10 {
        return Err(ConfigError::Validation(format!(
            "max-attempts must be between 1 and 10, got {}",
            config.max_attempts
        )));
    }

    if config.base_delay_ms < 100 || config.base_delay_ms > 60_000 {
        return Err(ConfigError::Validation(format!(
            "base-delay-ms must be between 100 and 60000, got {}",
            config.base_delay_ms
        )));
    }

    if config.max_delay_ms < config.base_delay_ms {
        return Err(ConfigError::Validation(format!(
            "max-delay-ms ({}) must be >= base-delay-ms ({})",
            config.max_delay_ms, config.base_delay_ms
        )));
    }

    if !(config.backoff_multiplier >= 1.0) {
        return Err(ConfigError::Validation(format!(
            "backoff-multiplier must be >= 1.0, got {}",
            config.backoff_multiplier
        )));
    }

    Ok(())
}

/// Validates proxy credentials when the proxy is enabled
fn validate_proxy_config(config: &ProxyConfig) -> Result<(), ConfigError> {
    if !config.enabled {
        return Ok(());
    }

    if config.host.is_empty() || config.port == 0 {
        return Err(ConfigError::Validation(
            "proxy enabled but host or port is missing".to_string(),
        ));
    }

    if config.username.is_empty() || config.password.is_empty() {
        return Err(ConfigError::Validation(
            "proxy enabled but username or password is missing (set PROXY_PASSWORD)".to_string(),
        ));
    }

    Ok(())
}

/// Validates bandwidth thresholds
fn validate_budget_config(config: &BudgetConfig) -> Result<(), ConfigError> {
    if !config.enabled {
        return Ok(());
    }

    if !(config.monthly_limit_gb > 0.0) {
        return Err(ConfigError::Validation(format!(
            "monthly-limit-gb must be greater than 0, got {}",
            config.monthly_limit_gb
        )));
    }

    if config.alert_threshold_percent >= config.hard_stop_percent {
        return Err(ConfigError::Validation(format!(
            "alert-threshold-percent ({}) must be less than hard-stop-percent ({})",
            config.alert_threshold_percent, config.hard_stop_percent
        )));
    }

    Ok(())
}

fn validate_breaker_config(config: &CircuitBreakerConfig) -> Result<(), ConfigError> {
    if config.failure_threshold < 1 || config.success_threshold < 1 {
        return Err(ConfigError::Validation(format!(
            "circuit breaker thresholds must be >= 1, got failure={} success={}",
            config.failure_threshold, config.success_threshold
        )));
    }

    Ok(())
}

fn validate_healthcheck_config(config: &HealthcheckConfig) -> Result<(), ConfigError> {
    if let Some(ping_url) = &config.ping_url {
        let url = Url::parse(ping_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid ping-url: {}", e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidUrl(format!(
                "ping-url '{}' must use HTTP or HTTPS",
                ping_url
            )));
        }
    }

    Ok(())
}
