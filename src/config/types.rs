use crate::state::SourceFamily;
use serde::Deserialize;

/// Main configuration structure for Listing-Tracker
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub stealth: StealthConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default, rename = "circuit-breaker")]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub healthcheck: HealthcheckConfig,
}

impl Config {
    /// Per-family source settings
    pub fn source(&self, family: SourceFamily) -> &SourceConfig {
        match family {
            SourceFamily::Realtor => &self.sources.realtor,
            SourceFamily::Centris => &self.sources.centris,
        }
    }
}

/// Database location
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file
    pub path: String,
}

/// Run-level crawl limits
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CrawlerConfig {
    /// Navigation ceiling for a whole run (search and detail pages)
    pub max_requests_per_run: u32,

    /// Result pages fetched per saved search
    pub max_pages_per_search: u32,

    /// Consecutive failed searches before the run is aborted
    pub consecutive_failure_threshold: u32,

    /// Per-navigation timeout (milliseconds)
    pub navigation_timeout_ms: u64,

    /// Text markers identifying an anti-bot block page
    pub block_markers: Vec<String>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_requests_per_run: 200,
            max_pages_per_search: 10,
            consecutive_failure_threshold: 5,
            navigation_timeout_ms: 30_000,
            block_markers: crate::extract::BlockDetector::DEFAULT_MARKERS
                .iter()
                .map(|m| m.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourcesConfig {
    #[serde(default = "SourceConfig::realtor")]
    pub realtor: SourceConfig,
    #[serde(default = "SourceConfig::centris")]
    pub centris: SourceConfig,
}

/// Per-family switches
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SourceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Apply the evasion toolkit (fingerprints, stealth script, human behavior, proxy)
    #[serde(default = "default_true")]
    pub stealth: bool,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            realtor: SourceConfig::realtor(),
            centris: SourceConfig::centris(),
        }
    }
}

impl SourceConfig {
    fn realtor() -> Self {
        Self {
            enabled: true,
            stealth: true,
        }
    }

    fn centris() -> Self {
        Self {
            enabled: true,
            stealth: false,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self::realtor()
    }
}

/// Fingerprint rotation policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FingerprintRotation {
    /// Always the first bundle
    #[default]
    Off,
    /// Least recently used, 20 uses per 24 hours
    Conservative,
    /// Least recently used, 5 uses per hour
    Moderate,
    /// Uniform random on every selection
    Aggressive,
}

/// Evasion behavior switches
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct StealthConfig {
    pub fingerprint_rotation: FingerprintRotation,

    /// Visit the site's home page before the first search
    pub session_warmup: bool,

    pub mouse_movement: bool,
    pub scrolling: bool,
    pub reading_pause: bool,

    /// Save and restore cookies between runs
    pub session_persistence: bool,

    /// Directory holding one session file per family
    pub session_dir: String,

    /// Sessions older than this are not restored
    pub session_max_age_days: u32,
}

impl Default for StealthConfig {
    fn default() -> Self {
        Self {
            fingerprint_rotation: FingerprintRotation::Off,
            session_warmup: false,
            mouse_movement: true,
            scrolling: true,
            reading_pause: true,
            session_persistence: true,
            session_dir: ".sessions".to_string(),
            session_max_age_days: 7,
        }
    }
}

/// Delays between navigations
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct TimingConfig {
    pub search_min_ms: u64,
    pub search_max_ms: u64,
    pub detail_min_ms: u64,
    pub detail_max_ms: u64,

    /// Scale delays by time of day
    pub time_of_day_aware: bool,

    /// Enforce `min-spacing-ms` between consecutive requests
    pub burst_protection: bool,
    pub min_spacing_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            search_min_ms: 2000,
            search_max_ms: 5000,
            detail_min_ms: 3000,
            detail_max_ms: 8000,
            time_of_day_aware: true,
            burst_protection: true,
            min_spacing_ms: 1500,
        }
    }
}

/// Retry with exponential backoff
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Outbound proxy for stealth families
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ProxyConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub username: String,

    /// Usually supplied through `PROXY_PASSWORD`
    pub password: String,
}

/// Monthly proxy bandwidth ceiling
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BudgetConfig {
    pub enabled: bool,
    pub monthly_limit_gb: f64,
    pub alert_threshold_percent: f64,
    pub hard_stop_percent: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            monthly_limit_gb: 5.0,
            alert_threshold_percent: 80.0,
            hard_stop_percent: 95.0,
        }
    }
}

/// Per-service circuit breaker thresholds
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open a closed breaker
    pub failure_threshold: u32,

    /// Consecutive successes that close a half-open breaker
    pub success_threshold: u32,

    /// Time an open breaker waits before allowing a probe (seconds)
    pub half_open_after_secs: u64,

    /// Quiet period after which a closed breaker's success count restarts (seconds)
    pub reset_after_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            half_open_after_secs: 30 * 60,
            reset_after_secs: 60 * 60,
        }
    }
}

/// Liveness endpoint notified after each run
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct HealthcheckConfig {
    /// Usually supplied through `HEALTHCHECKS_PING_URL`
    pub ping_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for HealthcheckConfig {
    fn default() -> Self {
        Self {
            ping_url: None,
            timeout_secs: 10,
        }
    }
}

fn default_true() -> bool {
    true
}
