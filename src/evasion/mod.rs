//! Evasion toolkit applied around every navigation
//!
//! This module provides:
//! - Fingerprint bundles and persisted rotation
//! - The stealth init script and matching request headers
//! - Proxy selection under a monthly bandwidth budget
//! - A per-service circuit breaker
//! - Retry with exponential backoff
//! - Human-like pointer, scroll and reading behavior
//! - Adaptive pacing between requests
//! - Cookie session persistence

mod circuit_breaker;
mod fingerprint;
mod human;
mod proxy;
mod retry;
mod session;
mod stealth;
mod timing;

pub use circuit_breaker::CircuitBreaker;
pub use fingerprint::{
    Fingerprint, FingerprintRotator, FingerprintStat, FingerprintStats, FINGERPRINTS,
};
pub use human::{mouse_path, reading_time, scroll_plan, HumanBehavior, Point, ScrollStep};
pub use proxy::{BudgetStatus, BudgetUsage, ProxyBudgetTracker};
pub use retry::{
    backoff_delay, is_retryable_message, navigate_with_retry, with_retry, Attempt,
    NavigationError, Retryable,
};
pub use session::{SessionData, SessionStore};
pub use stealth::{basic_headers, stealth_headers, stealth_script, ACCEPT_LANGUAGE};
pub use timing::{time_of_day_multiplier, triangular_delay, Pacer};

/// Kind of page load, used for pacing and bandwidth estimates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Search,
    Detail,
    Warmup,
}

impl PageKind {
    /// Typical transfer size in KB
    pub fn estimated_kb(&self) -> u64 {
        match self {
            PageKind::Search => 500,
            PageKind::Detail => 1000,
            PageKind::Warmup => 800,
        }
    }
}
