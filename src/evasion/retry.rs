//! Retry with exponential backoff and jitter

use crate::browser::{BrowserError, Navigation, Page};
use crate::config::RetryConfig;
use crate::state::ErrorCategory;
use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Failure of a page navigation after classification of the response
#[derive(Debug, Error)]
pub enum NavigationError {
    #[error("Access denied (HTTP {status}) at {url}")]
    Blocked { url: String, status: u16 },

    #[error("Too many requests (HTTP 429) at {url}")]
    RateLimited { url: String },

    #[error("HTTP {status} at {url}")]
    Http { url: String, status: u16 },

    #[error(transparent)]
    Browser(#[from] BrowserError),
}

impl NavigationError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Blocked { .. } => ErrorCategory::Blocked,
            Self::RateLimited { .. } => ErrorCategory::RateLimit,
            Self::Http { .. } | Self::Browser(_) => ErrorCategory::Network,
        }
    }

    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Blocked { status, .. } | Self::Http { status, .. } => Some(*status),
            Self::RateLimited { .. } => Some(429),
            Self::Browser(_) => None,
        }
    }
}

/// Errors that know whether another attempt could succeed
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

const RETRYABLE_PATTERNS: &[&str] = &[
    "timeout",
    "timed out",
    "network",
    "econnrefused",
    "econnreset",
    "connection",
    "socket hang up",
    "too many requests",
    "rate limit",
    "503",
    "502",
    "429",
];

const FATAL_PATTERNS: &[&str] = &["400", "401", "404", "invalid credentials"];

/// Classifies an error message
///
/// Known client errors are fatal, everything else is retried.
pub fn is_retryable_message(message: &str) -> bool {
    let message = message.to_lowercase();

    if FATAL_PATTERNS.iter().any(|p| message.contains(p)) {
        return false;
    }

    if RETRYABLE_PATTERNS.iter().any(|p| message.contains(p)) {
        return true;
    }

    true
}

impl Retryable for NavigationError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Blocked { .. } | Self::RateLimited { .. } => true,
            Self::Http { status, .. } => !matches!(status, 400 | 401 | 404),
            Self::Browser(
                BrowserError::InvalidUrl(_)
                | BrowserError::InvalidHeader { .. }
                | BrowserError::NoDocument
                | BrowserError::Closed,
            ) => false,
            Self::Browser(e) if e.is_transient() => true,
            Self::Browser(e) => is_retryable_message(&e.to_string()),
        }
    }
}

/// Delay before attempt `attempt + 1`
///
/// `base * multiplier^(attempt - 1)` capped at `max-delay-ms`, then spread
/// by ±25% when jitter is enabled.
pub fn backoff_delay<R: Rng + ?Sized>(config: &RetryConfig, attempt: u32, rng: &mut R) -> Duration {
    let exponent = attempt.saturating_sub(1) as i32;
    let raw = config.base_delay_ms as f64 * config.backoff_multiplier.powi(exponent);
    let mut delay = raw.min(config.max_delay_ms as f64);

    if config.jitter {
        let spread = delay * 0.25;
        delay = delay - spread + rng.gen::<f64>() * spread * 2.0;
    }

    Duration::from_millis(delay.floor() as u64)
}

/// Boxed future returned by a retried operation
pub type Attempt<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Runs `op` until it succeeds, fails fatally, or `max-attempts` is reached
///
/// `op` receives exclusive access to `target` and the 1-based attempt
/// number. The last error is returned unchanged.
pub async fn with_retry<S, T, E, F>(
    config: &RetryConfig,
    name: &str,
    target: &mut S,
    mut op: F,
) -> Result<T, E>
where
    S: ?Sized + Send,
    E: Retryable + Display,
    F: for<'a> FnMut(&'a mut S, u32) -> Attempt<'a, T, E>,
{
    let mut attempt = 1;

    loop {
        tracing::debug!("{} - attempt {}/{}", name, attempt, config.max_attempts);

        match op(target, attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!("{} - succeeded on attempt {}", name, attempt);
                }
                return Ok(value);
            }
            Err(e) if attempt >= config.max_attempts || !e.is_retryable() => {
                tracing::error!("{} - failed after {} attempt(s): {}", name, attempt, e);
                return Err(e);
            }
            Err(e) => {
                let delay = backoff_delay(config, attempt, &mut rand::thread_rng());
                tracing::warn!(
                    "{} - attempt {} failed: {}. Retrying in {}ms",
                    name,
                    attempt,
                    e,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Navigates once and maps blocking statuses to typed errors
async fn navigate_once<P: Page>(
    page: &mut P,
    url: &str,
    timeout: Duration,
) -> Result<Navigation, NavigationError> {
    let navigation = page.goto(url, timeout).await?;

    match navigation.status {
        403 => Err(NavigationError::Blocked {
            url: url.to_string(),
            status: 403,
        }),
        429 => Err(NavigationError::RateLimited {
            url: url.to_string(),
        }),
        status if status >= 400 => Err(NavigationError::Http {
            url: url.to_string(),
            status,
        }),
        _ => Ok(navigation),
    }
}

/// Navigates `page` to `url` with retries
pub async fn navigate_with_retry<P: Page>(
    page: &mut P,
    url: &str,
    config: &RetryConfig,
    timeout: Duration,
) -> Result<Navigation, NavigationError> {
    let name = format!("Navigation to {}", url.chars().take(80).collect::<String>());
    let target = url.to_string();

    with_retry(config, &name, page, move |page, _| {
        let url = target.clone();
        Box::pin(async move { navigate_once(page, &url, timeout).await })
    })
    .await
}
