//! Per-service circuit breaker persisted in the store
//!
//! State machine:
//! - closed -> open after `failure-threshold` consecutive failures
//! - open -> half_open on the first check after `half-open-after-secs`
//! - half_open -> closed after `success-threshold` consecutive successes
//! - half_open -> open on any failure

use crate::config::CircuitBreakerConfig;
use crate::state::BreakerState;
use crate::storage::{BreakerRecord, Store, StoreResult};
use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self { config }
    }

    fn half_open_after(&self) -> Duration {
        Duration::seconds(self.config.half_open_after_secs as i64)
    }

    fn reset_after(&self) -> Duration {
        Duration::seconds(self.config.reset_after_secs as i64)
    }

    fn load_or_init<S: Store>(
        store: &mut S,
        service: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<BreakerRecord> {
        match store.load_breaker(service)? {
            Some(record) => Ok(record),
            None => {
                let record = BreakerRecord::closed(now);
                store.save_breaker(service, &record)?;
                Ok(record)
            }
        }
    }

    /// Whether a request to `service` may proceed
    ///
    /// An open breaker whose cool-down has elapsed moves to half-open and
    /// allows the probe. A rejected check does not count as a failure.
    pub fn can_execute<S: Store>(
        &self,
        store: &mut S,
        service: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut record = Self::load_or_init(store, service, now)?;

        match record.state {
            BreakerState::Closed | BreakerState::HalfOpen => Ok(true),
            BreakerState::Open => {
                let cooled_down = record
                    .opened_at
                    .is_some_and(|opened| now.signed_duration_since(opened) >= self.half_open_after());

                if cooled_down {
                    record.state = BreakerState::HalfOpen;
                    store.save_breaker(service, &record)?;
                    tracing::info!(service, "Circuit breaker open -> half_open (testing recovery)");
                    Ok(true)
                } else {
                    tracing::debug!(service, "Circuit breaker open, request rejected");
                    Ok(false)
                }
            }
        }
    }

    pub fn record_success<S: Store>(
        &self,
        store: &mut S,
        service: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut record = Self::load_or_init(store, service, now)?;

        if record.state == BreakerState::Closed
            && now.signed_duration_since(record.last_checked_at) >= self.reset_after()
        {
            record.success_count = 1;
            record.failure_count = 0;
            record.last_checked_at = now;
            return store.save_breaker(service, &record);
        }

        record.success_count += 1;
        record.failure_count = 0;
        record.last_checked_at = now;

        if record.state == BreakerState::HalfOpen
            && record.success_count >= self.config.success_threshold
        {
            record.state = BreakerState::Closed;
            record.opened_at = None;
            tracing::info!(
                service,
                "Circuit breaker half_open -> closed ({} consecutive successes)",
                record.success_count
            );
        }

        store.save_breaker(service, &record)
    }

    pub fn record_failure<S: Store>(
        &self,
        store: &mut S,
        service: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut record = Self::load_or_init(store, service, now)?;

        record.failure_count += 1;
        record.success_count = 0;
        record.last_failure_reason = Some(reason.to_string());
        record.last_checked_at = now;

        match record.state {
            BreakerState::HalfOpen => {
                record.state = BreakerState::Open;
                record.opened_at = Some(now);
                tracing::warn!(service, "Circuit breaker half_open -> open (failed during recovery test)");
            }
            BreakerState::Closed if record.failure_count >= self.config.failure_threshold => {
                record.state = BreakerState::Open;
                record.opened_at = Some(now);
                tracing::error!(
                    service,
                    "Circuit breaker closed -> open ({} failures, threshold {}); last failure: {}",
                    record.failure_count,
                    self.config.failure_threshold,
                    reason
                );
            }
            _ => {}
        }

        store.save_breaker(service, &record)
    }

    /// Forces the breaker closed with cleared counters
    pub fn reset<S: Store>(store: &mut S, service: &str, now: DateTime<Utc>) -> StoreResult<()> {
        store.save_breaker(service, &BreakerRecord::closed(now))?;
        tracing::info!(service, "Circuit breaker manually reset to closed");
        Ok(())
    }

    pub fn status<S: Store>(
        store: &mut S,
        service: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<BreakerRecord> {
        Self::load_or_init(store, service, now)
    }
}
