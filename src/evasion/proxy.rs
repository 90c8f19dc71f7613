//! Proxy settings and monthly bandwidth budget
//!
//! Bandwidth is estimated per page kind rather than measured. Usage is
//! persisted in the store and restarts from zero each calendar month.

use crate::browser::ProxySettings;
use crate::config::{BudgetConfig, ProxyConfig};
use crate::evasion::PageKind;
use crate::storage::{ProxyBudgetRecord, Store, StoreResult};
use chrono::{DateTime, Datelike, Utc};

const KB_PER_GB: f64 = 1024.0 * 1024.0;

/// Position of current usage relative to the configured thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetStatus {
    Ok,
    /// At or above the alert threshold, below the hard stop
    Warn,
    /// At or above the hard stop
    Exhausted,
}

/// Snapshot of bandwidth usage for reporting
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetUsage {
    pub enabled: bool,
    pub usage_gb: f64,
    pub limit_gb: f64,
    pub usage_percent: f64,
    pub status: BudgetStatus,
}

/// Tracks proxy bandwidth against the monthly ceiling
#[derive(Debug, Clone)]
pub struct ProxyBudgetTracker {
    proxy: ProxyConfig,
    budget: BudgetConfig,
}

impl ProxyBudgetTracker {
    pub fn new(proxy: ProxyConfig, budget: BudgetConfig) -> Self {
        Self { proxy, budget }
    }

    /// Loads the budget record, starting a fresh month when needed
    fn current<S: Store>(&self, store: &mut S, now: DateTime<Utc>) -> StoreResult<ProxyBudgetRecord> {
        let record = match store.load_proxy_budget()? {
            Some(record) => record,
            None => {
                let record = ProxyBudgetRecord {
                    monthly_usage_gb: 0.0,
                    last_reset_at: now,
                };
                store.save_proxy_budget(&record)?;
                return Ok(record);
            }
        };

        let reset = &record.last_reset_at;
        if reset.month() != now.month() || reset.year() != now.year() {
            tracing::info!(
                "New month detected, resetting bandwidth counter (was {:.2}GB)",
                record.monthly_usage_gb
            );
            let fresh = ProxyBudgetRecord {
                monthly_usage_gb: 0.0,
                last_reset_at: now,
            };
            store.save_proxy_budget(&fresh)?;
            return Ok(fresh);
        }

        Ok(record)
    }

    fn percent(&self, usage_gb: f64) -> f64 {
        usage_gb / self.budget.monthly_limit_gb * 100.0
    }

    fn classify(&self, usage_gb: f64) -> BudgetStatus {
        let percent = self.percent(usage_gb);
        if percent >= self.budget.hard_stop_percent {
            BudgetStatus::Exhausted
        } else if percent >= self.budget.alert_threshold_percent {
            BudgetStatus::Warn
        } else {
            BudgetStatus::Ok
        }
    }

    /// Adds the estimated size of one page load
    pub fn track<S: Store>(
        &self,
        store: &mut S,
        kind: PageKind,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        if !self.budget.enabled {
            return Ok(());
        }

        let mut record = self.current(store, now)?;
        record.monthly_usage_gb += kind.estimated_kb() as f64 / KB_PER_GB;
        store.save_proxy_budget(&record)?;

        let usage = record.monthly_usage_gb;
        match self.classify(usage) {
            BudgetStatus::Ok => {}
            BudgetStatus::Warn => tracing::warn!(
                "Bandwidth usage at {:.1}% ({:.2}GB / {}GB)",
                self.percent(usage),
                usage,
                self.budget.monthly_limit_gb
            ),
            BudgetStatus::Exhausted => tracing::error!(
                "Bandwidth budget exceeded: {:.2}GB / {}GB, proxy disabled until next month",
                usage,
                self.budget.monthly_limit_gb
            ),
        }

        Ok(())
    }

    /// Current budget status; always `Ok` when budgeting is disabled
    pub fn status<S: Store>(&self, store: &mut S, now: DateTime<Utc>) -> StoreResult<BudgetStatus> {
        if !self.budget.enabled {
            return Ok(BudgetStatus::Ok);
        }

        let record = self.current(store, now)?;
        Ok(self.classify(record.monthly_usage_gb))
    }

    pub fn usage<S: Store>(&self, store: &mut S, now: DateTime<Utc>) -> StoreResult<BudgetUsage> {
        let record = self.current(store, now)?;
        let status = if self.budget.enabled {
            self.classify(record.monthly_usage_gb)
        } else {
            BudgetStatus::Ok
        };

        Ok(BudgetUsage {
            enabled: self.budget.enabled,
            usage_gb: record.monthly_usage_gb,
            limit_gb: self.budget.monthly_limit_gb,
            usage_percent: if self.budget.enabled {
                self.percent(record.monthly_usage_gb)
            } else {
                0.0
            },
            status,
        })
    }

    /// Proxy to use for a new context
    ///
    /// `None` when the proxy is disabled or the budget is exhausted; the
    /// caller then connects directly.
    pub fn proxy_for<S: Store>(
        &self,
        store: &mut S,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<ProxySettings>> {
        if !self.proxy.enabled {
            return Ok(None);
        }

        if self.status(store, now)? == BudgetStatus::Exhausted {
            tracing::warn!("Monthly bandwidth budget exceeded, proxy disabled");
            return Ok(None);
        }

        Ok(Some(ProxySettings {
            server: format!("http://{}:{}", self.proxy.host, self.proxy.port),
            username: self.proxy.username.clone(),
            password: self.proxy.password.clone(),
        }))
    }
}
