//! Run controller - scrape run orchestration
//!
//! This module drives a scrape run end to end:
//! - Creating the run record and refusing concurrent runs
//! - Opening one browser context per source family with its evasion setup
//! - Paginating each saved search and fetching details of new listings
//! - Reconciling each search and aggregating statistics
//! - Finalizing the run record and pinging the liveness endpoint

use crate::browser::{Browser, BrowserContext, Page, ProxySettings};
use crate::config::Config;
use crate::evasion::{
    basic_headers, navigate_with_retry, stealth_headers, stealth_script, BudgetStatus,
    CircuitBreaker, Fingerprint, FingerprintRotator, HumanBehavior, Pacer, PageKind, ProxyBudgetTracker,
    SessionStore,
};
use crate::extract::{extractor_for, BlockCheck, BlockDetector, DetailRecord, Extractor, RawListing};
use crate::healthcheck::{Healthcheck, PingStatus};
use crate::reconcile::{plan_new, reconcile, reconcile_partial};
use crate::search_url::{build_search_url, with_page};
use crate::state::{
    ErrorCategory, ErrorSeverity, RunStats, RunStatus, RunType, ScrapeError, SourceFamily,
};
use crate::storage::{SavedSearch, SqliteStore, Store, StoreResult};
use crate::{Result, TrackerError};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Final state of an executed run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: i64,
    pub status: RunStatus,
    pub stats: RunStats,
    pub errors: Vec<ScrapeError>,
}

/// Mutable state owned by one run
struct RunContext {
    stats: RunStats,
    errors: Vec<ScrapeError>,
    requests: u32,
    consecutive_failures: u32,
    aborted: bool,
    pacer: Pacer,
    rotator: FingerprintRotator,
    human: HumanBehavior,
}

/// How a single saved search ended without a hard failure
enum SearchOutcome {
    Reconciled,
    /// Skipped because the family's breaker is open
    Skipped,
}

/// Why a context stopped taking searches
enum ContextEnd {
    Finished,
    /// The proxy budget ran out; searches from `next` on still need a context
    ProxyExhausted { next: usize },
}

/// Identity a family's context was opened with
struct FamilySetup {
    family: SourceFamily,
    stealth: bool,
    proxied: bool,
    fingerprint: &'static Fingerprint,
}

impl FamilySetup {
    /// Fingerprint id whose usage is tracked, only for stealth families
    fn tracked_fingerprint(&self) -> Option<&'static str> {
        self.stealth.then_some(self.fingerprint.id)
    }
}

/// Main run coordinator structure
pub struct Coordinator<B: Browser> {
    config: Arc<Config>,
    config_hash: String,
    store: Arc<Mutex<SqliteStore>>,
    browser: B,
    block_check: Box<dyn BlockCheck>,
    breaker: CircuitBreaker,
    budget: ProxyBudgetTracker,
    sessions: Option<SessionStore>,
    healthcheck: Healthcheck,
}

impl<B: Browser> Coordinator<B> {
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `config` - The tracker configuration
    /// * `config_hash` - Hash of the configuration file, stored on each run
    /// * `store` - The opened listing store
    /// * `browser` - Browser used to open one context per family
    pub fn new(config: Config, config_hash: String, store: SqliteStore, browser: B) -> Self {
        let sessions = config.stealth.session_persistence.then(|| {
            SessionStore::new(&config.stealth.session_dir, config.stealth.session_max_age_days)
        });

        Self {
            block_check: Box::new(BlockDetector::new(&config.crawler.block_markers)),
            breaker: CircuitBreaker::new(config.circuit_breaker.clone()),
            budget: ProxyBudgetTracker::new(config.proxy.clone(), config.budget.clone()),
            healthcheck: Healthcheck::new(&config.healthcheck),
            sessions,
            config: Arc::new(config),
            config_hash,
            store: Arc::new(Mutex::new(store)),
            browser,
        }
    }

    /// Replaces the block-page predicate
    pub fn with_block_check(mut self, block_check: Box<dyn BlockCheck>) -> Self {
        self.block_check = block_check;
        self
    }

    /// Shared handle to the store
    pub fn store(&self) -> Arc<Mutex<SqliteStore>> {
        self.store.clone()
    }

    /// Runs `f` with the store locked; the lock never spans an await
    fn with_store<T>(&self, f: impl FnOnce(&mut SqliteStore) -> StoreResult<T>) -> Result<T> {
        let mut store = self.store.lock()?;
        Ok(f(&mut store)?)
    }

    /// True if any run is currently `running`
    pub fn is_run_in_progress(&self) -> Result<bool> {
        Ok(self.with_store(|s| s.find_running_run())?.is_some())
    }

    /// Creates a `running` run record and returns its ID
    ///
    /// Fails with `RunInProgress` if another run is already running.
    pub fn start_run(&self, run_type: RunType) -> Result<i64> {
        let mut store = self.store.lock()?;

        if let Some(running) = store.find_running_run()? {
            return Err(TrackerError::RunInProgress(running));
        }

        let run_id = store.create_run(run_type, &self.config_hash)?;
        tracing::info!("Created {} run {}", run_type.to_db_string(), run_id);
        Ok(run_id)
    }

    /// Starts and executes a run
    pub async fn run(&self, run_type: RunType) -> Result<RunReport> {
        let run_id = self.start_run(run_type)?;
        self.execute_run(run_id).await
    }

    /// Performs the crawl for an existing run and finalizes its record
    ///
    /// The record is finalized whatever happens during the crawl. An error
    /// escaping the crawl is appended as a critical entry and the run ends
    /// `failed`.
    pub async fn execute_run(&self, run_id: i64) -> Result<RunReport> {
        tracing::info!("Starting scrape run {}", run_id);
        let start_time = std::time::Instant::now();

        let mut run = RunContext {
            stats: RunStats::default(),
            errors: Vec::new(),
            requests: 0,
            consecutive_failures: 0,
            aborted: false,
            pacer: Pacer::new(self.config.timing.clone()),
            rotator: FingerprintRotator::new(self.config.stealth.fingerprint_rotation),
            human: HumanBehavior::new(&self.config.stealth),
        };

        let status = match self.crawl(&mut run).await {
            Ok(()) => RunStats::final_status(&run.errors),
            Err(e) => {
                tracing::error!("Scrape run {} failed: {}", run_id, e);
                run.errors.push(
                    ScrapeError::new(ErrorSeverity::Critical, e.category(), e.to_string())
                        .with_http_status(e.http_status()),
                );
                RunStatus::Failed
            }
        };

        let finalized = self.with_store(|s| s.finalize_run(run_id, status, &run.stats, &run.errors));

        let ping = match (&finalized, status) {
            (Ok(()), RunStatus::Completed | RunStatus::Partial) => PingStatus::Success,
            _ => PingStatus::Fail,
        };
        self.healthcheck.ping(ping).await;

        finalized?;

        tracing::info!(
            "Run {} {} in {:.1}s: {} searches, {} found, {} new, {} updated, {} delisted, {} errors",
            run_id,
            status,
            start_time.elapsed().as_secs_f64(),
            run.stats.searches_processed,
            run.stats.listings_found,
            run.stats.listings_new,
            run.stats.listings_updated,
            run.stats.listings_delisted,
            run.errors.len()
        );

        Ok(RunReport {
            run_id,
            status,
            stats: run.stats,
            errors: run.errors,
        })
    }

    /// Crawls every enabled family in order of first appearance
    async fn crawl(&self, run: &mut RunContext) -> Result<()> {
        let searches = self.with_store(|s| s.active_saved_searches())?;

        let mut families: Vec<SourceFamily> = Vec::new();
        for search in &searches {
            if !families.contains(&search.source) {
                families.push(search.source);
            }
        }

        for family in families {
            if run.aborted {
                break;
            }

            if !self.config.source(family).enabled {
                tracing::info!("Source {} is disabled, skipping its searches", family);
                continue;
            }

            let family_searches: Vec<&SavedSearch> =
                searches.iter().filter(|s| s.source == family).collect();

            self.crawl_family(run, family, &family_searches).await?;
        }

        Ok(())
    }

    /// Crawls one family's searches in a dedicated browser context
    ///
    /// The fingerprint is chosen once. If the proxy budget runs out while a
    /// proxied context is open, that context is closed and the remaining
    /// searches continue in a direct one.
    async fn crawl_family(
        &self,
        run: &mut RunContext,
        family: SourceFamily,
        searches: &[&SavedSearch],
    ) -> Result<()> {
        let stealth = self.config.source(family).stealth;

        let fingerprint = if stealth {
            self.with_store(|s| run.rotator.select(s, Utc::now()))?
        } else {
            Fingerprint::primary()
        };

        let mut remaining = searches;
        let mut allow_proxy = stealth;

        while !remaining.is_empty() {
            let proxy = if allow_proxy {
                self.with_store(|s| self.budget.proxy_for(s, Utc::now()))?
            } else {
                None
            };

            let setup = FamilySetup {
                family,
                stealth,
                proxied: proxy.is_some(),
                fingerprint,
            };

            match self.crawl_with_context(run, &setup, proxy, remaining).await? {
                ContextEnd::Finished => break,
                ContextEnd::ProxyExhausted { next } => {
                    tracing::warn!(
                        "Proxy budget exhausted, continuing {} {} searches without proxy",
                        remaining.len() - next,
                        family
                    );
                    remaining = &remaining[next..];
                    allow_proxy = false;
                }
            }
        }

        Ok(())
    }

    /// Opens a context, crawls `searches` in it, then saves and closes it
    async fn crawl_with_context(
        &self,
        run: &mut RunContext,
        setup: &FamilySetup,
        proxy: Option<ProxySettings>,
        searches: &[&SavedSearch],
    ) -> Result<ContextEnd> {
        let family = setup.family;
        let headers = if setup.stealth {
            stealth_headers(setup.fingerprint)
        } else {
            basic_headers()
        };

        tracing::info!(
            "Opening {} context (fingerprint {}, stealth {}, proxied {})",
            family,
            setup.fingerprint.id,
            setup.stealth,
            setup.proxied
        );

        let mut context = self
            .browser
            .new_context(setup.fingerprint.context_options(headers, proxy))
            .await?;

        let result = self.crawl_in_context(run, setup, &mut context, searches).await;

        if let Some(sessions) = &self.sessions {
            if let Err(e) = sessions.save(&context, family, Utc::now()).await {
                tracing::warn!("Failed to save {} session: {}", family, e);
            }
        }

        if let Err(e) = context.close().await {
            tracing::warn!("Failed to close {} context: {}", family, e);
        }

        result
    }

    async fn crawl_in_context(
        &self,
        run: &mut RunContext,
        setup: &FamilySetup,
        context: &mut B::Context,
        searches: &[&SavedSearch],
    ) -> Result<ContextEnd> {
        if setup.stealth {
            context
                .add_init_script(&stealth_script(setup.fingerprint))
                .await?;
        }

        if let Some(sessions) = &self.sessions {
            sessions.restore(context, setup.family, Utc::now()).await;
        }

        if setup.stealth && self.config.stealth.session_warmup {
            self.warm_up(run, setup, context).await?;
        }

        let extractor = extractor_for(setup.family);

        for (index, search) in searches.iter().enumerate() {
            if run.aborted {
                break;
            }

            if run.requests >= self.config.crawler.max_requests_per_run {
                tracing::info!(
                    "Request budget of {} spent, stopping",
                    self.config.crawler.max_requests_per_run
                );
                break;
            }

            if setup.proxied
                && self.with_store(|s| self.budget.status(s, Utc::now()))? == BudgetStatus::Exhausted
            {
                return Ok(ContextEnd::ProxyExhausted { next: index });
            }

            tracing::info!("Processing saved search {} ({})", search.id, search.name);

            match self
                .process_search(run, setup, context, extractor.as_ref(), search)
                .await
            {
                Ok(SearchOutcome::Reconciled) => {
                    run.consecutive_failures = 0;
                }
                Ok(SearchOutcome::Skipped) => {}
                Err(e) => {
                    tracing::error!("Saved search {} failed: {}", search.id, e);
                    run.errors.push(
                        ScrapeError::new(ErrorSeverity::Error, e.category(), e.to_string())
                            .with_search(search.id)
                            .with_http_status(e.http_status()),
                    );
                    run.consecutive_failures += 1;

                    let threshold = self.config.crawler.consecutive_failure_threshold;
                    if run.consecutive_failures >= threshold {
                        tracing::error!(
                            "{} consecutive search failures, aborting run",
                            run.consecutive_failures
                        );
                        run.errors.push(ScrapeError::new(
                            ErrorSeverity::Critical,
                            ErrorCategory::Unknown,
                            format!(
                                "Aborted after {} consecutive search failures",
                                run.consecutive_failures
                            ),
                        ));
                        run.aborted = true;
                    }
                }
            }
        }

        Ok(ContextEnd::Finished)
    }

    /// Visits the family home page before the first search
    async fn warm_up(
        &self,
        run: &mut RunContext,
        setup: &FamilySetup,
        context: &mut B::Context,
    ) -> Result<()> {
        let mut page = context.new_page().await?;
        let url = setup.family.origin();

        run.pacer.pace(PageKind::Warmup).await;
        run.requests += 1;

        match navigate_with_retry(&mut page, url, &self.config.retry, self.navigation_timeout()).await {
            Ok(_) => {
                self.track_bandwidth(setup, PageKind::Warmup)?;
                if run.human.is_enabled() {
                    if let Err(e) = run.human.interact(&mut page).await {
                        tracing::debug!("Warm-up interaction failed: {}", e);
                    }
                }
                tracing::info!("Warmed up {} session", setup.family);
            }
            Err(e) => tracing::warn!("Warm-up of {} failed: {}", setup.family, e),
        }

        Ok(())
    }

    fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.config.crawler.navigation_timeout_ms)
    }

    fn track_bandwidth(&self, setup: &FamilySetup, kind: PageKind) -> Result<()> {
        if setup.proxied {
            self.with_store(|s| self.budget.track(s, kind, Utc::now()))?;
        }
        Ok(())
    }

    fn record_page_success(&self, setup: &FamilySetup) -> Result<()> {
        let service = setup.family.service_name();
        self.with_store(|s| {
            let now = Utc::now();
            self.breaker.record_success(s, service, now)?;
            if let Some(id) = setup.tracked_fingerprint() {
                FingerprintRotator::record_use(s, id, true, now)?;
            }
            Ok(())
        })
    }

    fn record_page_failure(&self, setup: &FamilySetup, reason: &str) -> Result<()> {
        let service = setup.family.service_name();
        self.with_store(|s| {
            let now = Utc::now();
            self.breaker.record_failure(s, service, reason, now)?;
            if let Some(id) = setup.tracked_fingerprint() {
                FingerprintRotator::record_use(s, id, false, now)?;
            }
            Ok(())
        })
    }

    /// Paginates one saved search, fetches new listing details and reconciles
    async fn process_search(
        &self,
        run: &mut RunContext,
        setup: &FamilySetup,
        context: &mut B::Context,
        extractor: &dyn Extractor,
        search: &SavedSearch,
    ) -> Result<SearchOutcome> {
        let family = setup.family;
        let service = family.service_name();
        let criteria = search.criteria()?;
        let base_url = build_search_url(family, &criteria, search.custom_url.as_deref())?;

        if !self.with_store(|s| self.breaker.can_execute(s, service, Utc::now()))? {
            tracing::warn!("Circuit breaker open for {}, skipping search {}", service, search.id);
            run.errors.push(
                ScrapeError::new(
                    ErrorSeverity::Warning,
                    ErrorCategory::Blocked,
                    format!("Circuit breaker open for {}, search skipped", service),
                )
                .with_search(search.id),
            );
            return Ok(SearchOutcome::Skipped);
        }

        let mut page = context.new_page().await?;
        let mut extracted: Vec<RawListing> = Vec::new();
        let max_pages = self.config.crawler.max_pages_per_search;
        let max_requests = self.config.crawler.max_requests_per_run;
        let mut truncated = false;

        for page_number in 1..=max_pages {
            if run.requests >= max_requests {
                tracing::info!("Request budget spent during search {}", search.id);
                truncated = true;
                break;
            }

            let url = with_page(&base_url, family, page_number);
            run.pacer.pace(PageKind::Search).await;
            run.requests += 1;

            if let Err(e) =
                navigate_with_retry(&mut page, url.as_str(), &self.config.retry, self.navigation_timeout()).await
            {
                self.record_page_failure(setup, &e.to_string())?;
                return Err(e.into());
            }
            self.track_bandwidth(setup, PageKind::Search)?;

            if setup.stealth && run.human.is_enabled() {
                if let Err(e) = run.human.interact(&mut page).await {
                    tracing::debug!("Page interaction failed: {}", e);
                }
            }

            let html = page.content().await?;
            let extraction = extractor.extract_search_results(&html);

            if extraction.is_empty_page() {
                let text = page.body_text().await?;
                if let Some(marker) = self.block_check.blocked_marker(&text) {
                    tracing::warn!("Block page detected at {} (marker: {})", url, marker);
                    self.record_page_failure(setup, &format!("block page detected ({})", marker))?;
                    return Err(TrackerError::Blocked {
                        url: url.to_string(),
                    });
                }

                self.record_page_success(setup)?;
                tracing::debug!("No cards on page {}, end of results", page_number);
                break;
            }

            self.record_page_success(setup)?;

            if extraction.cards_failed > 0 {
                tracing::warn!(
                    "{} of {} cards skipped on page {}",
                    extraction.cards_failed,
                    extraction.cards_seen,
                    page_number
                );
                run.errors.push(
                    ScrapeError::new(
                        ErrorSeverity::Warning,
                        ErrorCategory::Parse,
                        format!(
                            "{} of {} cards could not be parsed on page {}",
                            extraction.cards_failed, extraction.cards_seen, page_number
                        ),
                    )
                    .with_search(search.id)
                    .with_url(url.as_str()),
                );
            }

            // Cards without a single parsed listing mean the layout changed;
            // reconciling would delist the whole search.
            if extraction.listings.is_empty() {
                return Err(TrackerError::Unparseable {
                    url: url.to_string(),
                    cards: extraction.cards_seen,
                });
            }
            tracing::debug!(
                "Page {} of search {}: {} listings",
                page_number,
                search.id,
                extraction.listings.len()
            );
            extracted.extend(extraction.listings);
        }

        let fresh: Vec<RawListing> = self.with_store(|s| {
            plan_new(s, family, &extracted).map(|fresh| fresh.into_iter().cloned().collect())
        })?;

        let details = self
            .fetch_details(run, setup, context, extractor, search, &fresh)
            .await?;

        let outcome = self.with_store(|s| {
            if truncated {
                reconcile_partial(s, search, &extracted, &details, Utc::now())
            } else {
                reconcile(s, search, &extracted, &details, Utc::now())
            }
        })?;

        run.stats.searches_processed += 1;
        run.stats.listings_found += outcome.seen;
        run.stats.listings_new += outcome.new;
        run.stats.listings_updated += outcome.updated;
        run.stats.listings_delisted += outcome.delisted;

        tracing::info!(
            "Search {} reconciled: {} seen, {} new, {} updated, {} delisted",
            search.id,
            outcome.seen,
            outcome.new,
            outcome.updated,
            outcome.delisted
        );

        Ok(SearchOutcome::Reconciled)
    }

    /// Fetches detail pages of new listings; failures only cost the details
    async fn fetch_details(
        &self,
        run: &mut RunContext,
        setup: &FamilySetup,
        context: &mut B::Context,
        extractor: &dyn Extractor,
        search: &SavedSearch,
        fresh: &[RawListing],
    ) -> Result<HashMap<String, DetailRecord>> {
        let mut details = HashMap::new();
        if fresh.is_empty() {
            return Ok(details);
        }

        let max_requests = self.config.crawler.max_requests_per_run;
        let mut page = context.new_page().await?;

        for (index, listing) in fresh.iter().enumerate() {
            if run.requests >= max_requests {
                tracing::info!(
                    "Request budget spent, {} new listings stored without details",
                    fresh.len() - index
                );
                break;
            }

            run.pacer.pace(PageKind::Detail).await;
            run.requests += 1;

            let navigation = navigate_with_retry(
                &mut page,
                &listing.detail_url,
                &self.config.retry,
                self.navigation_timeout(),
            )
            .await;

            let html = match navigation {
                Ok(_) => {
                    self.track_bandwidth(setup, PageKind::Detail)?;
                    if setup.stealth && run.human.is_enabled() {
                        if let Err(e) = run.human.interact(&mut page).await {
                            tracing::debug!("Detail interaction failed: {}", e);
                        }
                    }
                    page.content().await.map_err(TrackerError::from)
                }
                Err(e) => Err(e.into()),
            };

            match html {
                Ok(html) => {
                    details.insert(listing.natural_id.clone(), extractor.extract_detail(&html));
                }
                Err(e) => {
                    tracing::warn!(
                        "Detail fetch failed for {}, storing without details: {}",
                        listing.natural_id,
                        e
                    );
                    run.errors.push(
                        ScrapeError::new(ErrorSeverity::Warning, e.category(), e.to_string())
                            .with_search(search.id)
                            .with_url(listing.detail_url.clone())
                            .with_natural_id(listing.natural_id.clone())
                            .with_http_status(e.http_status()),
                    );
                }
            }
        }

        Ok(details)
    }
}
