//! End-to-end scrape runs through the coordinator
//!
//! Runs use a paused tokio clock, so pacing, backoff and reading pauses
//! complete instantly.

use crate::support::{
    add_search, page_url, realtor_detail, realtor_listing_url, realtor_results, test_config,
    FixtureBrowser,
};
use listing_tracker::config::{BudgetConfig, Config, ProxyConfig};
use listing_tracker::crawler::Coordinator;
use listing_tracker::evasion::CircuitBreaker;
use listing_tracker::state::{BreakerState, ErrorCategory, ErrorSeverity};
use listing_tracker::storage::{SqliteStore, Store};
use listing_tracker::{ListingStatus, RunStatus, RunType, SourceFamily, TrackerError};
use tempfile::TempDir;

const LAVAL: &str = "https://www.realtor.ca/qc/laval/real-estate?TransactionTypeId=2";
const TERREBONNE: &str = "https://www.realtor.ca/qc/terrebonne/real-estate?TransactionTypeId=2";

fn coordinator(config: Config, browser: &FixtureBrowser, searches: &[(&str, &str)]) -> Coordinator<FixtureBrowser> {
    let mut store = SqliteStore::new_in_memory().unwrap();
    for (name, url) in searches {
        add_search(&mut store, name, SourceFamily::Realtor, url);
    }
    Coordinator::new(config, "test-hash".to_string(), store, browser.clone())
}

#[tokio::test(start_paused = true)]
async fn test_full_run_records_new_listings() {
    let browser = FixtureBrowser::new();
    browser.serve(
        &page_url(SourceFamily::Realtor, LAVAL, 1),
        realtor_results(&[("27000001", "$450,000"), ("27000002", "$389,900")]),
    );
    browser.serve(&realtor_listing_url("27000001"), realtor_detail(1987));
    browser.serve(&realtor_listing_url("27000002"), realtor_detail(2004));

    let coordinator = coordinator(test_config(), &browser, &[("Laval", LAVAL)]);
    let report = coordinator.run(RunType::Manual).await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.stats.searches_processed, 1);
    assert_eq!(report.stats.listings_found, 2);
    assert_eq!(report.stats.listings_new, 2);
    assert_eq!(report.stats.listings_updated, 0);
    assert_eq!(report.stats.listings_delisted, 0);
    assert!(report.errors.is_empty());

    // Page 2 is empty, which ends pagination
    assert_eq!(browser.visit_count(&page_url(SourceFamily::Realtor, LAVAL, 2)), 1);
    assert_eq!(browser.visit_count(&page_url(SourceFamily::Realtor, LAVAL, 3)), 0);
    assert_eq!(browser.visit_count(&realtor_listing_url("27000001")), 1);

    let store = coordinator.store();
    let store = store.lock().unwrap();

    let listing = store
        .find_listing(SourceFamily::Realtor, "27000001")
        .unwrap()
        .unwrap();
    assert_eq!(listing.status, ListingStatus::Active);
    assert_eq!(listing.current_price, Some(450_000));
    assert_eq!(listing.year_built, Some(1987));
    assert_eq!(listing.municipality.as_deref(), Some("Laval"));
    assert_eq!(listing.bedrooms, Some(3));

    let run = store.get_run(report.run_id).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.config_hash, "test-hash");
    assert_eq!(run.listings_new, 2);
    assert!(run.completed_at.is_some());
    assert!(store.find_running_run().unwrap().is_none());

    // One stealth context, opened and closed
    assert_eq!(browser.contexts(), (1, 1));
    assert_eq!(browser.init_scripts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_second_run_detects_price_change_and_delisting() {
    let browser = FixtureBrowser::new();
    let first_page = page_url(SourceFamily::Realtor, LAVAL, 1);
    browser.serve(
        &first_page,
        realtor_results(&[("27000001", "$450,000"), ("27000002", "$389,900")]),
    );

    let coordinator = coordinator(test_config(), &browser, &[("Laval", LAVAL)]);
    coordinator.run(RunType::Scheduled).await.unwrap();

    browser.serve(&first_page, realtor_results(&[("27000001", "$435,000")]));
    let report = coordinator.run(RunType::Scheduled).await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.stats.listings_new, 0);
    assert_eq!(report.stats.listings_updated, 1);
    assert_eq!(report.stats.listings_delisted, 1);

    // Known listings never have their detail page fetched again
    assert_eq!(browser.visit_count(&realtor_listing_url("27000001")), 1);

    let store = coordinator.store();
    let store = store.lock().unwrap();

    let kept = store
        .find_listing(SourceFamily::Realtor, "27000001")
        .unwrap()
        .unwrap();
    assert_eq!(kept.original_price, Some(450_000));
    assert_eq!(kept.current_price, Some(435_000));
    assert_eq!(kept.price_change_count, 1);

    let gone = store
        .find_listing(SourceFamily::Realtor, "27000002")
        .unwrap()
        .unwrap();
    assert_eq!(gone.status, ListingStatus::Delisted);
}

#[tokio::test(start_paused = true)]
async fn test_block_page_fails_search_and_feeds_breaker() {
    let browser = FixtureBrowser::new();
    browser.serve(
        &page_url(SourceFamily::Realtor, LAVAL, 1),
        "<html><body><h1>Access Denied</h1><p>Incapsula incident ID: 1234</p></body></html>",
    );

    let coordinator = coordinator(test_config(), &browser, &[("Laval", LAVAL)]);
    let report = coordinator.run(RunType::Manual).await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.stats.searches_processed, 0);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].severity, ErrorSeverity::Error);
    assert_eq!(report.errors[0].category, ErrorCategory::Blocked);

    let store = coordinator.store();
    let mut store = store.lock().unwrap();
    let breaker = CircuitBreaker::status(&mut *store, "realtor", chrono::Utc::now()).unwrap();
    assert_eq!(breaker.failure_count, 1);
    assert!(breaker
        .last_failure_reason
        .as_deref()
        .unwrap()
        .contains("block page"));
}

#[tokio::test(start_paused = true)]
async fn test_forbidden_status_is_retried_then_recorded() {
    let browser = FixtureBrowser::new();
    let first_page = page_url(SourceFamily::Realtor, LAVAL, 1);
    browser.serve_status(&first_page, 403, "<html><body>Forbidden</body></html>");

    let coordinator = coordinator(test_config(), &browser, &[("Laval", LAVAL)]);
    let report = coordinator.run(RunType::Manual).await.unwrap();

    // Three attempts with backoff before giving up
    assert_eq!(browser.visit_count(&first_page), 3);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].category, ErrorCategory::Blocked);
    assert_eq!(report.errors[0].context.http_status, Some(403));
}

#[tokio::test(start_paused = true)]
async fn test_consecutive_failures_abort_run() {
    let browser = FixtureBrowser::new();
    let blocked = "<html><body>Please complete the captcha</body></html>";
    let third = "https://www.realtor.ca/qc/blainville/real-estate?TransactionTypeId=2";
    for url in [LAVAL, TERREBONNE, third] {
        browser.serve(&page_url(SourceFamily::Realtor, url, 1), blocked);
    }

    let mut config = test_config();
    config.crawler.consecutive_failure_threshold = 2;

    let coordinator = coordinator(
        config,
        &browser,
        &[("Laval", LAVAL), ("Terrebonne", TERREBONNE), ("Blainville", third)],
    );
    let report = coordinator.run(RunType::Scheduled).await.unwrap();

    assert_eq!(report.status, RunStatus::Partial);
    assert_eq!(report.errors.len(), 3);
    assert_eq!(report.errors[2].severity, ErrorSeverity::Critical);
    assert_eq!(browser.visit_count(&page_url(SourceFamily::Realtor, third, 1)), 0);

    // The context is still closed after the abort
    assert_eq!(browser.contexts(), (1, 1));
}

#[tokio::test(start_paused = true)]
async fn test_open_breaker_skips_search() {
    let browser = FixtureBrowser::new();
    let first_page = page_url(SourceFamily::Realtor, LAVAL, 1);
    browser.serve(&first_page, realtor_results(&[("27000001", "$450,000")]));

    let config = test_config();
    let coordinator = coordinator(config.clone(), &browser, &[("Laval", LAVAL)]);

    {
        let store = coordinator.store();
        let mut store = store.lock().unwrap();
        let breaker = CircuitBreaker::new(config.circuit_breaker.clone());
        let now = chrono::Utc::now();
        for _ in 0..config.circuit_breaker.failure_threshold {
            breaker.record_failure(&mut *store, "realtor", "HTTP 403", now).unwrap();
        }
        let record = CircuitBreaker::status(&mut *store, "realtor", now).unwrap();
        assert_eq!(record.state, BreakerState::Open);
    }

    let report = coordinator.run(RunType::Manual).await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.stats.searches_processed, 0);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].severity, ErrorSeverity::Warning);
    assert_eq!(report.errors[0].category, ErrorCategory::Blocked);
    assert_eq!(browser.visit_count(&first_page), 0);
}

#[tokio::test(start_paused = true)]
async fn test_delisting_is_scoped_to_search_with_resurrection() {
    let browser = FixtureBrowser::new();
    let laval = page_url(SourceFamily::Realtor, LAVAL, 1);
    let terrebonne = page_url(SourceFamily::Realtor, TERREBONNE, 1);

    // Listing 27000009 appears in both searches
    browser.serve(&laval, realtor_results(&[("27000009", "$500,000")]));
    browser.serve(&terrebonne, realtor_results(&[("27000009", "$500,000")]));

    let mut store = SqliteStore::new_in_memory().unwrap();
    let laval_id = add_search(&mut store, "Laval", SourceFamily::Realtor, LAVAL);
    let terrebonne_id = add_search(&mut store, "Terrebonne", SourceFamily::Realtor, TERREBONNE);
    let coordinator = Coordinator::new(test_config(), "h".to_string(), store, browser.clone());

    coordinator.run(RunType::Scheduled).await.unwrap();

    // Laval no longer shows it, Terrebonne (crawled next) still does
    browser.serve(&laval, realtor_results(&[("27000010", "$300,000")]));
    let report = coordinator.run(RunType::Scheduled).await.unwrap();
    assert_eq!(report.stats.listings_delisted, 1);
    assert_eq!(report.stats.listings_new, 1);

    let store = coordinator.store();
    let store = store.lock().unwrap();
    let shared = store
        .find_listing(SourceFamily::Realtor, "27000009")
        .unwrap()
        .unwrap();

    // Resurrected by the Terrebonne sighting
    assert_eq!(shared.status, ListingStatus::Active);
    assert!(shared.delisted_at.is_none());

    let laval_membership = store.get_membership(shared.id, laval_id).unwrap().unwrap();
    let terrebonne_membership = store
        .get_membership(shared.id, terrebonne_id)
        .unwrap()
        .unwrap();
    assert!(!laval_membership.is_active);
    assert!(terrebonne_membership.is_active);

    let statuses: Vec<ListingStatus> = store
        .snapshots_for(shared.id)
        .unwrap()
        .into_iter()
        .map(|s| s.status)
        .collect();
    assert_eq!(
        statuses,
        vec![
            ListingStatus::Active,
            ListingStatus::Active,
            ListingStatus::Delisted,
            ListingStatus::Active,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_disabled_family_is_skipped() {
    let browser = FixtureBrowser::new();
    let centris_url = "https://www.centris.ca/en/properties~for-sale~laval";

    let mut config = test_config();
    config.sources.centris.enabled = false;

    let mut store = SqliteStore::new_in_memory().unwrap();
    add_search(&mut store, "Centris Laval", SourceFamily::Centris, centris_url);
    let coordinator = Coordinator::new(config, "h".to_string(), store, browser.clone());

    let report = coordinator.run(RunType::Manual).await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.stats.searches_processed, 0);
    assert!(browser.visits().is_empty());
    assert_eq!(browser.contexts(), (0, 0));
}

#[tokio::test(start_paused = true)]
async fn test_escaped_error_finalizes_failed() {
    let browser = FixtureBrowser::new();
    browser.fail_contexts();

    let coordinator = coordinator(test_config(), &browser, &[("Laval", LAVAL)]);
    let report = coordinator.run(RunType::Manual).await.unwrap();

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].is_critical());

    let store = coordinator.store();
    let store = store.lock().unwrap();
    let run = store.get_run(report.run_id).unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.completed_at.is_some());
    assert!(store.find_running_run().unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_run_in_progress_is_refused() {
    let browser = FixtureBrowser::new();
    let coordinator = coordinator(test_config(), &browser, &[]);

    let first = coordinator.start_run(RunType::Scheduled).unwrap();
    assert!(coordinator.is_run_in_progress().unwrap());

    match coordinator.start_run(RunType::Manual) {
        Err(TrackerError::RunInProgress(id)) => assert_eq!(id, first),
        other => panic!("expected RunInProgress, got {:?}", other),
    }

    let report = coordinator.execute_run(first).await.unwrap();
    assert_eq!(report.status, RunStatus::Completed);
    assert!(!coordinator.is_run_in_progress().unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_session_saved_after_run() {
    let dir = TempDir::new().unwrap();
    let browser = FixtureBrowser::new();
    browser.serve(
        &page_url(SourceFamily::Realtor, LAVAL, 1),
        realtor_results(&[("27000001", "$450,000")]),
    );

    let mut config = test_config();
    config.stealth.session_persistence = true;
    config.stealth.session_dir = dir.path().display().to_string();

    let coordinator = coordinator(config, &browser, &[("Laval", LAVAL)]);
    coordinator.run(RunType::Manual).await.unwrap();
    coordinator.run(RunType::Manual).await.unwrap();

    let raw = std::fs::read_to_string(dir.path().join("realtor-session.json")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["useCount"], 2);
    assert_eq!(json["cookies"][0]["name"], "visited");
}

#[tokio::test(start_paused = true)]
async fn test_skipped_cards_are_recorded_as_warnings() {
    let browser = FixtureBrowser::new();
    let first_page = page_url(SourceFamily::Realtor, LAVAL, 1);
    browser.serve(
        &first_page,
        realtor_results(&[("27000001", "$450,000"), ("27000002", "Call for price")]),
    );

    let coordinator = coordinator(test_config(), &browser, &[("Laval", LAVAL)]);
    let report = coordinator.run(RunType::Manual).await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.stats.listings_new, 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].severity, ErrorSeverity::Warning);
    assert_eq!(report.errors[0].category, ErrorCategory::Parse);
    assert_eq!(report.errors[0].context.search_id, Some(1));
    assert_eq!(report.errors[0].context.url.as_deref(), Some(first_page.as_str()));
}

#[tokio::test(start_paused = true)]
async fn test_unparseable_page_fails_search_without_delisting() {
    let browser = FixtureBrowser::new();
    let first_page = page_url(SourceFamily::Realtor, LAVAL, 1);
    browser.serve(
        &first_page,
        realtor_results(&[("27000001", "$450,000"), ("27000002", "$389,900")]),
    );

    let coordinator = coordinator(test_config(), &browser, &[("Laval", LAVAL)]);
    coordinator.run(RunType::Scheduled).await.unwrap();

    // Same cards, but no price can be read from any of them
    browser.serve(
        &first_page,
        realtor_results(&[("27000001", "Call for price"), ("27000002", "Call for price")]),
    );
    let report = coordinator.run(RunType::Scheduled).await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.stats.searches_processed, 0);
    assert_eq!(report.stats.listings_delisted, 0);
    assert_eq!(report.errors.len(), 2);
    assert_eq!(report.errors[0].severity, ErrorSeverity::Warning);
    assert_eq!(report.errors[0].category, ErrorCategory::Parse);
    assert_eq!(report.errors[1].severity, ErrorSeverity::Error);
    assert_eq!(report.errors[1].category, ErrorCategory::Parse);

    let store = coordinator.store();
    let store = store.lock().unwrap();
    for id in ["27000001", "27000002"] {
        let listing = store.find_listing(SourceFamily::Realtor, id).unwrap().unwrap();
        assert_eq!(listing.status, ListingStatus::Active);
        assert_eq!(store.snapshots_for(listing.id).unwrap().len(), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn test_malformed_criteria_fails_only_its_search() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tracker.db");
    let mut store = SqliteStore::new(&path).unwrap();

    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute(
        "INSERT INTO saved_searches (name, source, criteria, custom_url, is_active, created_at)
         VALUES ('Half baths', 'realtor', '{\"bathroomsMin\": 1.5}', NULL, 1, '2024-04-01T06:00:00+00:00')",
        [],
    )
    .unwrap();
    let malformed_id = conn.last_insert_rowid();
    drop(conn);

    add_search(&mut store, "Laval", SourceFamily::Realtor, LAVAL);

    let browser = FixtureBrowser::new();
    browser.serve(
        &page_url(SourceFamily::Realtor, LAVAL, 1),
        realtor_results(&[("27000001", "$450,000")]),
    );
    let coordinator = Coordinator::new(test_config(), "h".to_string(), store, browser.clone());

    let report = coordinator.run(RunType::Manual).await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.stats.searches_processed, 1);
    assert_eq!(report.stats.listings_new, 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].severity, ErrorSeverity::Error);
    assert_eq!(report.errors[0].category, ErrorCategory::Parse);
    assert_eq!(report.errors[0].context.search_id, Some(malformed_id));
}

#[tokio::test(start_paused = true)]
async fn test_request_budget_cut_does_not_delist_unfetched_pages() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tracker.db");

    let browser = FixtureBrowser::new();
    browser.serve(
        &page_url(SourceFamily::Realtor, LAVAL, 1),
        realtor_results(&[("27000001", "$450,000")]),
    );
    browser.serve(
        &page_url(SourceFamily::Realtor, LAVAL, 2),
        realtor_results(&[("27000002", "$389,900")]),
    );

    let mut store = SqliteStore::new(&path).unwrap();
    add_search(&mut store, "Laval", SourceFamily::Realtor, LAVAL);
    let first = Coordinator::new(test_config(), "h".to_string(), store, browser.clone());
    first.run(RunType::Scheduled).await.unwrap();
    drop(first);

    // Only page 1 fits in the budget
    let mut config = test_config();
    config.crawler.max_requests_per_run = 1;
    let store = SqliteStore::new(&path).unwrap();
    let second = Coordinator::new(config, "h".to_string(), store, browser.clone());
    let report = second.run(RunType::Scheduled).await.unwrap();

    assert_eq!(report.stats.searches_processed, 1);
    assert_eq!(report.stats.listings_found, 1);
    assert_eq!(report.stats.listings_delisted, 0);
    assert_eq!(browser.visit_count(&page_url(SourceFamily::Realtor, LAVAL, 2)), 1);

    let store = second.store();
    let store = store.lock().unwrap();
    let unfetched = store
        .find_listing(SourceFamily::Realtor, "27000002")
        .unwrap()
        .unwrap();
    assert_eq!(unfetched.status, ListingStatus::Active);
    assert_eq!(store.active_members(1).unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_proxy_budget_reopens_direct_context() {
    let browser = FixtureBrowser::new();
    browser.serve(
        &page_url(SourceFamily::Realtor, LAVAL, 1),
        realtor_results(&[("27000001", "$450,000")]),
    );
    browser.serve(
        &page_url(SourceFamily::Realtor, TERREBONNE, 1),
        realtor_results(&[("27000002", "$389,900")]),
    );

    // One search page (500 KB) crosses the 40% hard stop of 1 MB
    let mut config = test_config();
    config.proxy = ProxyConfig {
        enabled: true,
        host: "gate.example.com".to_string(),
        port: 7000,
        username: "user".to_string(),
        password: "secret".to_string(),
    };
    config.budget = BudgetConfig {
        enabled: true,
        monthly_limit_gb: 0.001,
        alert_threshold_percent: 20.0,
        hard_stop_percent: 40.0,
    };

    let coordinator = coordinator(
        config,
        &browser,
        &[("Laval", LAVAL), ("Terrebonne", TERREBONNE)],
    );
    let report = coordinator.run(RunType::Manual).await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.stats.searches_processed, 2);
    assert_eq!(browser.proxied_contexts(), vec![true, false]);
    assert_eq!(browser.contexts(), (2, 2));

    // Both contexts share the family's fingerprint
    let agents = browser.user_agents();
    assert_eq!(agents[0], agents[1]);
}
