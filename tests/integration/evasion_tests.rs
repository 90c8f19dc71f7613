//! Evasion state persisted across store handles

use chrono::{DateTime, Duration, TimeZone, Utc};
use listing_tracker::config::{
    BudgetConfig, CircuitBreakerConfig, FingerprintRotation, ProxyConfig,
};
use listing_tracker::evasion::{
    BudgetStatus, CircuitBreaker, FingerprintRotator, PageKind, ProxyBudgetTracker, FINGERPRINTS,
};
use listing_tracker::state::BreakerState;
use listing_tracker::storage::SqliteStore;
use tempfile::TempDir;

const SERVICE: &str = "centris";

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 7, 15, 10, 0, 0).unwrap()
}

#[test]
fn test_breaker_full_cycle() {
    let mut store = SqliteStore::new_in_memory().unwrap();
    let breaker = CircuitBreaker::new(CircuitBreakerConfig::default());
    let now = t0();

    // closed -> open after five consecutive failures
    for i in 0..5 {
        assert!(breaker.can_execute(&mut store, SERVICE, now).unwrap());
        breaker
            .record_failure(&mut store, SERVICE, &format!("HTTP 403 #{}", i), now)
            .unwrap();
    }
    let record = CircuitBreaker::status(&mut store, SERVICE, now).unwrap();
    assert_eq!(record.state, BreakerState::Open);
    assert_eq!(record.opened_at, Some(now));

    // Rejected while cooling down
    let later = now + Duration::minutes(29);
    assert!(!breaker.can_execute(&mut store, SERVICE, later).unwrap());

    // open -> half_open after thirty minutes, then back to open on failure
    let probe = now + Duration::minutes(30);
    assert!(breaker.can_execute(&mut store, SERVICE, probe).unwrap());
    assert_eq!(
        CircuitBreaker::status(&mut store, SERVICE, probe).unwrap().state,
        BreakerState::HalfOpen
    );
    breaker
        .record_failure(&mut store, SERVICE, "still blocked", probe)
        .unwrap();
    assert_eq!(
        CircuitBreaker::status(&mut store, SERVICE, probe).unwrap().state,
        BreakerState::Open
    );

    // half_open -> closed after three successes
    let retry = probe + Duration::minutes(31);
    assert!(breaker.can_execute(&mut store, SERVICE, retry).unwrap());
    for _ in 0..2 {
        breaker.record_success(&mut store, SERVICE, retry).unwrap();
        assert_eq!(
            CircuitBreaker::status(&mut store, SERVICE, retry).unwrap().state,
            BreakerState::HalfOpen
        );
    }
    breaker.record_success(&mut store, SERVICE, retry).unwrap();

    let record = CircuitBreaker::status(&mut store, SERVICE, retry).unwrap();
    assert_eq!(record.state, BreakerState::Closed);
    assert_eq!(record.failure_count, 0);
    assert!(record.opened_at.is_none());
}

#[test]
fn test_breaker_state_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("tracker.db");
    let breaker = CircuitBreaker::new(CircuitBreakerConfig {
        failure_threshold: 2,
        ..CircuitBreakerConfig::default()
    });

    {
        let mut store = SqliteStore::new(&db).unwrap();
        breaker.record_failure(&mut store, SERVICE, "timeout", t0()).unwrap();
        breaker.record_failure(&mut store, SERVICE, "timeout", t0()).unwrap();
    }

    let mut store = SqliteStore::new(&db).unwrap();
    assert!(!breaker.can_execute(&mut store, SERVICE, t0()).unwrap());

    CircuitBreaker::reset(&mut store, SERVICE, t0()).unwrap();
    assert!(breaker.can_execute(&mut store, SERVICE, t0()).unwrap());
}

#[test]
fn test_rotation_cycles_through_every_bundle() {
    let mut store = SqliteStore::new_in_memory().unwrap();
    let mut rotator = FingerprintRotator::new(FingerprintRotation::Moderate);

    let mut seen = Vec::new();
    for i in 0..FINGERPRINTS.len() as i64 {
        let now = t0() + Duration::minutes(i);
        let fingerprint = rotator.select(&mut store, now).unwrap();
        FingerprintRotator::record_use(&mut store, fingerprint.id, true, now).unwrap();
        seen.push(fingerprint.id);
    }

    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), FINGERPRINTS.len());

    let stats = FingerprintRotator::stats(&store).unwrap();
    assert_eq!(stats.used, FINGERPRINTS.len());
}

#[test]
fn test_budget_hard_stop_disables_proxy() {
    let mut store = SqliteStore::new_in_memory().unwrap();
    let tracker = ProxyBudgetTracker::new(
        ProxyConfig {
            enabled: true,
            host: "proxy.example.net".to_string(),
            port: 8080,
            username: "user".to_string(),
            password: "secret".to_string(),
        },
        BudgetConfig {
            enabled: true,
            // 1000 KB ceiling: two detail pages reach the hard stop
            monthly_limit_gb: 1000.0 / (1024.0 * 1024.0),
            alert_threshold_percent: 40.0,
            hard_stop_percent: 95.0,
        },
    );

    assert!(tracker.proxy_for(&mut store, t0()).unwrap().is_some());

    tracker.track(&mut store, PageKind::Search, t0()).unwrap();
    assert_eq!(tracker.status(&mut store, t0()).unwrap(), BudgetStatus::Warn);

    tracker.track(&mut store, PageKind::Detail, t0()).unwrap();
    assert_eq!(tracker.status(&mut store, t0()).unwrap(), BudgetStatus::Exhausted);
    assert!(tracker.proxy_for(&mut store, t0()).unwrap().is_none());

    // A new month starts from zero
    let next_month = Utc.with_ymd_and_hms(2024, 8, 1, 0, 0, 0).unwrap();
    assert_eq!(tracker.status(&mut store, next_month).unwrap(), BudgetStatus::Ok);
}
