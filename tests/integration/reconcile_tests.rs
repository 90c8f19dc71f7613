//! Reconciliation properties over an in-memory store

use chrono::{DateTime, Duration, TimeZone, Utc};
use listing_tracker::extract::RawListing;
use listing_tracker::reconcile::{reconcile, ReconcileOutcome};
use listing_tracker::search_url::SearchCriteria;
use listing_tracker::storage::{NewSavedSearch, SavedSearch, SqliteStore, Store};
use listing_tracker::{ListingStatus, SourceFamily};
use std::collections::HashMap;

fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 7, 0, 0).unwrap() + Duration::days(n)
}

fn card(id: &str, price: i64) -> RawListing {
    RawListing {
        natural_id: id.to_string(),
        detail_url: format!("https://www.centris.ca/en/houses~for-sale~laval/{}", id),
        address: "55 Boulevard Saint-Martin, Laval".to_string(),
        price,
        category: Some("House for sale".to_string()),
        bedrooms: None,
        bathrooms: None,
        photo_count: Some(24),
    }
}

fn setup() -> (SqliteStore, SavedSearch) {
    let mut store = SqliteStore::new_in_memory().unwrap();
    store
        .insert_saved_search(&NewSavedSearch {
            name: "Laval houses".to_string(),
            source: SourceFamily::Centris,
            criteria: SearchCriteria::default(),
            custom_url: None,
            is_active: true,
        })
        .unwrap();
    let search = store.active_saved_searches().unwrap().remove(0);
    (store, search)
}

#[test]
fn test_reconcile_is_idempotent() {
    let (mut store, search) = setup();
    let cards = vec![card("12345678", 525_000), card("23456789", 610_000)];

    let first = reconcile(&mut store, &search, &cards, &HashMap::new(), day(0)).unwrap();
    assert_eq!(first.new, 2);

    let second = reconcile(&mut store, &search, &cards, &HashMap::new(), day(1)).unwrap();
    assert_eq!(
        second,
        ReconcileOutcome {
            new: 0,
            updated: 0,
            delisted: 0,
            seen: 2
        }
    );

    let listing = store
        .find_listing(SourceFamily::Centris, "12345678")
        .unwrap()
        .unwrap();
    assert_eq!(listing.price_change_count, 0);
    assert_eq!(listing.status, ListingStatus::Active);

    // One snapshot per observation, one membership per pair
    assert_eq!(store.snapshots_for(listing.id).unwrap().len(), 2);
    assert_eq!(store.active_members(search.id).unwrap().len(), 2);
}

#[test]
fn test_price_change_counter_counts_real_changes() {
    let (mut store, search) = setup();

    for (n, price) in [100, 100, 150, 150, 120].into_iter().enumerate() {
        reconcile(
            &mut store,
            &search,
            &[card("34567890", price)],
            &HashMap::new(),
            day(n as i64),
        )
        .unwrap();
    }

    let listing = store
        .find_listing(SourceFamily::Centris, "34567890")
        .unwrap()
        .unwrap();
    assert_eq!(listing.price_change_count, 2);
    assert_eq!(listing.original_price, Some(100));
    assert_eq!(listing.current_price, Some(120));

    let prices: Vec<Option<i64>> = store
        .snapshots_for(listing.id)
        .unwrap()
        .into_iter()
        .map(|s| s.price)
        .collect();
    assert_eq!(
        prices,
        vec![Some(100), Some(100), Some(150), Some(150), Some(120)]
    );
}

#[test]
fn test_empty_extraction_delists_every_member() {
    let (mut store, search) = setup();
    reconcile(
        &mut store,
        &search,
        &[card("12345678", 1), card("23456789", 2)],
        &HashMap::new(),
        day(0),
    )
    .unwrap();

    let outcome = reconcile(&mut store, &search, &[], &HashMap::new(), day(1)).unwrap();
    assert_eq!(outcome.delisted, 2);
    assert!(store.active_members(search.id).unwrap().is_empty());

    let counts = store.count_listings_by_status().unwrap();
    assert_eq!(counts.get(&ListingStatus::Delisted), Some(&2));
}
