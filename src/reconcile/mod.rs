//! Reconciliation of extracted listings against the store
//!
//! This module is the only writer of listings, snapshots and memberships.
//! One call handles one saved search inside one transaction:
//! - Unknown natural ids become new active listings
//! - Known ones are re-sighted (price tracked, status forced active)
//! - Active members of the search that were not extracted are delisted
//!
//! Memberships of other searches are never touched, and a re-sighting by any
//! search brings a delisted listing back to active.

use crate::extract::{DetailRecord, RawListing};
use crate::state::{ListingStatus, SourceFamily};
use crate::storage::{NewListing, SavedSearch, Store, StoreResult};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

/// Counters produced by one reconciliation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Listings inserted for the first time
    pub new: u32,
    /// Existing listings whose price changed
    pub updated: u32,
    /// Listings moved from active to delisted
    pub delisted: u32,
    /// Distinct listings extracted for the search
    pub seen: u32,
}

/// Keeps the first occurrence of each natural id
fn dedup_by_natural_id(extracted: &[RawListing]) -> Vec<&RawListing> {
    let mut seen = HashSet::new();
    extracted
        .iter()
        .filter(|listing| seen.insert(listing.natural_id.as_str()))
        .collect()
}

/// Extracted records whose natural id is not yet stored for `source`
///
/// These are the listings whose detail pages should be fetched before
/// reconciling.
pub fn plan_new<'a, S: Store>(
    store: &S,
    source: SourceFamily,
    extracted: &'a [RawListing],
) -> StoreResult<Vec<&'a RawListing>> {
    let mut fresh = Vec::new();
    for listing in dedup_by_natural_id(extracted) {
        if store.find_listing(source, &listing.natural_id)?.is_none() {
            fresh.push(listing);
        }
    }
    Ok(fresh)
}

/// Card fields fill in what the detail page did not provide
fn merge_card(card: &RawListing, detail: Option<&DetailRecord>) -> Option<DetailRecord> {
    detail.map(|detail| {
        let mut merged = detail.clone();
        merged.bedrooms = merged.bedrooms.or(card.bedrooms);
        merged.bathrooms = merged.bathrooms.or(card.bathrooms);
        merged
    })
}

fn new_listing(
    source: SourceFamily,
    card: &RawListing,
    detail: Option<&DetailRecord>,
) -> NewListing {
    NewListing {
        source,
        natural_id: card.natural_id.clone(),
        source_url: card.detail_url.clone(),
        address: card.address.clone(),
        price: card.price,
        detail: merge_card(card, detail),
        photo_count: card.photo_count,
        raw_data: serde_json::to_value(card).unwrap_or(serde_json::Value::Null),
    }
}

/// Applies one saved search's extraction to the store atomically
///
/// # Arguments
///
/// * `store` - The listing store
/// * `search` - The saved search the records were extracted for
/// * `extracted` - Records from every fetched result page, in page order
/// * `details` - Detail records of new listings, keyed by natural id
/// * `now` - Timestamp written on every row touched
///
/// # Returns
///
/// * `Ok(ReconcileOutcome)` - Counters for run statistics
/// * `Err(StoreError)` - Nothing was written
pub fn reconcile<S: Store>(
    store: &mut S,
    search: &SavedSearch,
    extracted: &[RawListing],
    details: &HashMap<String, DetailRecord>,
    now: DateTime<Utc>,
) -> StoreResult<ReconcileOutcome> {
    apply(store, search, extracted, details, now, true)
}

/// Reconciles a search whose result pages were not all fetched
///
/// Extracted records are applied as in [`reconcile`], but members that were
/// not extracted keep their membership and status: they may sit on a page
/// that was never requested.
pub fn reconcile_partial<S: Store>(
    store: &mut S,
    search: &SavedSearch,
    extracted: &[RawListing],
    details: &HashMap<String, DetailRecord>,
    now: DateTime<Utc>,
) -> StoreResult<ReconcileOutcome> {
    apply(store, search, extracted, details, now, false)
}

fn apply<S: Store>(
    store: &mut S,
    search: &SavedSearch,
    extracted: &[RawListing],
    details: &HashMap<String, DetailRecord>,
    now: DateTime<Utc>,
    delist_missing: bool,
) -> StoreResult<ReconcileOutcome> {
    store.atomically(|store| {
        let mut outcome = ReconcileOutcome::default();
        let unique = dedup_by_natural_id(extracted);
        let extracted_ids: HashSet<&str> = unique.iter().map(|l| l.natural_id.as_str()).collect();

        for card in unique {
            outcome.seen += 1;

            match store.find_listing(search.source, &card.natural_id)? {
                None => {
                    let listing = new_listing(search.source, card, details.get(&card.natural_id));
                    let listing_id = store.insert_listing(&listing, now)?;
                    store.upsert_membership(listing_id, search.id, now)?;
                    store.insert_snapshot(listing_id, Some(card.price), ListingStatus::Active, now)?;
                    outcome.new += 1;

                    tracing::debug!(
                        natural_id = %card.natural_id,
                        price = card.price,
                        "New listing"
                    );
                }
                Some(existing) => {
                    if existing.status != ListingStatus::Active {
                        tracing::info!(
                            natural_id = %card.natural_id,
                            previous = %existing.status,
                            "Listing re-sighted, marking active"
                        );
                    }

                    let price_changed = store.record_sighting(existing.id, card.price, now)?;
                    store.upsert_membership(existing.id, search.id, now)?;
                    store.insert_snapshot(existing.id, Some(card.price), ListingStatus::Active, now)?;

                    if price_changed {
                        outcome.updated += 1;
                        tracing::debug!(
                            natural_id = %card.natural_id,
                            old = ?existing.current_price,
                            new = card.price,
                            "Price change"
                        );
                    }
                }
            }
        }

        if !delist_missing {
            return Ok(outcome);
        }

        for member in store.active_members(search.id)? {
            if extracted_ids.contains(member.natural_id.as_str()) {
                continue;
            }

            store.deactivate_membership(member.listing_id, search.id)?;

            if member.status == ListingStatus::Active {
                store.mark_delisted(member.listing_id, now)?;
                store.insert_snapshot(
                    member.listing_id,
                    member.current_price,
                    ListingStatus::Delisted,
                    now,
                )?;
                outcome.delisted += 1;

                tracing::debug!(natural_id = %member.natural_id, "Listing delisted");
            }
        }

        Ok(outcome)
    })
}
