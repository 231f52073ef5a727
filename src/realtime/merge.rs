use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use chrono::{DateTime, Utc};

use super::{NormalizedFeed, RealtimeSnapshot};

/// Merges per-source records into one snapshot.
///
/// Trip updates are keyed by trip id and vehicles by their merge key. For a
/// key present in several sources the record of the higher-precedence
/// variant is kept (see [`super::FeedVariant::ALL`]), independent of input
/// order. Output is sorted by key.
pub fn merge(feeds: Vec<NormalizedFeed>, fetched_at: DateTime<Utc>) -> RealtimeSnapshot {
    let mut trips = BTreeMap::new();
    let mut vehicles = BTreeMap::new();
    let mut sources = Vec::with_capacity(feeds.len());
    let mut alert_count = 0;
    let mut newest_header: Option<u64> = None;

    for feed in feeds {
        for trip in feed.trip_updates {
            match trips.entry(trip.trip_id.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(trip);
                }
                Entry::Occupied(mut slot) => {
                    if trip.variant < slot.get().variant {
                        slot.insert(trip);
                    }
                }
            }
        }
        for vehicle in feed.vehicle_positions {
            match vehicles.entry(vehicle.key.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(vehicle);
                }
                Entry::Occupied(mut slot) => {
                    if vehicle.variant < slot.get().variant {
                        slot.insert(vehicle);
                    }
                }
            }
        }
        alert_count += feed.alert_count;
        newest_header = newest_header.max(feed.feed_timestamp);
        sources.push(feed.stats);
    }

    RealtimeSnapshot {
        fetched_at,
        feed_timestamp: newest_header
            .and_then(|ts| i64::try_from(ts).ok())
            .and_then(|ts| DateTime::from_timestamp(ts, 0)),
        sources,
        trip_updates: trips.into_values().collect(),
        vehicle_positions: vehicles.into_values().collect(),
        alert_count,
        stale: false,
    }
}
