use tracing::debug;

use super::{FeedVariant, StopTimeChange, TripUpdate, VehiclePosition};
use crate::gtfs_rt::{self, FeedMessage};
use crate::stats::FeedStats;

/// Records extracted from one decoded feed.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedFeed {
    pub variant: FeedVariant,
    pub feed_timestamp: Option<u64>,
    pub trip_updates: Vec<TripUpdate>,
    pub vehicle_positions: Vec<VehiclePosition>,
    pub alert_count: usize,
    pub stats: FeedStats,
}

/// Converts a decoded feed into per-source records.
///
/// Deleted entities are dropped, as are trip updates without a trip id and
/// vehicles without a position.
pub fn normalize(feed: &FeedMessage, variant: FeedVariant) -> NormalizedFeed {
    let mut trip_updates = Vec::new();
    let mut vehicle_positions = Vec::new();
    let mut alert_count = 0;

    for entity in feed.entity.iter().filter(|e| !e.is_deleted()) {
        if let Some(tu) = &entity.trip_update {
            match trip_update(tu, variant) {
                Some(record) => trip_updates.push(record),
                None => debug!(entity = %entity.id, "Trip update without trip id"),
            }
        }
        if let Some(vp) = &entity.vehicle {
            match vehicle_position(&entity.id, vp, variant) {
                Some(record) => vehicle_positions.push(record),
                None => debug!(entity = %entity.id, "Vehicle without position"),
            }
        }
        if entity.alert.is_some() {
            alert_count += 1;
        }
    }

    NormalizedFeed {
        variant,
        feed_timestamp: feed.header.timestamp,
        trip_updates,
        vehicle_positions,
        alert_count,
        stats: FeedStats::from_feed(feed).with_source(variant.label()),
    }
}

fn trip_update(tu: &gtfs_rt::TripUpdate, variant: FeedVariant) -> Option<TripUpdate> {
    let trip_id = tu.trip.trip_id.clone().filter(|id| !id.is_empty())?;

    let stop_time_changes: Vec<StopTimeChange> = tu
        .stop_time_update
        .iter()
        .map(|stu| StopTimeChange {
            stop_sequence: stu.stop_sequence,
            stop_id: stu.stop_id.clone(),
            arrival_delay: stu.arrival.as_ref().and_then(|e| e.delay),
            departure_delay: stu.departure.as_ref().and_then(|e| e.delay),
            schedule_relationship: stu.schedule_relationship().as_str_name().to_string(),
            assigned_stop_id: stu
                .stop_time_properties
                .as_ref()
                .and_then(|p| p.assigned_stop_id.clone()),
        })
        .collect();

    Some(TripUpdate {
        trip_id,
        route_id: tu.trip.route_id.clone(),
        delay_seconds: trip_delay(tu.delay, &stop_time_changes),
        stop_time_changes,
        variant,
    })
}

/// Trip-level delay, else the first departure delay, else the first arrival
/// delay.
fn trip_delay(trip_level: Option<i32>, changes: &[StopTimeChange]) -> Option<i32> {
    trip_level
        .or_else(|| changes.iter().find_map(|c| c.departure_delay))
        .or_else(|| changes.iter().find_map(|c| c.arrival_delay))
}

fn vehicle_position(
    entity_id: &str,
    vp: &gtfs_rt::VehiclePosition,
    variant: FeedVariant,
) -> Option<VehiclePosition> {
    let position = vp.position.as_ref()?;
    let trip_id = vp.trip.as_ref().and_then(|t| t.trip_id.clone());
    let vehicle_id = vp.vehicle.as_ref().and_then(|v| v.id.clone());
    let key = trip_id
        .clone()
        .or_else(|| vehicle_id.clone())
        .unwrap_or_else(|| entity_id.to_string());

    Some(VehiclePosition {
        key,
        vehicle_id,
        label: vp.vehicle.as_ref().and_then(|v| v.label.clone()),
        trip_id,
        route_id: vp.trip.as_ref().and_then(|t| t.route_id.clone()),
        latitude: f64::from(position.latitude),
        longitude: f64::from(position.longitude),
        bearing: position.bearing,
        speed: position.speed,
        timestamp: vp.timestamp,
        current_status: vp
            .current_status
            .map(|_| vp.current_status().as_str_name().to_string()),
        stop_id: vp.stop_id.clone(),
        variant,
    })
}
