use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::gtfs_rt::FeedMessage;

/// Entity counts and optional-field coverage of one decoded feed.
///
/// Flat so that it serializes as one CSV row in the polling history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedStats {
    pub timestamp: DateTime<Utc>,
    pub source: Option<String>,
    pub feed_timestamp: Option<u64>,
    pub total_entities: usize,

    // entity types
    pub vehicles: usize,
    pub trip_updates: usize,
    pub alerts: usize,
    pub deleted: usize,

    // trip update fields
    pub with_trip_delay: usize,
    pub stop_time_updates: usize,
    pub platform_changes: usize,

    // vehicle fields
    pub with_trip: usize,
    pub with_vehicle_descriptor: usize,
    pub with_position: usize,
    pub with_bearing: usize,
    pub with_speed: usize,
    pub with_current_stop_sequence: usize,
    pub with_stop_id: usize,
    pub with_current_status: usize,
    pub with_timestamp: usize,
    pub with_occupancy: usize,

    // error tracking
    pub error_type: Option<String>,
    pub error_message: Option<String>,
}

impl FeedStats {
    pub fn from_feed(feed: &FeedMessage) -> Self {
        let mut s = FeedStats {
            timestamp: Utc::now(),
            feed_timestamp: feed.header.timestamp,
            total_entities: feed.entity.len(),
            ..Default::default()
        };

        for e in &feed.entity {
            if e.is_deleted() {
                s.deleted += 1;
            }

            if let Some(tu) = &e.trip_update {
                s.trip_updates += 1;

                if tu.delay.is_some() {
                    s.with_trip_delay += 1;
                }

                s.stop_time_updates += tu.stop_time_update.len();
                s.platform_changes += tu
                    .stop_time_update
                    .iter()
                    .filter(|stu| {
                        stu.stop_time_properties
                            .as_ref()
                            .and_then(|p| p.assigned_stop_id.as_ref())
                            .is_some()
                    })
                    .count();
            }

            if let Some(v) = &e.vehicle {
                s.vehicles += 1;

                if v.trip.is_some() {
                    s.with_trip += 1;
                }

                if v.vehicle.is_some() {
                    s.with_vehicle_descriptor += 1;
                }

                if let Some(pos) = &v.position {
                    s.with_position += 1;

                    if pos.bearing.is_some() {
                        s.with_bearing += 1;
                    }

                    if pos.speed.is_some() {
                        s.with_speed += 1;
                    }
                }

                if v.current_stop_sequence.is_some() {
                    s.with_current_stop_sequence += 1;
                }

                if v.stop_id.is_some() {
                    s.with_stop_id += 1;
                }

                if v.current_status.is_some() {
                    s.with_current_status += 1;
                }

                if v.timestamp.is_some() {
                    s.with_timestamp += 1;
                }

                if v.occupancy_status.is_some() {
                    s.with_occupancy += 1;
                }
            }

            if e.alert.is_some() {
                s.alerts += 1;
            }
        }

        s
    }

    pub fn pct(part: usize, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            (part as f64 / total as f64) * 100.0
        }
    }

    pub fn position_pct(&self) -> f64 {
        Self::pct(self.with_position, self.vehicles)
    }

    /// Create an error record with timestamp and error information
    pub fn from_error(error_type: &str, error_message: &str) -> Self {
        FeedStats {
            timestamp: Utc::now(),
            error_type: Some(error_type.to_string()),
            error_message: Some(error_message.to_string()),
            ..Default::default()
        }
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }

    pub fn is_error(&self) -> bool {
        self.error_type.is_some()
    }
}
