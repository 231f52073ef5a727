//! GTFS-Realtime in its JSON form, as served by the API for `realtime/data`.
//!
//! Field names are the protobuf JSON mapping (`tripUpdate`, `stopTimeUpdate`,
//! ...). 64-bit integers may arrive as strings and enums as their names.

use std::str::FromStr;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::{NmbsError, Result};
use crate::gtfs_rt::{self, alert, feed_header, trip_descriptor, trip_update, vehicle_position};

/// Parses a JSON GTFS-RT feed into the same message the protobuf decoder yields.
pub fn parse_json_feed(bytes: &[u8], source_name: &str) -> Result<gtfs_rt::FeedMessage> {
    let feed: JsonFeed =
        serde_json::from_slice(bytes).map_err(|e| NmbsError::decode(source_name, e))?;
    Ok(feed.into())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct JsonFeed {
    header: JsonHeader,
    entity: Vec<JsonEntity>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct JsonHeader {
    gtfs_realtime_version: Option<String>,
    incrementality: Option<Value>,
    #[serde(deserialize_with = "lenient")]
    timestamp: Option<u64>,
    feed_version: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct JsonEntity {
    id: String,
    is_deleted: Option<bool>,
    trip_update: Option<JsonTripUpdate>,
    vehicle: Option<JsonVehiclePosition>,
    alert: Option<JsonAlert>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct JsonTripUpdate {
    trip: JsonTrip,
    vehicle: Option<JsonVehicle>,
    stop_time_update: Vec<JsonStopTimeUpdate>,
    #[serde(deserialize_with = "lenient")]
    timestamp: Option<u64>,
    #[serde(deserialize_with = "lenient")]
    delay: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct JsonTrip {
    trip_id: Option<String>,
    route_id: Option<String>,
    #[serde(deserialize_with = "lenient")]
    direction_id: Option<u32>,
    start_time: Option<String>,
    start_date: Option<String>,
    schedule_relationship: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct JsonVehicle {
    id: Option<String>,
    label: Option<String>,
    license_plate: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct JsonStopTimeUpdate {
    #[serde(deserialize_with = "lenient")]
    stop_sequence: Option<u32>,
    stop_id: Option<String>,
    arrival: Option<JsonStopTimeEvent>,
    departure: Option<JsonStopTimeEvent>,
    schedule_relationship: Option<Value>,
    stop_time_properties: Option<JsonStopTimeProperties>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct JsonStopTimeEvent {
    #[serde(deserialize_with = "lenient")]
    delay: Option<i32>,
    #[serde(deserialize_with = "lenient")]
    time: Option<i64>,
    #[serde(deserialize_with = "lenient")]
    uncertainty: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct JsonStopTimeProperties {
    assigned_stop_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct JsonVehiclePosition {
    trip: Option<JsonTrip>,
    vehicle: Option<JsonVehicle>,
    position: Option<JsonPosition>,
    #[serde(deserialize_with = "lenient")]
    current_stop_sequence: Option<u32>,
    stop_id: Option<String>,
    current_status: Option<Value>,
    #[serde(deserialize_with = "lenient")]
    timestamp: Option<u64>,
    congestion_level: Option<Value>,
    occupancy_status: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct JsonPosition {
    #[serde(deserialize_with = "lenient")]
    latitude: Option<f32>,
    #[serde(deserialize_with = "lenient")]
    longitude: Option<f32>,
    #[serde(deserialize_with = "lenient")]
    bearing: Option<f32>,
    #[serde(deserialize_with = "lenient")]
    odometer: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    speed: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct JsonAlert {
    active_period: Vec<JsonTimeRange>,
    informed_entity: Vec<JsonEntitySelector>,
    cause: Option<Value>,
    effect: Option<Value>,
    url: Option<JsonTranslatedString>,
    header_text: Option<JsonTranslatedString>,
    description_text: Option<JsonTranslatedString>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct JsonTimeRange {
    #[serde(deserialize_with = "lenient")]
    start: Option<u64>,
    #[serde(deserialize_with = "lenient")]
    end: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct JsonEntitySelector {
    agency_id: Option<String>,
    route_id: Option<String>,
    #[serde(deserialize_with = "lenient")]
    route_type: Option<i32>,
    trip: Option<JsonTrip>,
    stop_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct JsonTranslatedString {
    translation: Vec<JsonTranslation>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct JsonTranslation {
    text: String,
    language: Option<String>,
}

/// Numbers that may be written as JSON numbers or as strings.
fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let text = match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => {
            return Err(serde::de::Error::custom(format!(
                "expected a number, got {other}"
            )));
        }
    };
    text.trim()
        .parse()
        .map(Some)
        .map_err(|e| serde::de::Error::custom(format!("invalid number {text:?}: {e}")))
}

/// Enum written by name or by number. Unknown names are dropped.
fn enum_value(value: Option<&Value>, from_name: impl Fn(&str) -> Option<i32>) -> Option<i32> {
    match value? {
        Value::String(name) => from_name(name),
        Value::Number(n) => n.as_i64().and_then(|n| i32::try_from(n).ok()),
        _ => None,
    }
}

impl From<JsonFeed> for gtfs_rt::FeedMessage {
    fn from(feed: JsonFeed) -> Self {
        let header = feed.header;
        gtfs_rt::FeedMessage {
            header: gtfs_rt::FeedHeader {
                gtfs_realtime_version: header
                    .gtfs_realtime_version
                    .unwrap_or_else(|| "2.0".to_string()),
                incrementality: enum_value(header.incrementality.as_ref(), |s| {
                    feed_header::Incrementality::from_str_name(s).map(|e| e as i32)
                }),
                timestamp: header.timestamp,
                feed_version: header.feed_version,
                ..Default::default()
            },
            entity: feed.entity.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<JsonEntity> for gtfs_rt::FeedEntity {
    fn from(entity: JsonEntity) -> Self {
        gtfs_rt::FeedEntity {
            id: entity.id,
            is_deleted: entity.is_deleted,
            trip_update: entity.trip_update.map(Into::into),
            vehicle: entity.vehicle.map(Into::into),
            alert: entity.alert.map(Into::into),
            ..Default::default()
        }
    }
}

impl From<JsonTrip> for gtfs_rt::TripDescriptor {
    fn from(trip: JsonTrip) -> Self {
        gtfs_rt::TripDescriptor {
            trip_id: trip.trip_id,
            route_id: trip.route_id,
            direction_id: trip.direction_id,
            start_time: trip.start_time,
            start_date: trip.start_date,
            schedule_relationship: enum_value(trip.schedule_relationship.as_ref(), |s| {
                trip_descriptor::ScheduleRelationship::from_str_name(s).map(|e| e as i32)
            }),
            ..Default::default()
        }
    }
}

impl From<JsonVehicle> for gtfs_rt::VehicleDescriptor {
    fn from(vehicle: JsonVehicle) -> Self {
        gtfs_rt::VehicleDescriptor {
            id: vehicle.id,
            label: vehicle.label,
            license_plate: vehicle.license_plate,
            ..Default::default()
        }
    }
}

impl From<JsonStopTimeEvent> for trip_update::StopTimeEvent {
    fn from(event: JsonStopTimeEvent) -> Self {
        trip_update::StopTimeEvent {
            delay: event.delay,
            time: event.time,
            uncertainty: event.uncertainty,
            ..Default::default()
        }
    }
}

impl From<JsonStopTimeUpdate> for trip_update::StopTimeUpdate {
    fn from(stu: JsonStopTimeUpdate) -> Self {
        trip_update::StopTimeUpdate {
            stop_sequence: stu.stop_sequence,
            stop_id: stu.stop_id,
            arrival: stu.arrival.map(Into::into),
            departure: stu.departure.map(Into::into),
            schedule_relationship: enum_value(stu.schedule_relationship.as_ref(), |s| {
                trip_update::stop_time_update::ScheduleRelationship::from_str_name(s)
                    .map(|e| e as i32)
            }),
            stop_time_properties: stu.stop_time_properties.map(|p| {
                trip_update::stop_time_update::StopTimeProperties {
                    assigned_stop_id: p.assigned_stop_id,
                    ..Default::default()
                }
            }),
            ..Default::default()
        }
    }
}

impl From<JsonTripUpdate> for gtfs_rt::TripUpdate {
    fn from(tu: JsonTripUpdate) -> Self {
        gtfs_rt::TripUpdate {
            trip: tu.trip.into(),
            vehicle: tu.vehicle.map(Into::into),
            stop_time_update: tu.stop_time_update.into_iter().map(Into::into).collect(),
            timestamp: tu.timestamp,
            delay: tu.delay,
            ..Default::default()
        }
    }
}

impl From<JsonVehiclePosition> for gtfs_rt::VehiclePosition {
    fn from(vp: JsonVehiclePosition) -> Self {
        gtfs_rt::VehiclePosition {
            trip: vp.trip.map(Into::into),
            vehicle: vp.vehicle.map(Into::into),
            position: vp.position.map(|p| gtfs_rt::Position {
                latitude: p.latitude.unwrap_or_default(),
                longitude: p.longitude.unwrap_or_default(),
                bearing: p.bearing,
                odometer: p.odometer,
                speed: p.speed,
            }),
            current_stop_sequence: vp.current_stop_sequence,
            stop_id: vp.stop_id,
            current_status: enum_value(vp.current_status.as_ref(), |s| {
                vehicle_position::VehicleStopStatus::from_str_name(s).map(|e| e as i32)
            }),
            timestamp: vp.timestamp,
            congestion_level: enum_value(vp.congestion_level.as_ref(), |s| {
                vehicle_position::CongestionLevel::from_str_name(s).map(|e| e as i32)
            }),
            occupancy_status: enum_value(vp.occupancy_status.as_ref(), |s| {
                vehicle_position::OccupancyStatus::from_str_name(s).map(|e| e as i32)
            }),
            ..Default::default()
        }
    }
}

impl From<JsonTranslatedString> for gtfs_rt::TranslatedString {
    fn from(text: JsonTranslatedString) -> Self {
        gtfs_rt::TranslatedString {
            translation: text
                .translation
                .into_iter()
                .map(|t| gtfs_rt::translated_string::Translation {
                    text: t.text,
                    language: t.language,
                })
                .collect(),
        }
    }
}

impl From<JsonAlert> for gtfs_rt::Alert {
    fn from(json: JsonAlert) -> Self {
        gtfs_rt::Alert {
            active_period: json
                .active_period
                .into_iter()
                .map(|r| gtfs_rt::TimeRange {
                    start: r.start,
                    end: r.end,
                })
                .collect(),
            informed_entity: json
                .informed_entity
                .into_iter()
                .map(|e| gtfs_rt::EntitySelector {
                    agency_id: e.agency_id,
                    route_id: e.route_id,
                    route_type: e.route_type,
                    trip: e.trip.map(Into::into),
                    stop_id: e.stop_id,
                    ..Default::default()
                })
                .collect(),
            cause: enum_value(json.cause.as_ref(), |s| {
                alert::Cause::from_str_name(s).map(|e| e as i32)
            }),
            effect: enum_value(json.effect.as_ref(), |s| {
                alert::Effect::from_str_name(s).map(|e| e as i32)
            }),
            url: json.url.map(Into::into),
            header_text: json.header_text.map(Into::into),
            description_text: json.description_text.map(Into::into),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::{FeedVariant, normalize};

    const FEED: &str = r#"{
        "header": {"gtfsRealtimeVersion": "2.0", "incrementality": "FULL_DATASET", "timestamp": "1700000000"},
        "entity": [
            {
                "id": "1",
                "tripUpdate": {
                    "trip": {"tripId": "IC-1", "routeId": "IC", "scheduleRelationship": "SCHEDULED"},
                    "stopTimeUpdate": [
                        {
                            "stopSequence": 3,
                            "stopId": "8814001",
                            "departure": {"delay": 120, "time": "1700000120"},
                            "stopTimeProperties": {"assignedStopId": "8814001_7"}
                        }
                    ]
                }
            },
            {
                "id": "2",
                "vehicle": {
                    "trip": {"tripId": "IC-1"},
                    "vehicle": {"id": "veh-1"},
                    "position": {"latitude": 50.8, "longitude": 4.3, "bearing": 90},
                    "currentStatus": "STOPPED_AT"
                }
            },
            {
                "id": "3",
                "alert": {
                    "cause": "STRIKE",
                    "effect": 1,
                    "headerText": {"translation": [{"text": "Staking", "language": "nl"}]}
                }
            }
        ]
    }"#;

    #[test]
    fn test_parse_json_feed_maps_camel_case_fields() {
        let feed = parse_json_feed(FEED.as_bytes(), "realtime/data").unwrap();

        assert_eq!(feed.header.timestamp, Some(1_700_000_000));
        assert_eq!(feed.entity.len(), 3);
        let tu = feed.entity[0].trip_update.as_ref().unwrap();
        assert_eq!(tu.trip.trip_id.as_deref(), Some("IC-1"));
        let stu = &tu.stop_time_update[0];
        assert_eq!(stu.departure.as_ref().unwrap().time, Some(1_700_000_120));
        assert_eq!(
            stu.stop_time_properties.as_ref().unwrap().assigned_stop_id.as_deref(),
            Some("8814001_7")
        );
        let vp = feed.entity[1].vehicle.as_ref().unwrap();
        assert_eq!(
            vp.current_status(),
            vehicle_position::VehicleStopStatus::StoppedAt
        );
        let notice = feed.entity[2].alert.as_ref().unwrap();
        assert_eq!(notice.cause(), alert::Cause::Strike);
        assert_eq!(notice.effect(), alert::Effect::NoService);
    }

    #[test]
    fn test_json_feed_normalizes_like_protobuf() {
        let feed = parse_json_feed(FEED.as_bytes(), "realtime/data").unwrap();

        let normalized = normalize(&feed, FeedVariant::WithPlatformChanges);

        assert_eq!(normalized.trip_updates.len(), 1);
        assert!(normalized.trip_updates[0].has_platform_change());
        assert_eq!(normalized.trip_updates[0].delay_seconds, Some(120));
        assert_eq!(normalized.vehicle_positions.len(), 1);
        assert_eq!(normalized.alert_count, 1);
    }

    #[test]
    fn test_minimal_entity_list() {
        let feed = parse_json_feed(
            br#"{"header":{},"entity":[{"id":"1","tripUpdate":{"trip":{"tripId":"IC-1"}}}]}"#,
            "realtime/data",
        )
        .unwrap();
        assert_eq!(feed.entity.len(), 1);
        assert_eq!(feed.header.gtfs_realtime_version, "2.0");
    }

    #[test]
    fn test_invalid_json_is_decode_error() {
        let err = parse_json_feed(b"{\"entity\": [", "realtime/data").unwrap_err();
        assert!(matches!(err, NmbsError::Decode { .. }));

        let err = parse_json_feed(br#"{"header":{"timestamp":"soon"}}"#, "realtime/data")
            .unwrap_err();
        assert!(matches!(err, NmbsError::Decode { .. }));
    }
}
