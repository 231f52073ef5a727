//! GTFS-Realtime reading: fetch → parse → normalize → merge.

mod json;
mod merge;
mod normalize;
mod reader;
mod source;
mod stale;

pub use json::parse_json_feed;
pub use merge::merge;
pub use normalize::{NormalizedFeed, normalize};
pub(crate) use reader::fetch_endpoint;
pub use reader::{
    LocalSnapshotProvider, RemoteSnapshotProvider, SnapshotProvider, read_local_snapshot,
    read_remote_snapshot, snapshot_provider, write_cache,
};
pub use source::{
    LocalFeedFile, PayloadFormat, decode_payload, discover_local, parse_payload, read_local,
};
pub use stale::{Freshness, apply_stale_policy, freshness};

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::stats::FeedStats;

/// NMBS publishes the same feed twice: once with platform (track) changes in
/// the stop time properties and once without.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedVariant {
    WithPlatformChanges,
    WithoutPlatformChanges,
}

impl FeedVariant {
    /// Merge precedence order: earlier variants win.
    pub const ALL: [FeedVariant; 2] = [
        FeedVariant::WithPlatformChanges,
        FeedVariant::WithoutPlatformChanges,
    ];

    pub fn dir_name(self) -> &'static str {
        match self {
            FeedVariant::WithPlatformChanges => {
                "real-time_gegevens_met_info_over_spoorveranderingen"
            }
            FeedVariant::WithoutPlatformChanges => {
                "real-time_gegevens_zonder_info_over_spoorveranderingen"
            }
        }
    }

    /// Substring identifying the variant in a file name.
    pub fn marker(self) -> &'static str {
        match self {
            FeedVariant::WithPlatformChanges => "met_info_over_spoorveranderingen",
            FeedVariant::WithoutPlatformChanges => "zonder_info_over_spoorveranderingen",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FeedVariant::WithPlatformChanges => "with_platform_changes",
            FeedVariant::WithoutPlatformChanges => "without_platform_changes",
        }
    }

    pub fn from_file_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| name.contains(v.marker()))
    }
}

impl fmt::Display for FeedVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopTimeChange {
    pub stop_sequence: Option<u32>,
    pub stop_id: Option<String>,
    pub arrival_delay: Option<i32>,
    pub departure_delay: Option<i32>,
    pub schedule_relationship: String,
    /// Set when the train was moved to another platform.
    pub assigned_stop_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripUpdate {
    pub trip_id: String,
    pub route_id: Option<String>,
    pub delay_seconds: Option<i32>,
    pub stop_time_changes: Vec<StopTimeChange>,
    pub variant: FeedVariant,
}

impl TripUpdate {
    pub fn has_platform_change(&self) -> bool {
        self.stop_time_changes
            .iter()
            .any(|c| c.assigned_stop_id.is_some())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehiclePosition {
    /// Merge key: trip id, else vehicle id, else entity id.
    pub key: String,
    pub vehicle_id: Option<String>,
    pub label: Option<String>,
    pub trip_id: Option<String>,
    pub route_id: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub bearing: Option<f32>,
    pub speed: Option<f32>,
    pub timestamp: Option<u64>,
    pub current_status: Option<String>,
    pub stop_id: Option<String>,
    pub variant: FeedVariant,
}

/// One merged view of every real-time source read in a single poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeSnapshot {
    pub fetched_at: DateTime<Utc>,
    /// Newest header timestamp across the merged sources.
    pub feed_timestamp: Option<DateTime<Utc>>,
    pub sources: Vec<FeedStats>,
    pub trip_updates: Vec<TripUpdate>,
    pub vehicle_positions: Vec<VehiclePosition>,
    pub alert_count: usize,
    #[serde(default)]
    pub stale: bool,
}

impl RealtimeSnapshot {
    /// Reference time for staleness: the feed header when present.
    pub fn observed_at(&self) -> DateTime<Utc> {
        self.feed_timestamp.unwrap_or(self.fetched_at)
    }

    pub fn platform_change_count(&self) -> usize {
        self.trip_updates
            .iter()
            .filter(|t| t.has_platform_change())
            .count()
    }
}
