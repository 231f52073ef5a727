//! Self-contained Leaflet map of stations, route lines and live vehicles.

mod color;
mod html;

pub use color::{route_color, route_type_label};

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::error::{NmbsError, Result};
use crate::output::write_atomic;
use crate::planning::{FormatKind, Network, is_valid_position, load_directory, read_network};
use crate::realtime::{RealtimeSnapshot, SnapshotProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapOptions {
    pub dark_mode: bool,
    pub include_realtime: bool,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            dark_mode: true,
            include_realtime: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationMarker {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteLayer {
    pub label: String,
    pub route_type: u16,
    pub lines: Vec<RoutePolyline>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutePolyline {
    pub name: String,
    pub color: String,
    pub points: Vec<[f64; 2]>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleMarker {
    pub id: String,
    pub trip_id: Option<String>,
    pub lat: f64,
    pub lon: f64,
    pub bearing: Option<f32>,
    pub speed: Option<f32>,
    pub status: Option<String>,
    /// Delayed or moved to another platform.
    pub disrupted: bool,
}

/// Everything drawn on the map, serialized into the page.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MapLayers {
    pub stations: Vec<StationMarker>,
    pub routes: Vec<RouteLayer>,
    pub vehicles: Vec<VehicleMarker>,
    pub stale: bool,
}

impl MapLayers {
    pub fn from_network(network: &Network) -> Self {
        let stations = network
            .stations
            .iter()
            .map(|s| StationMarker {
                id: s.stop_id.clone(),
                name: s.name.clone(),
                lat: s.lat,
                lon: s.lon,
            })
            .collect();

        let total = network.lines.len();
        let mut routes: Vec<RouteLayer> = Vec::new();
        for (i, line) in network.lines.iter().enumerate() {
            let polyline = RoutePolyline {
                name: format!("{} ({})", line.route_name, line.trip_id),
                color: route_color(i, total, line.route_type),
                points: line.points.clone(),
            };
            match routes.iter_mut().find(|r| r.route_type == line.route_type) {
                Some(layer) => layer.lines.push(polyline),
                None => routes.push(RouteLayer {
                    label: route_type_label(line.route_type),
                    route_type: line.route_type,
                    lines: vec![polyline],
                }),
            }
        }
        routes.sort_by_key(|r| r.route_type);

        Self {
            stations,
            routes,
            vehicles: Vec::new(),
            stale: false,
        }
    }

    /// Adds one marker per located vehicle. Vehicles at (0, 0) are skipped.
    pub fn add_vehicles(&mut self, snapshot: &RealtimeSnapshot) {
        let disrupted_trips: HashSet<&str> = snapshot
            .trip_updates
            .iter()
            .filter(|t| t.has_platform_change() || t.delay_seconds.is_some_and(|d| d > 0))
            .map(|t| t.trip_id.as_str())
            .collect();

        self.vehicles = snapshot
            .vehicle_positions
            .iter()
            .filter(|v| v.latitude != 0.0 || v.longitude != 0.0)
            .filter(|v| is_valid_position(v.latitude, v.longitude))
            .map(|v| VehicleMarker {
                id: v.vehicle_id.clone().unwrap_or_else(|| v.key.clone()),
                trip_id: v.trip_id.clone(),
                lat: v.latitude,
                lon: v.longitude,
                bearing: v.bearing,
                speed: v.speed,
                status: v.current_status.clone(),
                disrupted: v
                    .trip_id
                    .as_deref()
                    .is_some_and(|t| disrupted_trips.contains(t)),
            })
            .collect();
        self.stale = snapshot.stale;
    }
}

/// Result of one map generation.
#[derive(Debug, Clone, PartialEq)]
pub struct MapArtifact {
    pub path: PathBuf,
    pub stations: usize,
    pub route_lines: usize,
    pub vehicles: usize,
}

/// First GTFS archive (by file name) in the planning directory.
pub fn find_gtfs_archive(planning_dir: &Path) -> Result<PathBuf> {
    load_directory(planning_dir)?
        .into_iter()
        .find(|d| d.format == FormatKind::Gtfs)
        .map(|d| d.path)
        .ok_or_else(|| {
            NmbsError::MissingSource(format!(
                "no GTFS archive in {}",
                planning_dir.display()
            ))
        })
}

/// Renders the map for `gtfs_path` to `output`.
///
/// The provider is only consulted with `include_realtime`. Real-time
/// failures are logged and leave a map with static layers.
#[tracing::instrument(skip_all, fields(gtfs = %gtfs_path.display(), dark_mode = options.dark_mode))]
pub async fn generate_map(
    gtfs_path: &Path,
    output: &Path,
    options: MapOptions,
    provider: &dyn SnapshotProvider,
) -> Result<MapArtifact> {
    let network = read_network(gtfs_path)?;
    let mut layers = MapLayers::from_network(&network);

    if options.include_realtime {
        match provider.latest().await {
            Ok(Some(snapshot)) => layers.add_vehicles(&snapshot),
            Ok(None) => warn!(
                kind = "missing_source",
                "No real-time snapshot available, rendering static layers only"
            ),
            Err(e) => warn!(
                kind = e.kind(),
                error = %e,
                "Real-time snapshot unusable, rendering static layers only"
            ),
        }
    }

    let page = html::render(&layers, options)?;
    write_atomic(output, page.as_bytes())?;

    let artifact = MapArtifact {
        path: output.to_path_buf(),
        stations: layers.stations.len(),
        route_lines: layers.routes.iter().map(|r| r.lines.len()).sum(),
        vehicles: layers.vehicles.len(),
    };
    info!(
        path = %artifact.path.display(),
        stations = artifact.stations,
        route_lines = artifact.route_lines,
        vehicles = artifact.vehicles,
        "Map written"
    );
    Ok(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planning::{RouteLine, Station};
    use crate::realtime::{FeedVariant, fixtures, merge, normalize};
    use chrono::Utc;

    fn network() -> Network {
        Network {
            stations: vec![
                Station {
                    stop_id: "A".to_string(),
                    name: "Brussel-Zuid".to_string(),
                    lat: 50.835,
                    lon: 4.336,
                },
                Station {
                    stop_id: "B".to_string(),
                    name: "Gent-Sint-Pieters".to_string(),
                    lat: 51.036,
                    lon: 3.710,
                },
            ],
            lines: vec![
                RouteLine {
                    route_id: "R1".to_string(),
                    route_name: "IC".to_string(),
                    route_type: 101,
                    trip_id: "T1".to_string(),
                    points: vec![[50.835, 4.336], [51.036, 3.710]],
                },
                RouteLine {
                    route_id: "R2".to_string(),
                    route_name: "L".to_string(),
                    route_type: 2,
                    trip_id: "T2".to_string(),
                    points: vec![[51.036, 3.710], [50.835, 4.336]],
                },
                RouteLine {
                    route_id: "R3".to_string(),
                    route_name: "IC".to_string(),
                    route_type: 101,
                    trip_id: "T3".to_string(),
                    points: vec![[50.835, 4.336], [51.036, 3.710]],
                },
            ],
        }
    }

    #[test]
    fn test_layers_group_lines_by_route_type() {
        let layers = MapLayers::from_network(&network());

        assert_eq!(layers.stations.len(), 2);
        assert_eq!(layers.routes.len(), 2);
        assert_eq!(layers.routes[0].label, "Rail");
        assert_eq!(layers.routes[1].label, "Intercity");
        assert_eq!(layers.routes[1].lines.len(), 2);
        assert!(layers.vehicles.is_empty());
    }

    #[test]
    fn test_vehicles_marked_disrupted() {
        let snapshot = merge(
            vec![normalize(
                &fixtures::feed(
                    1,
                    vec![
                        fixtures::trip_entity("IC-1", 0, Some("8814001_9")),
                        fixtures::vehicle_entity("veh-1", Some("IC-1"), 50.8, 4.3),
                        fixtures::vehicle_entity("veh-2", Some("IC-2"), 51.0, 3.7),
                        fixtures::vehicle_entity("veh-3", None, 0.0, 0.0),
                    ],
                ),
                FeedVariant::WithPlatformChanges,
            )],
            Utc::now(),
        );
        let mut layers = MapLayers::default();

        layers.add_vehicles(&snapshot);

        assert_eq!(layers.vehicles.len(), 2);
        assert!(layers.vehicles[0].disrupted);
        assert!(!layers.vehicles[1].disrupted);
    }
    #[test]
    fn test_vehicles_without_drawable_position_are_dropped() {
        let snapshot = merge(
            vec![normalize(
                &fixtures::feed(
                    1,
                    vec![
                        fixtures::vehicle_entity("veh-1", Some("IC-1"), 50.8, 4.3),
                        fixtures::vehicle_entity("veh-2", Some("IC-2"), f32::NAN, 4.3),
                        fixtures::vehicle_entity("veh-3", Some("IC-3"), 50.8, f32::INFINITY),
                        fixtures::vehicle_entity("veh-4", Some("IC-4"), 120.0, 4.3),
                    ],
                ),
                FeedVariant::WithPlatformChanges,
            )],
            Utc::now(),
        );
        let mut layers = MapLayers::default();

        layers.add_vehicles(&snapshot);

        assert_eq!(layers.vehicles.len(), 1);
        assert_eq!(layers.vehicles[0].id, "veh-1");
    }
}
