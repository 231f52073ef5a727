//! GTFS archives: per-table record counts and the station/route network
//! drawn on the map.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::detect::{base_name, open_archive};
use crate::error::{NmbsError, Result};

/// Maximum number of trips turned into route lines.
pub const MAX_ROUTE_LINES: usize = 200;

/// Counts the records of every `.txt` member. Members that fail to parse are
/// returned as skipped entries instead of counts.
pub fn count_tables(path: &Path) -> Result<(BTreeMap<String, u64>, Vec<String>)> {
    let mut archive = open_archive(path)?;
    let mut tables = BTreeMap::new();
    let mut skipped = Vec::new();

    for i in 0..archive.len() {
        let member = archive.by_index(i)?;
        if member.is_dir() {
            continue;
        }
        let member_name = member.name().to_string();
        let base = base_name(&member_name);
        let Some(table) = base.strip_suffix(".txt") else {
            debug!(member = %member_name, "Ignoring non-table archive member");
            continue;
        };
        let table = table.to_string();

        match count_records(member) {
            Ok(records) => {
                *tables.entry(table).or_insert(0) += records;
            }
            Err(e) => {
                warn!(member = %member_name, error = %e, "Skipping unreadable GTFS table");
                skipped.push(format!("{table}: {e}"));
            }
        }
    }

    Ok((tables, skipped))
}

fn count_records(reader: impl Read) -> std::result::Result<u64, csv::Error> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(reader);
    let mut record = csv::StringRecord::new();
    let mut count = 0;
    while rdr.read_record(&mut record)? {
        count += 1;
    }
    Ok(count)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Station {
    pub stop_id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteLine {
    pub route_id: String,
    pub route_name: String,
    pub route_type: u16,
    pub trip_id: String,
    pub points: Vec<[f64; 2]>,
}

/// Located stations and route lines of a GTFS archive.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Network {
    pub stations: Vec<Station>,
    pub lines: Vec<RouteLine>,
}

struct RouteInfo {
    name: String,
    route_type: u16,
}

/// Reads stations and up to [`MAX_ROUTE_LINES`] route lines.
///
/// Stations need `stops.txt`. Lines additionally need `trips.txt` and
/// `stop_times.txt`; without them the network has stations only. A missing
/// archive is [`NmbsError::MissingSource`].
#[tracing::instrument(skip_all, fields(path = %path.display()))]
pub fn read_network(path: &Path) -> Result<Network> {
    if !path.is_file() {
        return Err(NmbsError::MissingSource(format!(
            "GTFS archive {}",
            path.display()
        )));
    }
    let mut archive = open_archive(path)?;

    let stations = parse_stations(&mut archive)?;
    info!(count = stations.len(), "Parsed GTFS stations");

    let lines = match build_lines(&mut archive, &stations) {
        Ok(lines) => lines,
        Err(e) => {
            warn!(error = %e, "No route lines, showing stations only");
            Vec::new()
        }
    };
    info!(count = lines.len(), "Built route lines");

    let mut stations: Vec<Station> = stations.into_values().collect();
    stations.sort_by(|a, b| a.stop_id.cmp(&b.stop_id));
    Ok(Network { stations, lines })
}

/// Coordinates Leaflet can draw: finite and inside the WGS84 range.
pub fn is_valid_position(lat: f64, lon: f64) -> bool {
    (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)
}

/// Finds a table by file name, also inside a folder of the archive.
fn table_reader<'a>(
    archive: &'a mut zip::ZipArchive<File>,
    file_name: &str,
) -> Result<csv::Reader<impl Read + 'a>> {
    let member = archive
        .file_names()
        .filter(|m| base_name(m) == file_name)
        .min_by_key(|m| m.len())
        .map(str::to_string)
        .ok_or_else(|| NmbsError::MissingSource(file_name.to_string()))?;
    Ok(csv::Reader::from_reader(archive.by_name(&member)?))
}

fn parse_stations(archive: &mut zip::ZipArchive<File>) -> Result<HashMap<String, Station>> {
    let mut rdr = table_reader(archive, "stops.txt")?;
    let headers = rdr.headers()?.clone();
    let idx = |name: &str| headers.iter().position(|h| h == name);
    let idx_id = idx("stop_id")
        .ok_or_else(|| NmbsError::decode("stops.txt", "missing stop_id column"))?;
    let idx_name = idx("stop_name");
    let idx_lat = idx("stop_lat");
    let idx_lon = idx("stop_lon");

    let mut stations = HashMap::new();
    let mut unlocated = 0usize;
    for result in rdr.records() {
        let record = result?;
        let coord = |i: Option<usize>| -> Option<f64> {
            i.and_then(|i| record.get(i)).and_then(|s| s.trim().parse().ok())
        };
        let stop_id = record.get(idx_id).unwrap_or("").to_string();
        let (Some(lat), Some(lon)) = (coord(idx_lat), coord(idx_lon)) else {
            unlocated += 1;
            continue;
        };
        if !is_valid_position(lat, lon) {
            unlocated += 1;
            continue;
        }
        if stop_id.is_empty() {
            unlocated += 1;
            continue;
        }
        let name = idx_name
            .and_then(|i| record.get(i))
            .filter(|s| !s.is_empty())
            .unwrap_or(stop_id.as_str())
            .to_string();
        stations.insert(stop_id.clone(), Station { stop_id, name, lat, lon });
    }
    if unlocated > 0 {
        debug!(unlocated, "Skipped stops without id or coordinates");
    }
    Ok(stations)
}

fn parse_routes(archive: &mut zip::ZipArchive<File>) -> Result<HashMap<String, RouteInfo>> {
    let mut rdr = match table_reader(archive, "routes.txt") {
        Ok(rdr) => rdr,
        Err(NmbsError::MissingSource(_)) => return Ok(HashMap::new()),
        Err(e) => return Err(e),
    };
    let headers = rdr.headers()?.clone();
    let idx = |name: &str| headers.iter().position(|h| h == name);
    let Some(idx_id) = idx("route_id") else {
        return Ok(HashMap::new());
    };
    let idx_short = idx("route_short_name");
    let idx_long = idx("route_long_name");
    let idx_type = idx("route_type");

    let mut routes = HashMap::new();
    for result in rdr.records() {
        let record = result?;
        let field = |i: Option<usize>| i.and_then(|i| record.get(i)).filter(|s| !s.is_empty());
        let route_id = record.get(idx_id).unwrap_or("").to_string();
        let name = field(idx_short)
            .or_else(|| field(idx_long))
            .unwrap_or(route_id.as_str())
            .to_string();
        let route_type = field(idx_type).and_then(|s| s.parse().ok()).unwrap_or(2);
        routes.insert(route_id, RouteInfo { name, route_type });
    }
    Ok(routes)
}

fn build_lines(
    archive: &mut zip::ZipArchive<File>,
    stations: &HashMap<String, Station>,
) -> Result<Vec<RouteLine>> {
    let routes = parse_routes(archive)?;
    let (selected, wanted) = select_trips(archive)?;
    let stops_per_trip = read_trip_stops(archive, &wanted, selected.len())?;

    let mut lines = Vec::new();
    for ((trip_id, route_id), mut stops) in selected.into_iter().zip(stops_per_trip) {
        stops.sort_by_key(|(sequence, _)| *sequence);
        let points: Vec<[f64; 2]> = stops
            .iter()
            .filter_map(|(_, stop_id)| stations.get(stop_id))
            .map(|s| [s.lat, s.lon])
            .collect();
        if points.len() < 2 {
            continue;
        }
        let (route_name, route_type) = routes
            .get(&route_id)
            .map(|r| (r.name.clone(), r.route_type))
            .unwrap_or_else(|| (route_id.clone(), 2));
        lines.push(RouteLine {
            route_id,
            route_name,
            route_type,
            trip_id,
            points,
        });
    }
    Ok(lines)
}

/// First [`MAX_ROUTE_LINES`] distinct trips in file order, with the slot of
/// each trip id.
fn select_trips(
    archive: &mut zip::ZipArchive<File>,
) -> Result<(Vec<(String, String)>, HashMap<String, usize>)> {
    let mut rdr = table_reader(archive, "trips.txt")?;
    let headers = rdr.headers()?.clone();
    let idx_trip = headers
        .iter()
        .position(|h| h == "trip_id")
        .ok_or_else(|| NmbsError::decode("trips.txt", "missing trip_id column"))?;
    let idx_route = headers.iter().position(|h| h == "route_id");

    let mut selected: Vec<(String, String)> = Vec::new();
    let mut wanted: HashMap<String, usize> = HashMap::new();
    for result in rdr.records() {
        if selected.len() >= MAX_ROUTE_LINES {
            break;
        }
        let record = result?;
        let trip_id = record.get(idx_trip).unwrap_or("").to_string();
        if trip_id.is_empty() || wanted.contains_key(&trip_id) {
            continue;
        }
        let route_id = idx_route
            .and_then(|i| record.get(i))
            .unwrap_or("")
            .to_string();
        wanted.insert(trip_id.clone(), selected.len());
        selected.push((trip_id, route_id));
    }
    Ok((selected, wanted))
}

/// `(stop_sequence, stop_id)` pairs of the wanted trips, by slot.
fn read_trip_stops(
    archive: &mut zip::ZipArchive<File>,
    wanted: &HashMap<String, usize>,
    slots: usize,
) -> Result<Vec<Vec<(u32, String)>>> {
    let mut rdr = table_reader(archive, "stop_times.txt")?;
    let headers = rdr.headers()?.clone();
    let position = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| NmbsError::decode("stop_times.txt", format!("missing {name} column")))
    };
    let idx_trip = position("trip_id")?;
    let idx_stop = position("stop_id")?;
    let idx_seq = position("stop_sequence")?;

    let mut stops_per_trip: Vec<Vec<(u32, String)>> = vec![Vec::new(); slots];
    for result in rdr.records() {
        let record = result?;
        let Some(&slot) = record.get(idx_trip).and_then(|t| wanted.get(t)) else {
            continue;
        };
        let sequence = record
            .get(idx_seq)
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0);
        let stop_id = record.get(idx_stop).unwrap_or("").to_string();
        stops_per_trip[slot].push((sequence, stop_id));
    }
    Ok(stops_per_trip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planning::fixtures::{stops_csv, write_zip};

    #[test]
    fn test_count_tables_exact_record_counts() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("gtfs.zip");
        write_zip(
            &path,
            &[
                ("stops.txt", stops_csv(10).as_str()),
                ("routes.txt", "route_id,route_type\nA,2\nB,2\nC,2\nD,2\nE,2\n"),
                ("README.md", "ignored"),
            ],
        );

        let (tables, skipped) = count_tables(&path).unwrap();

        assert_eq!(tables.get("stops"), Some(&10));
        assert_eq!(tables.get("routes"), Some(&5));
        assert_eq!(tables.len(), 2);
        assert!(skipped.is_empty());
    }

    #[test]
    fn test_count_tables_skips_invalid_utf8_table() {
        use std::io::Write;
        use zip::write::SimpleFileOptions;

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("gtfs.zip");
        let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
        zip.start_file("stops.txt", SimpleFileOptions::default()).unwrap();
        zip.write_all(stops_csv(2).as_bytes()).unwrap();
        zip.start_file("trips.txt", SimpleFileOptions::default()).unwrap();
        zip.write_all(b"trip_id\n\xff\xfe\n").unwrap();
        zip.finish().unwrap();

        let (tables, skipped) = count_tables(&path).unwrap();

        assert_eq!(tables.get("stops"), Some(&2));
        assert!(!tables.contains_key("trips"));
        assert_eq!(skipped.len(), 1);
        assert!(skipped[0].starts_with("trips:"));
    }

    #[test]
    fn test_read_network_builds_ordered_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("gtfs.zip");
        write_zip(
            &path,
            &[
                (
                    "stops.txt",
                    "stop_id,stop_name,stop_lat,stop_lon\n\
                     A,Brussel-Zuid,50.835,4.336\n\
                     B,Gent-Sint-Pieters,51.036,3.710\n\
                     C,Brugge,51.197,3.217\n\
                     X,Nowhere,,\n",
                ),
                ("routes.txt", "route_id,route_short_name,route_type\nR1,IC,101\n"),
                ("trips.txt", "route_id,trip_id\nR1,T1\nR1,T2\n"),
                (
                    "stop_times.txt",
                    "trip_id,stop_id,stop_sequence\n\
                     T1,C,3\nT1,A,1\nT1,B,2\n\
                     T2,A,1\nT2,X,2\n",
                ),
            ],
        );

        let network = read_network(&path).unwrap();

        assert_eq!(network.stations.len(), 3);
        assert_eq!(network.lines.len(), 1);
        let line = &network.lines[0];
        assert_eq!(line.trip_id, "T1");
        assert_eq!(line.route_name, "IC");
        assert_eq!(line.route_type, 101);
        assert_eq!(line.points[0], [50.835, 4.336]);
        assert_eq!(line.points[2], [51.197, 3.217]);
    }

    #[test]
    fn test_read_network_stations_only() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("stops.zip");
        write_zip(&path, &[("stops.txt", stops_csv(4).as_str())]);

        let network = read_network(&path).unwrap();

        assert_eq!(network.stations.len(), 4);
        assert!(network.lines.is_empty());
    }

    #[test]
    fn test_read_network_missing_archive() {
        let tmp = tempfile::tempdir().unwrap();
        let err = read_network(&tmp.path().join("absent.zip")).unwrap_err();
        assert!(matches!(err, NmbsError::MissingSource(_)));
    }
    #[test]
    fn test_read_network_tables_in_folder() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested.zip");
        write_zip(
            &path,
            &[
                ("gtfs/stops.txt", "stop_id,stop_name,stop_lat,stop_lon
A,X,50.8,4.3
B,Y,51.0,3.7
"),
                ("gtfs/trips.txt", "route_id,trip_id
R1,T1
"),
                ("gtfs/stop_times.txt", "trip_id,stop_id,stop_sequence
T1,A,1
T1,B,2
"),
            ],
        );

        let network = read_network(&path).unwrap();

        assert_eq!(network.stations.len(), 2);
        assert_eq!(network.lines.len(), 1);
        assert_eq!(network.lines[0].route_name, "R1");
    }

    #[test]
    fn test_read_network_skips_non_finite_and_out_of_range_coordinates() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("gtfs.zip");
        write_zip(
            &path,
            &[(
                "stops.txt",
                "stop_id,stop_name,stop_lat,stop_lon
                 A,X,50.8,4.3
                 B,Y,NaN,inf
                 C,Z,infinity,4.0
                 D,W,95.0,4.0
                 E,V,50.0,-181.0
",
            )],
        );

        let network = read_network(&path).unwrap();

        assert_eq!(network.stations.len(), 1);
        assert_eq!(network.stations[0].stop_id, "A");
    }

    #[test]
    fn test_is_valid_position() {
        assert!(is_valid_position(50.8, 4.3));
        assert!(is_valid_position(-90.0, 180.0));
        assert!(!is_valid_position(f64::NAN, 4.3));
        assert!(!is_valid_position(50.8, f64::INFINITY));
        assert!(!is_valid_position(90.5, 0.0));
    }
}
