use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nmbs_data::config::{Config, RealtimeEndpoint, StalePolicy};
use nmbs_data::fetch::{ApiClient, HttpClient};
use nmbs_data::gtfs_rt::trip_update::stop_time_update::StopTimeProperties;
use nmbs_data::gtfs_rt::trip_update::{StopTimeEvent, StopTimeUpdate};
use nmbs_data::gtfs_rt::{self, FeedEntity, FeedHeader, FeedMessage, TripDescriptor};
use nmbs_data::map::{MapOptions, generate_map};
use nmbs_data::overview::{aggregate, load_report, write_report};
use nmbs_data::paths::DataPaths;
use nmbs_data::planning::{FormatKind, load_directory};
use nmbs_data::poll::Poller;
use nmbs_data::realtime::{
    FeedVariant, LocalSnapshotProvider, RealtimeSnapshot, SnapshotProvider, apply_stale_policy,
    discover_local, merge, normalize, read_local_snapshot,
};
use prost::Message;
use zip::write::SimpleFileOptions;

fn write_zip(path: &Path, members: &[(&str, String)]) {
    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    for (name, contents) in members {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(contents.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

/// GTFS archive with `stops` stations and `routes` routes, one two-stop trip
/// per route.
fn write_gtfs(path: &Path, stops: usize, routes: usize) {
    let mut stops_txt = String::from("stop_id,stop_name,stop_lat,stop_lon\n");
    for i in 0..stops {
        stops_txt.push_str(&format!("S{i},Station {i},50.{i:02},4.{i:02}\n"));
    }
    let mut routes_txt = String::from("route_id,route_short_name,route_type\n");
    let mut trips_txt = String::from("route_id,trip_id\n");
    let mut stop_times_txt = String::from("trip_id,stop_id,stop_sequence\n");
    for r in 0..routes {
        routes_txt.push_str(&format!("R{r},IC{r},2\n"));
        trips_txt.push_str(&format!("R{r},T{r}\n"));
        stop_times_txt.push_str(&format!("T{r},S0,1\nT{r},S1,2\n"));
    }
    write_zip(
        path,
        &[
            ("stops.txt", stops_txt),
            ("routes.txt", routes_txt),
            ("trips.txt", trips_txt),
            ("stop_times.txt", stop_times_txt),
        ],
    );
}

fn layout(tmp: &Path) -> (Config, DataPaths) {
    let config = Config::new(tmp.join("data"), tmp.join("reports"));
    let paths = DataPaths::ensure(&config).unwrap();
    (config, paths)
}

fn trip_feed(timestamp: u64, trip_id: &str, delay: i32, platform: Option<&str>) -> FeedMessage {
    FeedMessage {
        header: FeedHeader {
            gtfs_realtime_version: "2.0".to_string(),
            timestamp: Some(timestamp),
            ..Default::default()
        },
        entity: vec![FeedEntity {
            id: trip_id.to_string(),
            trip_update: Some(gtfs_rt::TripUpdate {
                trip: TripDescriptor {
                    trip_id: Some(trip_id.to_string()),
                    ..Default::default()
                },
                stop_time_update: vec![StopTimeUpdate {
                    stop_sequence: Some(1),
                    stop_id: Some("8814001".to_string()),
                    departure: Some(StopTimeEvent {
                        delay: Some(delay),
                        ..Default::default()
                    }),
                    stop_time_properties: platform.map(|p| StopTimeProperties {
                        assigned_stop_id: Some(p.to_string()),
                    }),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        }],
    }
}

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(secs, 0).unwrap()
}

/// Counts how often the map asked for real-time data.
#[derive(Default)]
struct CountingProvider {
    calls: AtomicUsize,
}

#[async_trait]
impl SnapshotProvider for CountingProvider {
    async fn latest(&self) -> nmbs_data::Result<Option<RealtimeSnapshot>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    }
}

/// Answers every request with the same status and body.
struct FixedClient {
    status: u16,
    body: Vec<u8>,
    requests: AtomicUsize,
}

#[async_trait]
impl HttpClient for FixedClient {
    async fn execute(&self, _req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let response = http::Response::builder()
            .status(self.status)
            .body(self.body.clone())
            .unwrap();
        Ok(reqwest::Response::from(response))
    }
}

#[test]
fn test_gtfs_only_directory_report() {
    let tmp = tempfile::tempdir().unwrap();
    let (_, paths) = layout(tmp.path());
    write_gtfs(&paths.planning_dir.join("stops.zip"), 10, 5);

    let datasets = load_directory(&paths.planning_dir).unwrap();
    let snapshot = read_local_snapshot(&tmp.path().join("no_realtime")).unwrap();
    let report = aggregate(&datasets, snapshot.as_ref(), Utc::now()).unwrap();
    write_report(&report, &paths.overview_file()).unwrap();

    let json: serde_json::Value =
        serde_json::from_slice(&std::fs::read(paths.overview_file()).unwrap()).unwrap();
    assert_eq!(json["counts"]["gtfs"]["stops"], 10);
    assert_eq!(json["counts"]["gtfs"]["routes"], 5);
    assert!(json.get("realtime").is_none());
    assert_eq!(load_report(&paths.overview_file()).unwrap(), Some(report));
}

#[test]
fn test_malformed_netex_does_not_abort_load() {
    let tmp = tempfile::tempdir().unwrap();
    let (_, paths) = layout(tmp.path());
    write_gtfs(&paths.planning_dir.join("gtfs.zip"), 3, 1);
    std::fs::write(
        paths.planning_dir.join("netex.xml"),
        "<PublicationDelivery><StopPlace></Line></PublicationDelivery>",
    )
    .unwrap();
    std::fs::write(paths.planning_dir.join("notes.pdf"), b"%PDF-1.4").unwrap();

    let datasets = load_directory(&paths.planning_dir).unwrap();

    assert_eq!(datasets.len(), 1);
    assert_eq!(datasets[0].format, FormatKind::Gtfs);
    assert_eq!(datasets[0].count("stops"), 3);
}

#[test]
fn test_aggregation_is_deterministic() {
    let tmp = tempfile::tempdir().unwrap();
    let (_, paths) = layout(tmp.path());
    write_gtfs(&paths.planning_dir.join("gtfs.zip"), 4, 2);
    std::fs::write(
        paths.planning_dir.join("netex.xml"),
        "<PublicationDelivery><StopPlace/><StopPlace/><Line/></PublicationDelivery>",
    )
    .unwrap();
    let datasets = load_directory(&paths.planning_dir).unwrap();

    let first = aggregate(&datasets, None, at(1_000)).unwrap();
    let mut second = aggregate(&datasets, None, at(2_000)).unwrap();
    assert_ne!(first.generated_at, second.generated_at);
    second.generated_at = first.generated_at;

    assert_eq!(first, second);
    assert_eq!(first.total_records(FormatKind::Netex, "StopPlace"), 2);
}

#[test]
fn test_platform_change_variant_wins_merge() {
    let with_platform = normalize(
        &trip_feed(100, "IC-1510", 120, Some("8814001_12")),
        FeedVariant::WithPlatformChanges,
    );
    let without_platform = normalize(
        &trip_feed(200, "IC-1510", 0, None),
        FeedVariant::WithoutPlatformChanges,
    );

    let snapshot = merge(vec![without_platform, with_platform], at(300));

    assert_eq!(snapshot.trip_updates.len(), 1);
    let trip = &snapshot.trip_updates[0];
    assert_eq!(trip.variant, FeedVariant::WithPlatformChanges);
    assert_eq!(trip.delay_seconds, Some(120));
    assert!(trip.has_platform_change());
    assert_eq!(snapshot.platform_change_count(), 1);
}

#[tokio::test]
async fn test_map_without_realtime_never_asks_provider() {
    let tmp = tempfile::tempdir().unwrap();
    let (_, paths) = layout(tmp.path());
    let gtfs = paths.planning_dir.join("stops.zip");
    write_gtfs(&gtfs, 10, 5);
    let provider = CountingProvider::default();

    let artifact = generate_map(
        &gtfs,
        &paths.map_file(false),
        MapOptions {
            dark_mode: false,
            include_realtime: false,
        },
        &provider,
    )
    .await
    .unwrap();

    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    assert_eq!(artifact.stations, 10);
    assert_eq!(artifact.route_lines, 5);
    assert!(paths.map_file(false).is_file());
}

#[tokio::test]
async fn test_map_with_missing_realtime_has_static_layers_only() {
    let tmp = tempfile::tempdir().unwrap();
    let (config, paths) = layout(tmp.path());
    let gtfs = paths.planning_dir.join("stops.zip");
    write_gtfs(&gtfs, 10, 5);
    let provider = LocalSnapshotProvider {
        realtime_dir: paths.realtime_dir.clone(),
        stale_policy: config.stale_policy,
        validity_window: config.validity_window,
    };

    let artifact = generate_map(&gtfs, &paths.map_file(true), MapOptions::default(), &provider)
        .await
        .unwrap();

    assert_eq!(artifact.vehicles, 0);
    assert_eq!(artifact.stations, 10);
    let page = std::fs::read_to_string(&artifact.path).unwrap();
    assert!(page.contains("dark_all"));
}

#[tokio::test]
async fn test_map_from_gtfs_in_archive_folder() {
    let tmp = tempfile::tempdir().unwrap();
    let (_, paths) = layout(tmp.path());
    let gtfs = paths.planning_dir.join("nested.zip");
    write_zip(
        &gtfs,
        &[
            (
                "gtfs/stops.txt",
                "stop_id,stop_name,stop_lat,stop_lon\nA,X,50.8,4.3\nB,Y,NaN,inf\n".to_string(),
            ),
            ("gtfs/trips.txt", "route_id,trip_id\nR1,T1\n".to_string()),
        ],
    );

    let datasets = load_directory(&paths.planning_dir).unwrap();
    assert_eq!(datasets[0].format, FormatKind::Gtfs);
    assert_eq!(datasets[0].count("stops"), 2);

    let artifact = generate_map(
        &gtfs,
        &paths.map_file(true),
        MapOptions::default(),
        &CountingProvider::default(),
    )
    .await
    .unwrap();

    assert_eq!(artifact.stations, 1);
    assert_eq!(artifact.route_lines, 0);
    let page = std::fs::read_to_string(&artifact.path).unwrap();
    assert!(!page.contains("NaN"));
}

#[tokio::test]
async fn test_poller_appends_row_per_tick_and_replaces_cache() {
    let tmp = tempfile::tempdir().unwrap();
    let (_, paths) = layout(tmp.path());
    let client = FixedClient {
        status: 200,
        body: trip_feed(100, "IC-1", 60, None).encode_to_vec(),
        requests: AtomicUsize::new(0),
    };
    let poller = Poller::new(
        ApiClient::new(client, "http://api.test/api"),
        vec![RealtimeEndpoint {
            variant: FeedVariant::WithoutPlatformChanges,
            path: "realtime/data".to_string(),
        }],
        &paths,
        Duration::from_millis(1),
    );

    poller.run(2).await.unwrap();

    let history = std::fs::read_to_string(paths.poll_history_file()).unwrap();
    assert_eq!(history.lines().count(), 3);
    let cached = discover_local(&paths.realtime_dir);
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].variant, FeedVariant::WithoutPlatformChanges);
    let snapshot = read_local_snapshot(&paths.realtime_dir).unwrap().unwrap();
    assert_eq!(snapshot.trip_updates[0].trip_id, "IC-1");
}

#[tokio::test]
async fn test_poller_survives_http_errors() {
    let tmp = tempfile::tempdir().unwrap();
    let (_, paths) = layout(tmp.path());
    let client = FixedClient {
        status: 503,
        body: Vec::new(),
        requests: AtomicUsize::new(0),
    };
    let poller = Poller::new(
        ApiClient::new(client, "http://api.test/api"),
        vec![RealtimeEndpoint {
            variant: FeedVariant::WithPlatformChanges,
            path: "realtime/data".to_string(),
        }],
        &paths,
        Duration::from_millis(1),
    );

    poller.run(2).await.unwrap();

    assert_eq!(poller.api.client().requests.load(Ordering::SeqCst), 2);
    let history = std::fs::read_to_string(paths.poll_history_file()).unwrap();
    assert_eq!(history.matches("fetch_error").count(), 2);
    assert!(discover_local(&paths.realtime_dir).is_empty());
}

#[test]
fn test_stale_policies() {
    let feed = normalize(&trip_feed(1_000, "IC-1", 0, None), FeedVariant::WithPlatformChanges);
    let snapshot = merge(vec![feed], at(1_000));
    let window = Duration::from_secs(60);
    let later = at(1_000 + 3_600);

    let served = apply_stale_policy(snapshot.clone(), StalePolicy::Serve, window, later).unwrap();
    assert!(!served.stale);

    let flagged = apply_stale_policy(snapshot.clone(), StalePolicy::Flag, window, later).unwrap();
    assert!(flagged.stale);
    let report = aggregate(&[], Some(&flagged), later).unwrap();
    let section = report.realtime.unwrap();
    assert!(section.stale);
    assert_eq!(section.age_seconds, 3_600);

    assert!(apply_stale_policy(snapshot.clone(), StalePolicy::Discard, window, later).is_none());

    let fresh = apply_stale_policy(snapshot, StalePolicy::Discard, window, at(1_030)).unwrap();
    assert!(!fresh.stale);
}

#[test]
fn test_edifact_with_custom_separators() {
    let tmp = tempfile::tempdir().unwrap();
    let (_, paths) = layout(tmp.path());
    std::fs::write(
        paths.planning_dir.join("timetable.edi"),
        "UNA|*.! ~UNB*UNOC|3*NMBS*RECV~UNH*1*TSDUPD~FTX*release !~ kept~UNT*3*1~UNZ*1*1~",
    )
    .unwrap();

    let datasets = load_directory(&paths.planning_dir).unwrap();

    assert_eq!(datasets.len(), 1);
    assert_eq!(datasets[0].format, FormatKind::Edifact);
    assert_eq!(datasets[0].count("files"), 1);
    assert_eq!(datasets[0].count("messages"), 1);
    assert_eq!(datasets[0].count("segments"), 5);
}
