//! CLI entry point for the NMBS train data tool.
//!
//! Provides subcommands to analyze planning and real-time data, render the
//! route map, poll the real-time API and serve the dashboard.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use nmbs_data::{
    Config, DataPaths,
    dashboard,
    fetch::{ApiClient, BasicClient, client_from_config, fetch_payload},
    map::{MapOptions, find_gtfs_archive, generate_map},
    output::{print_json, print_pretty},
    overview::{aggregate, write_report},
    planning::{PlanningDataset, load_directory},
    poll::Poller,
    realtime::{PayloadFormat, decode_payload, parse_payload, snapshot_provider},
    stats::FeedStats,
};
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "nmbs_data")]
#[command(about = "Analyze and visualize NMBS/SNCB train data", long_about = None)]
struct Cli {
    /// Root of the planning and real-time data directories
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Where reports and maps are written
    #[arg(long, global = true)]
    reports_dir: Option<PathBuf>,

    /// Read real-time data from the remote API instead of cached files
    #[arg(long, global = true, default_value_t = false)]
    remote_realtime: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Count planning records, read real-time data and write the overview report
    Analyze,
    /// Serve the dashboard
    Webapp {
        /// Port to listen on (defaults to PORT or 8050)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Render the train routes map
    Visualize {
        /// Use the light theme
        #[arg(long, default_value_t = false)]
        light: bool,

        /// Leave out live vehicle markers
        #[arg(long, default_value_t = false)]
        no_realtime: bool,

        /// GTFS archive to draw (defaults to the first one in the planning directory)
        #[arg(long, value_name = "FILE")]
        gtfs: Option<PathBuf>,
    },
    /// Analyze, visualize, then serve the dashboard
    All {
        /// Use the light theme
        #[arg(long, default_value_t = false)]
        light: bool,
    },
    /// Poll the real-time API and cache every payload
    Poll {
        /// Seconds between ticks (defaults to INTERVAL or 30)
        #[arg(short, long)]
        interval: Option<u64>,

        /// Number of ticks (0 = run until stopped)
        #[arg(short = 'n', long, default_value_t = 0)]
        samples: u64,

        /// Gzip the cached payloads
        #[arg(long, default_value_t = false)]
        gzip: bool,

        /// Seconds between remote planning summaries (defaults to
        /// NMBS_PLANNING_INTERVAL_SECS or 86400; 0 disables them)
        #[arg(long)]
        planning_interval: Option<u64>,
    },
    /// Decode one GTFS-RT file or URL and log its statistics
    Inspect {
        /// Path to file or URL to fetch
        #[arg(value_name = "FILE_OR_URL")]
        source: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/nmbs_data.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("nmbs_data.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(
            EnvFilter::try_from_env("RUST_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        );

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(
            EnvFilter::try_from_env("RUST_LOG_JSON").unwrap_or_else(|_| EnvFilter::new("debug")),
        );

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Some(dir) = cli.reports_dir {
        config.reports_dir = dir;
    }
    let remote = cli.remote_realtime;

    match cli.command {
        Commands::Analyze => {
            let paths = DataPaths::ensure(&config)?;
            analyze(&config, &paths, remote).await?;
        }
        Commands::Webapp { port } => {
            let paths = DataPaths::ensure(&config)?;
            dashboard::serve(paths, port.unwrap_or(config.port)).await?;
        }
        Commands::Visualize {
            light,
            no_realtime,
            gtfs,
        } => {
            let paths = DataPaths::ensure(&config)?;
            let options = MapOptions {
                dark_mode: !light,
                include_realtime: !no_realtime,
            };
            visualize(&config, &paths, options, gtfs, remote).await?;
        }
        Commands::All { light } => {
            let paths = DataPaths::ensure(&config)?;
            analyze(&config, &paths, remote).await?;
            let options = MapOptions {
                dark_mode: !light,
                include_realtime: true,
            };
            // The dashboard is still useful without a map.
            if let Err(e) = visualize(&config, &paths, options, None, remote).await {
                warn!(error = %e, "Map generation failed");
            }
            dashboard::serve(paths, config.port).await?;
        }
        Commands::Poll {
            interval,
            samples,
            gzip,
            planning_interval,
        } => {
            let paths = DataPaths::ensure(&config)?;
            let interval = interval
                .map(Duration::from_secs)
                .unwrap_or(config.poll_interval);
            let planning_interval = planning_interval
                .map(Duration::from_secs)
                .unwrap_or(config.planning_interval);
            let api = ApiClient::new(client_from_config(&config)?, &config.api_base_url);
            Poller::new(api, config.realtime_endpoints.clone(), &paths, interval)
                .with_gzip(gzip)
                .with_planning_interval((!planning_interval.is_zero()).then_some(planning_interval))
                .run(samples)
                .await?;
        }
        Commands::Inspect { source } => {
            let (bytes, format) = fetcher(&config, &source).await?;
            let payload = decode_payload(bytes, &source)?;
            let feed = parse_payload(&payload, format, &source)?;
            print_pretty(&feed.header);
            let stats = FeedStats::from_feed(&feed).with_source(&source);
            print_json(&stats)?;
        }
    }

    Ok(())
}

/// Builds and persists the overview report.
#[tracing::instrument(skip(config, paths))]
async fn analyze(config: &Config, paths: &DataPaths, remote: bool) -> Result<()> {
    let mut datasets = load_directory(&paths.planning_dir)?;

    if remote {
        let api = ApiClient::new(client_from_config(config)?, &config.api_base_url);
        match api.health().await {
            Ok(status) => info!(%status, "Remote API reachable"),
            Err(e) => warn!(error = %e, "Remote API health check failed"),
        }
        let tables = api.remote_planning().await;
        if tables.is_empty() {
            warn!("No remote planning tables available");
        } else {
            datasets.push(PlanningDataset::from_remote(&config.api_base_url, &tables));
        }
    }

    let provider = snapshot_provider(config, &paths.realtime_dir, remote)?;
    let snapshot = match provider.latest().await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!(kind = e.kind(), error = %e, "Real-time data unavailable");
            None
        }
    };

    let report = aggregate(&datasets, snapshot.as_ref(), Utc::now())?;
    write_report(&report, &paths.overview_file())?;
    info!(
        datasets = report.datasets.len(),
        realtime = report.realtime.is_some(),
        "Analysis complete"
    );
    Ok(())
}

async fn visualize(
    config: &Config,
    paths: &DataPaths,
    options: MapOptions,
    gtfs: Option<PathBuf>,
    remote: bool,
) -> Result<()> {
    let gtfs = match gtfs {
        Some(path) => path,
        None => find_gtfs_archive(&paths.planning_dir)?,
    };
    let provider = snapshot_provider(config, &paths.realtime_dir, remote)?;
    let artifact = generate_map(
        &gtfs,
        &paths.map_file(options.dark_mode),
        options,
        provider.as_ref(),
    )
    .await?;
    info!(path = %artifact.path.display(), "Open the map in a browser");
    Ok(())
}

/// Loads feed data from a local file path or fetches it over HTTP, with the
/// encoding named by the content type or file extension.
#[tracing::instrument(skip(config), fields(source = %source))]
async fn fetcher(config: &Config, source: &str) -> Result<(Vec<u8>, PayloadFormat)> {
    if source.starts_with("http") {
        let client = BasicClient::new(&config.user_agent, config.request_timeout)?;
        let payload = fetch_payload(&client, source).await?;
        let format = PayloadFormat::from_content_type(payload.content_type.as_deref());
        Ok((payload.body.to_vec(), format))
    } else {
        Ok((std::fs::read(source)?, PayloadFormat::from_path(Path::new(source))))
    }
}
