//! Periodic real-time collection for offline use.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{Instrument, error, info, warn};

use crate::config::RealtimeEndpoint;
use crate::error::{NmbsError, Result};
use crate::fetch::{ApiClient, HttpClient};
use crate::output::{append_record, write_atomic};
use crate::paths::DataPaths;
use crate::planning::PlanningDataset;
use crate::realtime::{fetch_endpoint, write_cache};
use crate::stats::FeedStats;

/// Fetches every endpoint once per tick, caches the payloads and appends
/// one statistics row per endpoint to the history CSV.
///
/// With a planning interval set, the remote planning summary is refreshed
/// on the first tick and again whenever the interval has elapsed.
pub struct Poller<C> {
    pub api: ApiClient<C>,
    pub endpoints: Vec<RealtimeEndpoint>,
    pub realtime_dir: PathBuf,
    pub history_file: PathBuf,
    pub planning_file: PathBuf,
    pub interval: Duration,
    pub planning_interval: Option<Duration>,
    pub gzip: bool,
}

/// Outcome of one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub cached: usize,
    pub failed: usize,
}

impl<C: HttpClient> Poller<C> {
    pub fn new(
        api: ApiClient<C>,
        endpoints: Vec<RealtimeEndpoint>,
        paths: &DataPaths,
        interval: Duration,
    ) -> Self {
        Self {
            api,
            endpoints,
            realtime_dir: paths.realtime_dir.clone(),
            history_file: paths.poll_history_file(),
            planning_file: paths.remote_planning_file(),
            interval,
            planning_interval: None,
            gzip: false,
        }
    }

    pub fn with_gzip(mut self, gzip: bool) -> Self {
        self.gzip = gzip;
        self
    }

    pub fn with_planning_interval(mut self, planning_interval: Option<Duration>) -> Self {
        self.planning_interval = planning_interval;
        self
    }

    /// Runs `ticks` ticks, or forever when `ticks` is 0.
    ///
    /// Ticks never overlap: a slow fetch pushes the next tick back.
    #[tracing::instrument(skip(self), fields(interval_secs = self.interval.as_secs(), gzip = self.gzip))]
    pub async fn run(&self, ticks: u64) -> Result<()> {
        if ticks == 0 {
            info!("Polling until the process is stopped");
        } else {
            info!(ticks, "Starting polling");
        }

        let mut tick = 0;
        let mut planning_refreshed: Option<Instant> = None;
        loop {
            if ticks > 0 && tick >= ticks {
                break;
            }
            tick += 1;

            if let Some(every) = self.planning_interval {
                if planning_refreshed.is_none_or(|at| at.elapsed() >= every) {
                    planning_refreshed = Some(Instant::now());
                    if let Err(e) = self.refresh_planning().await {
                        error!(kind = e.kind(), error = %e, "Remote planning refresh failed");
                    }
                }
            }

            let span = tracing::info_span!("poll_tick", tick);
            let report = self.tick().instrument(span).await;
            info!(tick, cached = report.cached, failed = report.failed, "Tick finished");

            if ticks == 0 || tick < ticks {
                tokio::time::sleep(self.interval).await;
            }
        }

        info!(ticks = tick, "Polling finished");
        Ok(())
    }

    /// Summarizes the remote planning tables and replaces the saved summary.
    pub async fn refresh_planning(&self) -> Result<PlanningDataset> {
        let tables = self.api.remote_planning().await;
        if tables.is_empty() {
            return Err(NmbsError::MissingSource(
                "remote planning tables".to_string(),
            ));
        }
        let dataset = PlanningDataset::from_remote(self.api.base_url(), &tables);
        write_atomic(&self.planning_file, &serde_json::to_vec_pretty(&dataset)?)?;
        info!(
            tables = dataset.tables.len(),
            path = %self.planning_file.display(),
            "Saved remote planning summary"
        );
        Ok(dataset)
    }

    /// One pass over all endpoints. Failures are recorded, never returned.
    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();

        for endpoint in &self.endpoints {
            let started = Instant::now();
            let row = match fetch_endpoint(&self.api, endpoint).await {
                Ok(fetched) => {
                    let elapsed = started.elapsed();
                    if elapsed > self.interval {
                        warn!(
                            variant = %endpoint.variant,
                            elapsed_secs = elapsed.as_secs(),
                            "Fetch took longer than the polling interval"
                        );
                    }
                    let feed = fetched.feed;
                    match write_cache(
                        &self.realtime_dir,
                        endpoint.variant,
                        &fetched.payload,
                        fetched.format,
                        self.gzip,
                    ) {
                        Ok(path) => {
                            report.cached += 1;
                            info!(
                                variant = %endpoint.variant,
                                path = %path.display(),
                                trip_updates = feed.trip_updates.len(),
                                vehicles = feed.vehicle_positions.len(),
                                "Snapshot cached"
                            );
                            feed.stats
                        }
                        Err(e) => {
                            report.failed += 1;
                            error!(variant = %endpoint.variant, error = %e, "Failed to cache snapshot");
                            FeedStats::from_error(e.kind(), &e.to_string())
                                .with_source(endpoint.variant.label())
                        }
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    error!(variant = %endpoint.variant, error = %e, "Real-time fetch failed");
                    FeedStats::from_error(e.kind(), &e.to_string())
                        .with_source(endpoint.variant.label())
                }
            };

            if let Err(e) = append_record(&self.history_file, &row) {
                error!(path = %self.history_file.display(), error = %e, "Failed to append history row");
            }
        }

        report
    }
}
