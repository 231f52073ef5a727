//! Combines planning datasets and the latest real-time snapshot into one
//! report.

mod persist;

pub use persist::{load_report, summary_path, write_report};

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{NmbsError, Result};
use crate::planning::{FormatKind, PlanningDataset};
use crate::realtime::{FeedVariant, RealtimeSnapshot};
use crate::stats::FeedStats;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeSection {
    pub fetched_at: DateTime<Utc>,
    pub feed_timestamp: Option<DateTime<Utc>>,
    /// Seconds between the snapshot and report generation.
    pub age_seconds: i64,
    pub stale: bool,
    pub trip_updates: usize,
    pub vehicle_positions: usize,
    pub alerts: usize,
    pub platform_changes: usize,
    pub delayed_trips: usize,
    pub average_delay_seconds: Option<f64>,
    pub sources: Vec<FeedStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverviewReport {
    pub generated_at: DateTime<Utc>,
    /// Dataset names followed by the real-time variants that contributed.
    pub sources: Vec<String>,
    /// Number of datasets per format.
    pub files: BTreeMap<FormatKind, u64>,
    /// Format → table → summed record count.
    pub counts: BTreeMap<FormatKind, BTreeMap<String, u64>>,
    pub datasets: Vec<PlanningDataset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realtime: Option<RealtimeSection>,
}

/// Builds the report. Only `generated_at` depends on `now`, apart from the
/// snapshot age.
///
/// Fails with [`NmbsError::MissingSource`] when there are neither datasets
/// nor a snapshot.
pub fn aggregate(
    datasets: &[PlanningDataset],
    snapshot: Option<&RealtimeSnapshot>,
    now: DateTime<Utc>,
) -> Result<OverviewReport> {
    if datasets.is_empty() && snapshot.is_none() {
        return Err(NmbsError::MissingSource(
            "no planning datasets and no real-time snapshot".to_string(),
        ));
    }

    let mut files: BTreeMap<FormatKind, u64> = BTreeMap::new();
    let mut counts: BTreeMap<FormatKind, BTreeMap<String, u64>> = BTreeMap::new();
    for dataset in datasets {
        *files.entry(dataset.format).or_insert(0) += 1;
        let per_table = counts.entry(dataset.format).or_default();
        for (table, records) in &dataset.tables {
            *per_table.entry(table.clone()).or_insert(0) += records;
        }
    }

    let mut sources: Vec<String> = datasets.iter().map(|d| d.name.clone()).collect();
    let realtime = snapshot.map(|s| {
        sources.extend(
            s.sources
                .iter()
                .filter_map(|stats| stats.source.clone())
                .map(|label| format!("realtime:{label}")),
        );
        realtime_section(s, now)
    });

    let report = OverviewReport {
        generated_at: now,
        sources,
        files,
        counts,
        datasets: datasets.to_vec(),
        realtime,
    };
    info!(
        datasets = report.datasets.len(),
        realtime = report.realtime.is_some(),
        "Aggregated overview"
    );
    Ok(report)
}

fn realtime_section(snapshot: &RealtimeSnapshot, now: DateTime<Utc>) -> RealtimeSection {
    let delays: Vec<i32> = snapshot
        .trip_updates
        .iter()
        .filter_map(|t| t.delay_seconds)
        .collect();
    let average_delay_seconds = (!delays.is_empty())
        .then(|| delays.iter().map(|d| f64::from(*d)).sum::<f64>() / delays.len() as f64);

    RealtimeSection {
        fetched_at: snapshot.fetched_at,
        feed_timestamp: snapshot.feed_timestamp,
        age_seconds: (now - snapshot.observed_at()).num_seconds().max(0),
        stale: snapshot.stale,
        trip_updates: snapshot.trip_updates.len(),
        vehicle_positions: snapshot.vehicle_positions.len(),
        alerts: snapshot.alert_count,
        platform_changes: snapshot.platform_change_count(),
        delayed_trips: delays.iter().filter(|d| **d > 0).count(),
        average_delay_seconds,
        sources: snapshot.sources.clone(),
    }
}

impl OverviewReport {
    pub fn total_records(&self, format: FormatKind, table: &str) -> u64 {
        self.counts
            .get(&format)
            .and_then(|tables| tables.get(table))
            .copied()
            .unwrap_or(0)
    }

    /// Plain-text rendering written next to the JSON report.
    pub fn summary_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "NMBS Train Data Overview");
        let _ = writeln!(out, "Generated: {}", self.generated_at.to_rfc3339());
        let _ = writeln!(out);

        let _ = writeln!(out, "Planning Data:");
        for format in [
            FormatKind::Gtfs,
            FormatKind::Netex,
            FormatKind::Edifact,
            FormatKind::Raw,
        ] {
            let n = self.files.get(&format).copied().unwrap_or(0);
            let _ = writeln!(out, "  {} files: {n}", format.as_str().to_uppercase());
            if let Some(tables) = self.counts.get(&format) {
                for (table, records) in tables {
                    let _ = writeln!(out, "    {table}: {records}");
                }
            }
        }
        let _ = writeln!(out);

        let _ = writeln!(out, "Real-time Data:");
        match &self.realtime {
            None => {
                let _ = writeln!(out, "  none");
            }
            Some(rt) => {
                for variant in FeedVariant::ALL {
                    match rt
                        .sources
                        .iter()
                        .find(|s| s.source.as_deref() == Some(variant.label()))
                    {
                        Some(stats) => {
                            let _ = writeln!(
                                out,
                                "  {variant}: yes ({} entities, {:.0}% of vehicles positioned)",
                                stats.total_entities,
                                stats.position_pct()
                            );
                        }
                        None => {
                            let _ = writeln!(out, "  {variant}: no");
                        }
                    }
                }
                let _ = writeln!(out, "  Trip updates: {}", rt.trip_updates);
                let _ = writeln!(out, "  Vehicle positions: {}", rt.vehicle_positions);
                let _ = writeln!(out, "  Platform changes: {}", rt.platform_changes);
                let _ = writeln!(out, "  Alerts: {}", rt.alerts);
                let _ = writeln!(
                    out,
                    "  Age: {}s{}",
                    rt.age_seconds,
                    if rt.stale { " (stale)" } else { "" }
                );
            }
        }
        out
    }
}
