use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::OverviewReport;
use crate::error::Result;
use crate::output::write_atomic;

/// `<stem>_summary.txt` next to the JSON report.
pub fn summary_path(report_path: &Path) -> PathBuf {
    let stem = report_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "overview".to_string());
    report_path.with_file_name(format!("{stem}_summary.txt"))
}

/// Replaces the report at `path` atomically, then its text summary.
pub fn write_report(report: &OverviewReport, path: &Path) -> Result<()> {
    let json = serde_json::to_vec_pretty(report)?;
    write_atomic(path, &json)?;
    info!(path = %path.display(), "Overview report written");

    let summary = summary_path(path);
    write_atomic(&summary, report.summary_text().as_bytes())?;
    debug!(path = %summary.display(), "Overview summary written");
    Ok(())
}

/// The last persisted report, or `None` when there is none yet.
pub fn load_report(path: &Path) -> Result<Option<OverviewReport>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overview::aggregate;
    use crate::planning::{FormatKind, ParseStatus, PlanningDataset};
    use chrono::{DateTime, Utc};
    use std::collections::BTreeMap;

    fn report(ts: i64) -> OverviewReport {
        let dataset = PlanningDataset {
            format: FormatKind::Gtfs,
            path: PathBuf::from("stops.zip"),
            name: "stops.zip".to_string(),
            tables: BTreeMap::from([("stops".to_string(), 10)]),
            status: ParseStatus::Parsed,
            skipped: Vec::new(),
        };
        aggregate(&[dataset], None, DateTime::<Utc>::from_timestamp(ts, 0).unwrap()).unwrap()
    }

    #[test]
    fn test_write_then_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("train_data_overview.json");

        write_report(&report(1), &path).unwrap();
        write_report(&report(2), &path).unwrap();

        let loaded = load_report(&path).unwrap().unwrap();
        assert_eq!(loaded, report(2));
        assert!(tmp.path().join("train_data_overview_summary.txt").is_file());
        // Only the report and its summary, no leftover temp files.
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_load_missing_report() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(load_report(&tmp.path().join("none.json")).unwrap().is_none());
    }

    #[test]
    fn test_summary_path() {
        assert_eq!(
            summary_path(Path::new("reports/train_data_overview.json")),
            PathBuf::from("reports/train_data_overview_summary.txt")
        );
    }
}
