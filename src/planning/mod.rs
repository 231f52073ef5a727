//! Static planning data: detection and record counting for GTFS, NeTEx,
//! Edifact and raw archives.

mod detect;
mod edifact;
pub mod gtfs;
mod netex;
mod rawdata;

pub use detect::detect_format;
pub use edifact::{EdifactCounts, count_edifact};
pub use gtfs::{Network, RouteLine, Station, is_valid_position, read_network};

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;
use crate::fetch::RemoteTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatKind {
    Gtfs,
    Netex,
    Edifact,
    Raw,
}

impl FormatKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FormatKind::Gtfs => "gtfs",
            FormatKind::Netex => "netex",
            FormatKind::Edifact => "edifact",
            FormatKind::Raw => "raw",
        }
    }
}

impl fmt::Display for FormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStatus {
    Parsed,
    /// Some tables could not be read and were left out.
    Partial,
}

/// Record counts of one recognized planning file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanningDataset {
    pub format: FormatKind,
    pub path: PathBuf,
    pub name: String,
    pub tables: BTreeMap<String, u64>,
    pub status: ParseStatus,
    /// Tables skipped while counting, with the reason.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,
}

impl PlanningDataset {
    fn new(format: FormatKind, path: &Path, tables: BTreeMap<String, u64>, skipped: Vec<String>) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            format,
            path: path.to_path_buf(),
            name,
            tables,
            status: if skipped.is_empty() {
                ParseStatus::Parsed
            } else {
                ParseStatus::Partial
            },
            skipped,
        }
    }

    /// GTFS dataset built from the tables served by the remote API.
    pub fn from_remote(base_url: &str, tables: &[RemoteTable]) -> Self {
        let counts = tables
            .iter()
            .map(|t| (t.name.trim_end_matches(".txt").to_string(), t.records))
            .collect();
        let mut dataset = Self::new(FormatKind::Gtfs, Path::new(base_url), counts, Vec::new());
        dataset.name = "remote planning data".to_string();
        dataset
    }

    pub fn count(&self, table: &str) -> u64 {
        self.tables.get(table).copied().unwrap_or(0)
    }
}

/// Detects and counts a single planning file.
pub fn load_file(path: &Path) -> Result<PlanningDataset> {
    let format = detect_format(path)?;
    let (tables, skipped) = match format {
        FormatKind::Gtfs => gtfs::count_tables(path)?,
        FormatKind::Netex => (netex::count_elements(path)?, Vec::new()),
        FormatKind::Edifact => (edifact::count_path(path)?, Vec::new()),
        FormatKind::Raw => (rawdata::count_archive(path)?, Vec::new()),
    };
    Ok(PlanningDataset::new(format, path, tables, skipped))
}

/// Loads every recognized file in `dir`, sorted by file name.
///
/// Unsupported, corrupt or malformed files are logged and skipped. A missing
/// directory yields no datasets.
#[tracing::instrument(skip_all, fields(dir = %dir.display()))]
pub fn load_directory(dir: &Path) -> Result<Vec<PlanningDataset>> {
    if !dir.is_dir() {
        warn!("Planning directory does not exist");
        return Ok(Vec::new());
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && !is_hidden(path))
        .collect();
    paths.sort();

    let mut datasets = Vec::new();
    for path in paths {
        match load_file(&path) {
            Ok(dataset) => {
                info!(
                    file = %dataset.name,
                    format = %dataset.format,
                    tables = dataset.tables.len(),
                    status = ?dataset.status,
                    "Loaded planning file"
                );
                datasets.push(dataset);
            }
            Err(e) => warn!(path = %path.display(), kind = e.kind(), error = %e, "Skipping planning file"),
        }
    }
    Ok(datasets)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|n| n.to_string_lossy().starts_with('.'))
}
