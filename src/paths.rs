//! Canonical on-disk layout for planning data, real-time caches and reports.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::realtime::FeedVariant;

pub const PLANNING_DIR_NAME: &str = "Planningsgegevens";
pub const REALTIME_DIR_NAME: &str = "Real-time_gegevens";
pub const MAPS_DIR_NAME: &str = "maps";
pub const OVERVIEW_FILE_NAME: &str = "train_data_overview.json";
pub const POLL_HISTORY_FILE_NAME: &str = "realtime_history.csv";
pub const REMOTE_PLANNING_FILE_NAME: &str = "remote_planning_summary.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    pub data_dir: PathBuf,
    pub planning_dir: PathBuf,
    pub realtime_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub maps_dir: PathBuf,
}

impl DataPaths {
    /// Computes the layout without touching the filesystem.
    pub fn from_config(config: &Config) -> Self {
        let data_dir = config.data_dir.clone();
        let reports_dir = config.reports_dir.clone();
        Self {
            planning_dir: data_dir.join(PLANNING_DIR_NAME),
            realtime_dir: data_dir.join(REALTIME_DIR_NAME),
            maps_dir: reports_dir.join(MAPS_DIR_NAME),
            data_dir,
            reports_dir,
        }
    }

    /// Computes the layout and creates every directory that is missing.
    pub fn ensure(config: &Config) -> Result<Self> {
        let paths = Self::from_config(config);
        for dir in paths.all_dirs() {
            ensure_dir(&dir)?;
        }
        info!(
            data_dir = %paths.data_dir.display(),
            reports_dir = %paths.reports_dir.display(),
            "Ensured data directories exist"
        );
        Ok(paths)
    }

    pub fn variant_dir(&self, variant: FeedVariant) -> PathBuf {
        self.realtime_dir.join(variant.dir_name())
    }

    pub fn overview_file(&self) -> PathBuf {
        self.reports_dir.join(OVERVIEW_FILE_NAME)
    }

    pub fn poll_history_file(&self) -> PathBuf {
        self.reports_dir.join(POLL_HISTORY_FILE_NAME)
    }

    /// Latest remote planning summary written by the poller.
    pub fn remote_planning_file(&self) -> PathBuf {
        self.reports_dir.join(REMOTE_PLANNING_FILE_NAME)
    }

    /// Map file name, suffixed for the light theme.
    pub fn map_file(&self, dark_mode: bool) -> PathBuf {
        let name = if dark_mode {
            "train_routes_map.html"
        } else {
            "train_routes_map_light.html"
        };
        self.maps_dir.join(name)
    }

    fn all_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = vec![
            self.data_dir.clone(),
            self.planning_dir.clone(),
            self.realtime_dir.clone(),
        ];
        dirs.extend(FeedVariant::ALL.iter().map(|v| self.variant_dir(*v)));
        dirs.push(self.reports_dir.clone());
        dirs.push(self.maps_dir.clone());
        dirs
    }
}

/// Creates `dir`, replacing a regular file that squats on the path.
fn ensure_dir(dir: &Path) -> Result<()> {
    if dir.is_file() {
        warn!(path = %dir.display(), "Expected a directory but found a file, replacing it");
        std::fs::remove_file(dir)?;
    }
    if !dir.is_dir() {
        debug!(path = %dir.display(), "Creating directory");
    }
    std::fs::create_dir_all(dir)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_creates_full_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::new(tmp.path().join("data"), tmp.path().join("reports"));

        let paths = DataPaths::ensure(&config).unwrap();

        assert!(paths.planning_dir.is_dir());
        assert!(paths.maps_dir.is_dir());
        for variant in FeedVariant::ALL {
            assert!(paths.variant_dir(variant).is_dir());
        }
    }

    #[test]
    fn test_ensure_replaces_file_with_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::new(tmp.path().join("data"), tmp.path().join("reports"));
        let expected = DataPaths::from_config(&config);
        std::fs::create_dir_all(&expected.realtime_dir).unwrap();
        let squatter = expected.variant_dir(FeedVariant::WithPlatformChanges);
        std::fs::write(&squatter, b"not a directory").unwrap();

        DataPaths::ensure(&config).unwrap();

        assert!(squatter.is_dir());
    }

    #[test]
    fn test_ensure_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::new(tmp.path().join("data"), tmp.path().join("reports"));
        let first = DataPaths::ensure(&config).unwrap();
        let second = DataPaths::ensure(&config).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_map_file_light_suffix() {
        let paths = DataPaths::from_config(&Config::new("data", "reports"));
        assert!(paths.map_file(true).ends_with("maps/train_routes_map.html"));
        assert!(
            paths
                .map_file(false)
                .ends_with("maps/train_routes_map_light.html")
        );
    }
}
