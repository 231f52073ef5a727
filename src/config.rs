//! Runtime configuration, passed explicitly into every component.
//!
//! Values come from the environment (a `.env` file is loaded by the binary
//! through `dotenvy`) with defaults, and the CLI overrides a few of them.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::realtime::FeedVariant;

pub const DEFAULT_API_URL: &str = "https://nmbsapi.sanderzijntestjes.be/api/";
pub const DEFAULT_USER_AGENT: &str = "nmbs-data/0.1";
pub const DEFAULT_REALTIME_PATH: &str = "realtime/data";

/// What to do with a real-time snapshot older than the validity window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StalePolicy {
    /// Use it as if it were fresh.
    Serve,
    /// Use it, but mark it `stale` in the snapshot and the report.
    Flag,
    /// Drop it; consumers see no real-time data.
    Discard,
}

impl FromStr for StalePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "serve" => Ok(StalePolicy::Serve),
            "flag" => Ok(StalePolicy::Flag),
            "discard" => Ok(StalePolicy::Discard),
            other => Err(format!("unknown stale policy '{other}'")),
        }
    }
}

/// A remote GTFS-RT endpoint, relative to the API base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealtimeEndpoint {
    pub variant: FeedVariant,
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub api_base_url: String,
    pub api_token: Option<String>,
    pub user_agent: String,
    pub realtime_endpoints: Vec<RealtimeEndpoint>,
    pub poll_interval: Duration,
    /// Time between remote planning summaries while polling.
    pub planning_interval: Duration,
    pub request_timeout: Duration,
    pub stale_policy: StalePolicy,
    pub validity_window: Duration,
    pub port: u16,
}

impl Config {
    /// Defaults rooted at the given directories.
    pub fn new(data_dir: impl Into<PathBuf>, reports_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            reports_dir: reports_dir.into(),
            api_base_url: DEFAULT_API_URL.to_string(),
            api_token: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            realtime_endpoints: vec![RealtimeEndpoint {
                variant: FeedVariant::WithPlatformChanges,
                path: DEFAULT_REALTIME_PATH.to_string(),
            }],
            poll_interval: Duration::from_secs(30),
            planning_interval: Duration::from_secs(24 * 60 * 60),
            request_timeout: Duration::from_secs(30),
            stale_policy: StalePolicy::Flag,
            validity_window: Duration::from_secs(6 * 60 * 60),
            port: 8050,
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup, so tests never touch the
    /// process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = lookup("NMBS_DATA_DIR").unwrap_or_else(|| "data".to_string());
        let reports_dir = lookup("NMBS_REPORTS_DIR").unwrap_or_else(|| "reports".to_string());
        let mut config = Self::new(data_dir, reports_dir);

        if let Some(url) = lookup("NMBS_API_URL") {
            config.api_base_url = url;
        }
        config.api_token = lookup("NMBS_API_TOKEN").filter(|t| !t.is_empty());
        if let Some(agent) = lookup("USER_AGENT") {
            config.user_agent = agent;
        }
        if let Some(path) = lookup("NMBS_REALTIME_PATH") {
            config.realtime_endpoints[0].path = path;
        }
        if let Some(path) = lookup("NMBS_REALTIME_PATH_WITHOUT_PLATFORM_CHANGES") {
            config.realtime_endpoints.push(RealtimeEndpoint {
                variant: FeedVariant::WithoutPlatformChanges,
                path,
            });
        }

        config.poll_interval =
            Duration::from_secs(parse_or(&lookup, "INTERVAL", config.poll_interval.as_secs()));
        config.planning_interval = Duration::from_secs(parse_or(
            &lookup,
            "NMBS_PLANNING_INTERVAL_SECS",
            config.planning_interval.as_secs(),
        ));
        config.request_timeout = Duration::from_secs(parse_or(
            &lookup,
            "NMBS_REQUEST_TIMEOUT_SECS",
            config.request_timeout.as_secs(),
        ));
        config.validity_window = Duration::from_secs(parse_or(
            &lookup,
            "NMBS_VALIDITY_WINDOW_SECS",
            config.validity_window.as_secs(),
        ));
        config.stale_policy = parse_or(&lookup, "NMBS_STALE_POLICY", config.stale_policy);
        config.port = parse_or(&lookup, "PORT", config.port);

        config
    }

    /// Joins an API-relative path onto the base URL.
    pub fn endpoint_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => match raw.parse() {
            Ok(value) => value,
            Err(e) => {
                warn!(key, value = %raw, error = %e, "Invalid configuration value, using default");
                default
            }
        },
    }
}
