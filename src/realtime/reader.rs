use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::write::GzEncoder;
use tracing::{debug, info, warn};

use super::source::{PayloadFormat, decode_payload, discover_local, parse_payload, read_local};
use super::{FeedVariant, NormalizedFeed, RealtimeSnapshot, apply_stale_policy, merge, normalize};
use crate::config::{Config, RealtimeEndpoint, StalePolicy};
use crate::error::{NmbsError, Result};
use crate::fetch::{ApiClient, HttpClient, client_from_config};
use crate::output::write_atomic;

/// Reads every local variant and merges them.
///
/// Returns `Ok(None)` when no feed file exists. A source that cannot be read
/// or decoded is logged and skipped; the call fails only when every source
/// failed.
#[tracing::instrument(skip_all, fields(dir = %realtime_dir.display()))]
pub fn read_local_snapshot(realtime_dir: &Path) -> Result<Option<RealtimeSnapshot>> {
    let files = discover_local(realtime_dir);
    if files.is_empty() {
        debug!("No local real-time files");
        return Ok(None);
    }

    let mut feeds = Vec::new();
    let mut first_error = None;
    let mut newest: Option<DateTime<Utc>> = None;

    for file in files {
        let name = file.path.display().to_string();
        let format = PayloadFormat::from_path(&file.path);
        let decoded =
            read_local(&file.path).and_then(|bytes| parse_payload(&bytes, format, &name));
        match decoded {
            Ok(feed) => {
                info!(
                    path = %name,
                    variant = %file.variant,
                    entities = feed.entity.len(),
                    "Loaded real-time feed"
                );
                feeds.push(normalize(&feed, file.variant));
                let modified = DateTime::<Utc>::from(file.modified);
                newest = newest.max(Some(modified));
            }
            Err(e) => {
                warn!(path = %name, error = %e, "Skipping unreadable real-time file");
                first_error.get_or_insert(e);
            }
        }
    }

    finish(feeds, first_error, newest.unwrap_or_else(Utc::now)).map(Some)
}

/// Fetches every configured endpoint and merges the results.
///
/// With `cache_dir` set, each payload is also written to its variant
/// directory for offline replay.
#[tracing::instrument(skip_all, fields(endpoints = endpoints.len()))]
pub async fn read_remote_snapshot<C: HttpClient>(
    api: &ApiClient<C>,
    endpoints: &[RealtimeEndpoint],
    cache_dir: Option<&Path>,
) -> Result<RealtimeSnapshot> {
    let fetched_at = Utc::now();
    let mut feeds = Vec::new();
    let mut first_error = None;

    for endpoint in endpoints {
        match fetch_endpoint(api, endpoint).await {
            Ok(fetched) => {
                if let Some(dir) = cache_dir {
                    let cached =
                        write_cache(dir, endpoint.variant, &fetched.payload, fetched.format, false);
                    if let Err(e) = cached {
                        warn!(variant = %endpoint.variant, error = %e, "Failed to cache payload");
                    }
                }
                feeds.push(fetched.feed);
            }
            Err(e) => {
                warn!(path = %endpoint.path, error = %e, "Real-time endpoint failed");
                first_error.get_or_insert(e);
            }
        }
    }

    finish(feeds, first_error, fetched_at)
}

/// One endpoint's payload, as served, and its normalized records.
pub(crate) struct FetchedFeed {
    pub payload: Vec<u8>,
    pub format: PayloadFormat,
    pub feed: NormalizedFeed,
}

/// Fetch, gunzip if needed, parse and normalize one endpoint. The content
/// type picks the JSON or protobuf decoder.
pub(crate) async fn fetch_endpoint<C: HttpClient>(
    api: &ApiClient<C>,
    endpoint: &RealtimeEndpoint,
) -> Result<FetchedFeed> {
    let url = api.url(&endpoint.path);
    let response = api.realtime_payload(&endpoint.path).await?;
    let format = PayloadFormat::from_content_type(response.content_type.as_deref());
    let payload = decode_payload(response.body.to_vec(), &url)?;
    let feed = parse_payload(&payload, format, &url)?;
    Ok(FetchedFeed {
        feed: normalize(&feed, endpoint.variant),
        payload,
        format,
    })
}

fn finish(
    feeds: Vec<NormalizedFeed>,
    first_error: Option<NmbsError>,
    fetched_at: DateTime<Utc>,
) -> Result<RealtimeSnapshot> {
    match (feeds.is_empty(), first_error) {
        (true, Some(e)) => Err(e),
        (true, None) => Err(NmbsError::MissingSource(
            "no real-time source configured".to_string(),
        )),
        (false, _) => Ok(merge(feeds, fetched_at)),
    }
}

/// Atomically replaces the cached payload of `variant` under `realtime_dir`.
///
/// The file is named after the variant with an extension for `format` and
/// `gzip`. Cache files of the same variant under another extension are
/// removed, so one payload per variant remains.
pub fn write_cache(
    realtime_dir: &Path,
    variant: FeedVariant,
    payload: &[u8],
    format: PayloadFormat,
    gzip: bool,
) -> Result<PathBuf> {
    let dir = realtime_dir.join(variant.dir_name());
    std::fs::create_dir_all(&dir)?;
    let target = dir.join(cache_file_name(variant, format, gzip));

    if gzip {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(payload)?;
        write_atomic(&target, &encoder.finish()?)?;
    } else {
        write_atomic(&target, payload)?;
    }

    for other_format in PayloadFormat::ALL {
        for other_gzip in [false, true] {
            let sibling = dir.join(cache_file_name(variant, other_format, other_gzip));
            if sibling == target {
                continue;
            }
            match std::fs::remove_file(&sibling) {
                Ok(()) => debug!(path = %sibling.display(), "Removed superseded cache file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    debug!(path = %target.display(), bytes = payload.len(), "Cached real-time payload");
    Ok(target)
}

fn cache_file_name(variant: FeedVariant, format: PayloadFormat, gzip: bool) -> String {
    let suffix = if gzip { ".gz" } else { "" };
    format!("{}.{}{suffix}", variant.dir_name(), format.extension())
}

/// Source of the latest real-time snapshot for consumers that only
/// sometimes need one.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    /// The current snapshot after the staleness policy, or `None` when
    /// there is no usable real-time data.
    async fn latest(&self) -> Result<Option<RealtimeSnapshot>>;
}

/// Reads the cached feed files in the real-time directory.
pub struct LocalSnapshotProvider {
    pub realtime_dir: PathBuf,
    pub stale_policy: StalePolicy,
    pub validity_window: Duration,
}

#[async_trait]
impl SnapshotProvider for LocalSnapshotProvider {
    async fn latest(&self) -> Result<Option<RealtimeSnapshot>> {
        let snapshot = read_local_snapshot(&self.realtime_dir)?;
        Ok(snapshot.and_then(|s| {
            apply_stale_policy(s, self.stale_policy, self.validity_window, Utc::now())
        }))
    }
}

/// Fetches the configured endpoints from the remote API.
pub struct RemoteSnapshotProvider<C> {
    pub api: ApiClient<C>,
    pub endpoints: Vec<RealtimeEndpoint>,
    pub cache_dir: Option<PathBuf>,
    pub stale_policy: StalePolicy,
    pub validity_window: Duration,
}

#[async_trait]
impl<C: HttpClient> SnapshotProvider for RemoteSnapshotProvider<C> {
    async fn latest(&self) -> Result<Option<RealtimeSnapshot>> {
        let snapshot =
            read_remote_snapshot(&self.api, &self.endpoints, self.cache_dir.as_deref()).await?;
        Ok(apply_stale_policy(
            snapshot,
            self.stale_policy,
            self.validity_window,
            Utc::now(),
        ))
    }
}

/// Local files by default, the remote API when `remote` is set.
pub fn snapshot_provider(
    config: &Config,
    realtime_dir: &Path,
    remote: bool,
) -> Result<Box<dyn SnapshotProvider>> {
    if remote {
        let client: Arc<dyn HttpClient> = client_from_config(config)?;
        Ok(Box::new(RemoteSnapshotProvider {
            api: ApiClient::new(client, &config.api_base_url),
            endpoints: config.realtime_endpoints.clone(),
            cache_dir: Some(realtime_dir.to_path_buf()),
            stale_policy: config.stale_policy,
            validity_window: config.validity_window,
        }))
    } else {
        Ok(Box::new(LocalSnapshotProvider {
            realtime_dir: realtime_dir.to_path_buf(),
            stale_policy: config.stale_policy,
            validity_window: config.validity_window,
        }))
    }
}
