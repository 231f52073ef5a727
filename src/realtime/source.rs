use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use flate2::read::GzDecoder;
use tracing::{debug, warn};

use super::FeedVariant;
use super::json::parse_json_feed;
use crate::error::{NmbsError, Result};
use crate::gtfs_rt::FeedMessage;
use crate::parser::parse_feed;

const FEED_EXTENSIONS: [&str; 6] = [".bin", ".pb", ".json", ".bin.gz", ".pb.gz", ".json.gz"];
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Encoding of a GTFS-RT payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadFormat {
    Protobuf,
    Json,
}

impl PayloadFormat {
    pub const ALL: [PayloadFormat; 2] = [PayloadFormat::Protobuf, PayloadFormat::Json];

    /// JSON for `application/json` and `+json` media types, protobuf otherwise.
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let media_type = content_type
            .and_then(|ct| ct.split(';').next())
            .map(|mt| mt.trim().to_ascii_lowercase())
            .unwrap_or_default();
        if media_type == "application/json" || media_type.ends_with("+json") {
            PayloadFormat::Json
        } else {
            PayloadFormat::Protobuf
        }
    }

    /// JSON for `.json` and `.json.gz` files, protobuf otherwise.
    pub fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        let name = name.strip_suffix(".gz").unwrap_or(&name);
        if name.ends_with(".json") {
            PayloadFormat::Json
        } else {
            PayloadFormat::Protobuf
        }
    }

    /// File extension of cached payloads, without the gzip suffix.
    pub fn extension(self) -> &'static str {
        match self {
            PayloadFormat::Protobuf => "bin",
            PayloadFormat::Json => "json",
        }
    }
}

/// Parses gunzipped payload bytes in the given format.
pub fn parse_payload(
    payload: &[u8],
    format: PayloadFormat,
    source_name: &str,
) -> Result<FeedMessage> {
    match format {
        PayloadFormat::Protobuf => parse_feed(payload, source_name),
        PayloadFormat::Json => parse_json_feed(payload, source_name),
    }
}

/// The current payload file of one variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFeedFile {
    pub variant: FeedVariant,
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// Finds the newest feed file per variant under `realtime_dir`.
///
/// Looks in each variant's subdirectory and at files directly in
/// `realtime_dir`, which are assigned by the variant marker in their name.
/// A missing directory yields nothing.
pub fn discover_local(realtime_dir: &Path) -> Vec<LocalFeedFile> {
    let mut newest: BTreeMap<FeedVariant, LocalFeedFile> = BTreeMap::new();

    let mut candidates = Vec::new();
    for variant in FeedVariant::ALL {
        for path in feed_files_in(&realtime_dir.join(variant.dir_name())) {
            candidates.push((variant, path));
        }
    }
    for path in feed_files_in(realtime_dir) {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match FeedVariant::from_file_name(&name) {
            Some(variant) => candidates.push((variant, path)),
            None => debug!(path = %path.display(), "Ignoring feed file without variant marker"),
        }
    }

    for (variant, path) in candidates {
        let modified = match std::fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot stat feed file");
                continue;
            }
        };
        let replace = newest
            .get(&variant)
            .is_none_or(|current| (modified, &path) > (current.modified, &current.path));
        if replace {
            newest.insert(
                variant,
                LocalFeedFile {
                    variant,
                    path,
                    modified,
                },
            );
        }
    }

    newest.into_values().collect()
}

fn feed_files_in(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_feed_file(path))
        .collect()
}

fn is_feed_file(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|name| FEED_EXTENSIONS.iter().any(|ext| name.ends_with(ext)))
}

/// Reads a local feed file, gunzipping it when compressed.
pub fn read_local(path: &Path) -> Result<Vec<u8>> {
    let raw = std::fs::read(path)?;
    decode_payload(raw, &path.display().to_string())
}

/// Returns the plain bytes of a payload, gunzipping gzip data.
pub fn decode_payload(raw: Vec<u8>, source_name: &str) -> Result<Vec<u8>> {
    if !raw.starts_with(&GZIP_MAGIC) {
        return Ok(raw);
    }
    let mut out = Vec::new();
    GzDecoder::new(raw.as_slice())
        .read_to_end(&mut out)
        .map_err(|e| NmbsError::decode(source_name, format!("invalid gzip data: {e}")))?;
    Ok(out)
}
