use std::fs::File;
use std::io::Read;
use std::path::Path;

use super::FormatKind;
use crate::error::{NmbsError, Result};

const ZIP_SIGNATURES: [[u8; 4]; 2] = [*b"PK\x03\x04", *b"PK\x05\x06"];
const GTFS_MARKERS: [&str; 4] = ["stops.txt", "routes.txt", "trips.txt", "agency.txt"];

/// Classifies a planning file by extension, name and leading bytes.
pub fn detect_format(path: &Path) -> Result<FormatKind> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    let head = read_head(path)?;

    if name.ends_with(".zip") {
        if !ZIP_SIGNATURES.iter().any(|sig| head.starts_with(sig)) {
            return Err(NmbsError::CorruptArchive {
                path: path.to_path_buf(),
                reason: "missing ZIP signature".to_string(),
            });
        }
        if name.contains("edifact") {
            return Ok(FormatKind::Edifact);
        }
        if name.contains("rawdata") {
            return Ok(FormatKind::Raw);
        }
        return if has_gtfs_members(path)? {
            Ok(FormatKind::Gtfs)
        } else {
            Ok(FormatKind::Raw)
        };
    }

    if name.ends_with(".xml") {
        return Ok(FormatKind::Netex);
    }

    if head.starts_with(b"UNA") || head.starts_with(b"UNB") {
        return Ok(FormatKind::Edifact);
    }

    Err(NmbsError::UnsupportedFormat {
        path: path.to_path_buf(),
    })
}

fn read_head(path: &Path) -> Result<Vec<u8>> {
    let mut head = Vec::with_capacity(4);
    File::open(path)?.take(4).read_to_end(&mut head)?;
    Ok(head)
}

fn has_gtfs_members(path: &Path) -> Result<bool> {
    let archive = open_archive(path)?;
    Ok(archive
        .file_names()
        .any(|member| GTFS_MARKERS.iter().any(|marker| *marker == base_name(member))))
}

/// File name of an archive member without its folders.
pub(super) fn base_name(member: &str) -> &str {
    member.rsplit('/').next().unwrap_or(member)
}

/// Opens a zip archive, mapping failures to [`NmbsError::CorruptArchive`].
pub(super) fn open_archive(path: &Path) -> Result<zip::ZipArchive<File>> {
    let file = File::open(path)?;
    zip::ZipArchive::new(file).map_err(|e| NmbsError::CorruptArchive {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}
