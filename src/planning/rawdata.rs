use std::collections::BTreeMap;
use std::path::Path;

use super::detect::{base_name, open_archive};
use crate::error::Result;

/// Counts the files of an opaque archive, overall and per extension
/// (`ext:csv`, `ext:none`, ...).
pub fn count_archive(path: &Path) -> Result<BTreeMap<String, u64>> {
    let mut archive = open_archive(path)?;
    let mut counts = BTreeMap::from([("files".to_string(), 0u64)]);

    for i in 0..archive.len() {
        let member = archive.by_index(i)?;
        if member.is_dir() {
            continue;
        }
        let name = member.name();
        let base = base_name(name);
        let ext = match base.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => ext.to_ascii_lowercase(),
            _ => "none".to_string(),
        };
        *counts.entry(format!("ext:{ext}")).or_insert(0) += 1;
        *counts.entry("files".to_string()).or_insert(0) += 1;
    }
    Ok(counts)
}
