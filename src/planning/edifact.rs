use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use tracing::debug;

use super::detect::open_archive;
use crate::error::Result;

/// Service characters, from the `UNA` advice or the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Delimiters {
    component: char,
    element: char,
    release: Option<char>,
    terminator: char,
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            component: ':',
            element: '+',
            release: Some('?'),
            terminator: '\'',
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EdifactCounts {
    pub segments: u64,
    pub messages: u64,
}

/// Counts segments and `UNH` messages in an interchange.
pub fn count_edifact(text: &str) -> EdifactCounts {
    let (delimiters, body) = service_advice(text);
    let mut counts = EdifactCounts::default();

    let mut segment = String::new();
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if Some(c) == delimiters.release {
            // The next character is literal.
            if let Some(escaped) = chars.next() {
                segment.push(escaped);
            }
        } else if c == delimiters.terminator {
            record_segment(&segment, &delimiters, &mut counts);
            segment.clear();
        } else {
            segment.push(c);
        }
    }
    record_segment(&segment, &delimiters, &mut counts);
    counts
}

/// Splits off a leading `UNA` advice. Positions 3..9 are component,
/// element, decimal mark, release, reserved and terminator; a space release
/// character means none.
fn service_advice(text: &str) -> (Delimiters, &str) {
    let text = text.trim_start_matches('\u{feff}').trim_start();
    let Some(rest) = text.strip_prefix("UNA") else {
        return (Delimiters::default(), text);
    };
    let advice: Vec<(usize, char)> = rest.char_indices().take(6).collect();
    if advice.len() < 6 {
        return (Delimiters::default(), text);
    }
    let release = advice[3].1;
    let delimiters = Delimiters {
        component: advice[0].1,
        element: advice[1].1,
        release: (release != ' ').then_some(release),
        terminator: advice[5].1,
    };
    let end = advice[5].0 + advice[5].1.len_utf8();
    (delimiters, &rest[end..])
}

fn record_segment(raw: &str, delimiters: &Delimiters, counts: &mut EdifactCounts) {
    let segment = raw.trim();
    if segment.is_empty() {
        return;
    }
    counts.segments += 1;
    let tag = segment
        .split([delimiters.element, delimiters.component])
        .next()
        .unwrap_or("");
    if tag == "UNH" {
        counts.messages += 1;
    }
}

/// Counts a plain Edifact file or every member of an Edifact zip archive.
pub fn count_path(path: &Path) -> Result<BTreeMap<String, u64>> {
    let is_zip = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));

    let mut files = 0u64;
    let mut total = EdifactCounts::default();
    if is_zip {
        let mut archive = open_archive(path)?;
        for i in 0..archive.len() {
            let mut member = archive.by_index(i)?;
            if member.is_dir() {
                continue;
            }
            let mut bytes = Vec::new();
            member.read_to_end(&mut bytes)?;
            let counts = count_edifact(&String::from_utf8_lossy(&bytes));
            debug!(member = member.name(), segments = counts.segments, "Counted Edifact member");
            files += 1;
            total.segments += counts.segments;
            total.messages += counts.messages;
        }
    } else {
        let bytes = std::fs::read(path)?;
        total = count_edifact(&String::from_utf8_lossy(&bytes));
        files = 1;
    }

    Ok(BTreeMap::from([
        ("files".to_string(), files),
        ("messages".to_string(), total.messages),
        ("segments".to_string(), total.segments),
    ]))
}
