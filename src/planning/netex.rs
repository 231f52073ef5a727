use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::{NmbsError, Result};

/// NeTEx elements counted as logical tables.
pub const NETEX_TABLES: [&str; 5] = [
    "StopPlace",
    "ScheduledStopPoint",
    "ServiceJourney",
    "Line",
    "Route",
];

pub fn count_elements(path: &Path) -> Result<BTreeMap<String, u64>> {
    let file = BufReader::new(File::open(path)?);
    count_in(file, &path.display().to_string())
}

/// Streams the document once and counts the [`NETEX_TABLES`] elements by
/// local name, so namespace prefixes do not matter.
///
/// Mismatched or unclosed tags, a truncated document and a document without
/// a root element are [`NmbsError::Decode`].
pub(crate) fn count_in<R: BufRead>(source: R, source_name: &str) -> Result<BTreeMap<String, u64>> {
    let mut reader = Reader::from_reader(source);
    reader.check_end_names(true);

    let mut counts: BTreeMap<String, u64> = NETEX_TABLES
        .iter()
        .map(|t| (t.to_string(), 0))
        .collect();
    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut seen_root = false;

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| {
            NmbsError::decode(
                source_name,
                format!("at byte {}: {e}", reader.buffer_position()),
            )
        })?;
        match event {
            Event::Start(e) => {
                tally(&mut counts, e.local_name().as_ref());
                depth += 1;
                seen_root = true;
            }
            Event::Empty(e) => {
                tally(&mut counts, e.local_name().as_ref());
                seen_root = true;
            }
            Event::End(_) => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    NmbsError::decode(source_name, "closing tag without opening tag")
                })?;
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if depth > 0 {
        return Err(NmbsError::decode(
            source_name,
            format!("document ends with {depth} unclosed element(s)"),
        ));
    }
    if !seen_root {
        return Err(NmbsError::decode(source_name, "no root element"));
    }
    Ok(counts)
}

fn tally(counts: &mut BTreeMap<String, u64>, local_name: &[u8]) {
    if let Ok(name) = std::str::from_utf8(local_name) {
        if let Some(count) = counts.get_mut(name) {
            *count += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(xml: &str) -> Result<BTreeMap<String, u64>> {
        count_in(xml.as_bytes(), "test.xml")
    }

    #[test]
    fn test_counts_namespaced_elements() {
        let counts = count(
            r#"<?xml version="1.0"?>
            <netex:PublicationDelivery xmlns:netex="http://www.netex.org.uk/netex">
              <netex:StopPlace id="1"><netex:Name>Brussel-Zuid</netex:Name></netex:StopPlace>
              <netex:StopPlace id="2"/>
              <ScheduledStopPoint id="3"/>
              <ServiceJourney id="4"/>
              <Line id="5"/>
            </netex:PublicationDelivery>"#,
        )
        .unwrap();

        assert_eq!(counts["StopPlace"], 2);
        assert_eq!(counts["ScheduledStopPoint"], 1);
        assert_eq!(counts["ServiceJourney"], 1);
        assert_eq!(counts["Line"], 1);
        assert_eq!(counts["Route"], 0);
    }

    #[test]
    fn test_mismatched_tags_are_decode_error() {
        let err = count("<PublicationDelivery><StopPlace></Line></PublicationDelivery>").unwrap_err();
        assert!(matches!(err, NmbsError::Decode { .. }));
    }

    #[test]
    fn test_truncated_document_is_decode_error() {
        let err = count("<PublicationDelivery><StopPlace>").unwrap_err();
        assert!(err.to_string().contains("unclosed"));
    }

    #[test]
    fn test_empty_document_is_decode_error() {
        assert!(count("   ").is_err());
    }
}
