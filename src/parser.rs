//! Protobuf parser for GTFS Realtime feeds.

use prost::Message;

use crate::error::{NmbsError, Result};
use crate::gtfs_rt::FeedMessage;

/// Decodes a protobuf-encoded GTFS-RT [`FeedMessage`] from raw bytes.
///
/// `source_name` only labels the error.
///
/// # Errors
///
/// Returns [`NmbsError::Decode`] if the bytes are not a valid `FeedMessage`.
pub fn parse_feed(bytes: &[u8], source_name: &str) -> Result<FeedMessage> {
    FeedMessage::decode(bytes).map_err(|e| NmbsError::decode(source_name, e))
}
