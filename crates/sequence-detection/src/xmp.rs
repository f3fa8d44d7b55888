//! Embedded XMP packet extraction for Polesort
//!
//! DJI drones embed capture-time tags in an XMP text packet written directly
//! into the image file. This module locates that packet by its literal marker
//! bytes and pulls individual tag values out of it, tolerating malformed or
//! truncated content.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// Literal byte marker opening the embedded XMP packet.
pub const PACKET_START: &[u8] = b"<x:xmpmeta";
/// Literal byte marker closing the packet (the extracted range includes it).
pub const PACKET_END: &[u8] = b"</x:xmpmeta>";

/// EXIF tag id of the proprietary maker-note field (37500).
const MAKER_NOTE_TAG: u16 = 0x927c;

/// The embedded metadata carried by one image file.
///
/// Transient extraction result: callers read the tag values they need and
/// drop it. The maker note is informational only and is never consumed by
/// sequence classification.
#[derive(Debug, Clone)]
pub struct MetadataPacket {
    /// The XMP packet text, lossily decoded from the raw byte range.
    pub xmp: String,
    /// Raw bytes of the legacy maker-note field, when the file carries
    /// standard EXIF metadata at all.
    pub maker_note: Option<Vec<u8>>,
}

/// Extract the embedded metadata packet from an image file.
///
/// Returns `Ok(None)` when the file holds no recognizable packet. The only
/// error case is the file being unreadable; malformed content never fails.
pub fn extract_packet(path: &Path) -> Result<Option<MetadataPacket>> {
    let data = fs::read(path)
        .with_context(|| format!("Failed to read image file: {}", path.display()))?;

    let xmp = match locate_packet(&data) {
        Some(text) => text,
        None => return Ok(None),
    };

    Ok(Some(MetadataPacket {
        xmp,
        maker_note: read_maker_note(path),
    }))
}

/// Find the packet's byte range and decode it as text.
///
/// The end marker is only searched for after the start marker, so a stray
/// closing tag earlier in the file cannot produce an inverted range.
fn locate_packet(data: &[u8]) -> Option<String> {
    let start = find(data, PACKET_START)?;
    let end = start + find(&data[start..], PACKET_END)? + PACKET_END.len();
    Some(String::from_utf8_lossy(&data[start..end]).into_owned())
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

/// Probe the standardized EXIF structures for the maker-note field.
///
/// Absence, unparseable EXIF, or a non-EXIF file are all tolerated; this is
/// purely informational.
fn read_maker_note(path: &Path) -> Option<Vec<u8>> {
    let exif = rexif::parse_file(path).ok()?;
    exif.entries
        .iter()
        .find(|entry| entry.ifd.tag == MAKER_NOTE_TAG)
        .map(|entry| entry.ifd.data.clone())
}

/// Extract a single tag's value from packet text.
///
/// Tags appear as `tagName="value"`. The value starts two bytes past the end
/// of the first occurrence of `tag_name` (skipping the assignment character
/// and opening quote) and runs to the next quote. A missing tag, a value
/// that is never closed, or an offset landing outside the text all yield
/// `None`; only the first occurrence of a repeated tag is consulted.
pub fn tag_value<'a>(xmp: &'a str, tag_name: &str) -> Option<&'a str> {
    let tag_start = xmp.find(tag_name)?;
    let value_start = tag_start + tag_name.len() + 2;

    // get() rather than slicing: a truncated packet can end mid-tag, and a
    // lossily decoded one can put a multi-byte char at the offset.
    let rest = match xmp.get(value_start..) {
        Some(rest) => rest,
        None => {
            tracing::debug!(tag = tag_name, "tag found but packet ends before its value");
            return None;
        }
    };

    match rest.find('"') {
        Some(value_end) => Some(&rest[..value_end]),
        None => {
            tracing::debug!(tag = tag_name, "tag value is not quote-terminated");
            None
        }
    }
}
