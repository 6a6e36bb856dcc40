//! Segment naming and ordering.
//!
//! A segment is one fixed-duration WAV capture named by its wall-clock
//! capture time, `YYYYMMDD_HHMMSS.wav`. The timestamp format is fixed-width
//! and left-padded, so sorting filenames lexicographically sorts segments
//! chronologically. That single invariant is what lets the aggregator take
//! "everything pending, oldest first" without any index or lock.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

/// Timestamp format used in segment filenames (second resolution)
pub const SEGMENT_TS_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Segment file extension
pub const SEGMENT_EXT: &str = "wav";

/// One pending audio segment in the inbox.
///
/// Ord sorts by `file_name` first, which equals capture order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Segment {
    /// File name, e.g. `20240101_120000.wav`
    pub file_name: String,

    /// Capture time parsed from the file name
    pub captured_at: NaiveDateTime,

    /// Full path of the file in the inbox
    pub path: PathBuf,
}

impl Segment {
    /// Build the canonical file name for a capture time
    pub fn file_name_for(captured_at: NaiveDateTime) -> String {
        format!("{}.{}", captured_at.format(SEGMENT_TS_FORMAT), SEGMENT_EXT)
    }

    /// Interpret a path as a segment.
    ///
    /// Returns None for anything that is not a finished segment: wrong
    /// extension, hidden/partial names (in-progress writes use a leading
    /// dot until renamed into place), or an unparsable timestamp stem.
    pub fn from_path(path: &Path) -> Option<Self> {
        let file_name = path.file_name()?.to_str()?;
        if file_name.starts_with('.') {
            return None;
        }

        let ext = path.extension()?.to_str()?;
        if !ext.eq_ignore_ascii_case(SEGMENT_EXT) {
            return None;
        }

        let stem = path.file_stem()?.to_str()?;
        let captured_at = NaiveDateTime::parse_from_str(stem, SEGMENT_TS_FORMAT).ok()?;

        Some(Self {
            file_name: file_name.to_string(),
            captured_at,
            path: path.to_path_buf(),
        })
    }
}
