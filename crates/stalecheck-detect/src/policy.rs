//! Staleness heuristics.
//!
//! Decides from metadata alone whether a file can be declared unchanged,
//! and whether a metadata change is trustworthy enough to report without
//! hashing the content.

use stalecheck_core::{FileStamp, MetadataRecord};

/// Files smaller than this are always verified by hash.
pub const SMALL_FILE_THRESHOLD: u64 = 64;

/// Stored mtime and size both match the current ones.
pub fn is_fast_path(prev: Option<&MetadataRecord>, current: &FileStamp) -> bool {
    prev.is_some_and(|p| p.modified_ms == current.modified_ms && p.size == current.size)
}

/// Whether the metadata pattern needs a content hash to decide.
///
/// Only meaningful after [`is_fast_path`] returned false.
pub fn is_suspicious(prev: Option<&MetadataRecord>, current: &FileStamp) -> bool {
    let Some(prev) = prev else {
        return true;
    };

    // mtime went backwards: restored backup, clock skew or tampering
    if current.modified_ms < prev.modified_ms {
        return true;
    }

    // same length rewrite
    if current.size == prev.size && current.modified_ms != prev.modified_ms {
        return true;
    }

    current.size < SMALL_FILE_THRESHOLD
}
