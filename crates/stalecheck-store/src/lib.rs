//! Persistent record stores for stalecheck.
//!
//! A checker keeps two independent stores: one mapping each path to its
//! last-seen modification time and size, and one mapping each path to its
//! last computed content digest. Both are plain JSON objects on disk:
//!
//! ```json
//! { "src/a.txt": { "mtimeMs": 1712345678901.123, "size": 5 } }
//! { "src/a.txt": { "hash": "26c7827d889f6da3" } }
//! ```
//!
//! Stores are loaded once and saved explicitly; nothing is written on
//! individual mutations.

mod store;

pub use store::{RecordStore, StagedStore};

use stalecheck_core::{HashRecord, MetadataRecord};

/// Path to last-seen metadata.
pub type MetadataStore = RecordStore<MetadataRecord>;

/// Path to last computed digest.
pub type HashStore = RecordStore<HashRecord>;
