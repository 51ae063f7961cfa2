//! Core types for stalecheck.
//!
//! This crate provides the records persisted between runs, the verdicts
//! produced by a check, configuration, and the error taxonomy shared by
//! the other stalecheck crates.

mod config;
mod error;
mod record;
mod verdict;

pub use config::{
    CheckerConfig, CheckerConfigBuilder, DEFAULT_HASH_STORE, DEFAULT_MTIME_STORE, HashBackend,
    WalkConfig, WalkConfigBuilder,
};
pub use error::{CheckError, HashError, StoreError};
pub use record::{
    ContentDigest, DIGEST_HEX_LEN, FileStamp, HashRecord, MetadataRecord, ParseDigestError,
    system_time_to_ms,
};
pub use verdict::{
    ChangeCallback, ChangeInfo, ChangeReason, CheckMode, CheckOptions, CheckOutcome, FolderOutcome,
};
