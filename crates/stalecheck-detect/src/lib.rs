//! Change detection engine for stalecheck.
//!
//! Answers "has this file changed since I last looked?" without re-reading
//! every file on every check.
//!
//! # Overview
//!
//! For each file the checker compares the current modification time and
//! size to the last recorded ones:
//!
//! 1. **Fast path** - both match, the file is unchanged and nothing is read
//! 2. **Suspicious** - no record yet, mtime moved backwards, same size with a
//!    new mtime, or a file under 64 bytes; the content is hashed and compared
//!    to the last digest
//! 3. **Diverged** - anything else is reported changed from metadata alone
//!
//! Records live in two JSON stores owned by the checker; they are loaded at
//! open and written by [`ChangeChecker::save`] or once at the end of
//! [`ChangeChecker::check_folder`].
//!
//! # Example
//!
//! ```rust,no_run
//! use stalecheck_detect::{ChangeChecker, CheckOptions, CheckerConfig};
//!
//! # async fn run() -> Result<(), stalecheck_detect::CheckError> {
//! let config = CheckerConfig::new("state/mtimes.json", "state/hashes.json");
//! let mut checker = ChangeChecker::open(config)?;
//!
//! let outcome = checker.check_folder("src", &CheckOptions::boolean()).await?;
//! for path in outcome.changed_paths() {
//!     println!("changed: {}", path.display());
//! }
//! # Ok(())
//! # }
//! ```

mod checker;
pub mod policy;
mod walker;

pub use checker::ChangeChecker;
pub use walker::collect_files;

// Re-export core types for convenience
pub use stalecheck_core::{
    ChangeInfo, ChangeReason, CheckError, CheckMode, CheckOptions, CheckOutcome, CheckerConfig,
    ContentDigest, FolderOutcome, HashBackend, HashError, StoreError, WalkConfig,
};
pub use stalecheck_hash::ContentHasher;
