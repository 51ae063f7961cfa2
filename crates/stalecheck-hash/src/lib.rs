//! Content hashing backends for stalecheck.
//!
//! Three interchangeable implementations of [`ContentHasher`] compute the
//! same xxHash64 (seed 0) digest:
//!
//! - **buffered** reads the whole file and hashes it in one shot
//! - **streaming** feeds 64 KiB chunks into an incremental hasher
//! - **mapped** memory-maps files over 128 KiB
//!
//! Backends are built through [`load_backend`], which self-tests the
//! implementation on the blocking pool. [`BackendSlot`] wraps that in an
//! explicit not-ready state so nothing can hash before the backend exists.
//!
//! ```rust,no_run
//! use stalecheck_core::HashBackend;
//! use stalecheck_hash::{BackendSlot, ContentHasher};
//!
//! # async fn run() -> Result<(), stalecheck_core::HashError> {
//! let mut slot = BackendSlot::new(HashBackend::Streaming);
//! let hasher = slot.ready().await?;
//! let digest = hasher.hash_bytes(b"hello");
//! println!("{digest}");
//! # Ok(())
//! # }
//! ```

mod hasher;
mod slot;

pub use hasher::{
    BufferedHasher, ContentHasher, HASH_SEED, MMAP_THRESHOLD, MappedHasher, STREAM_CHUNK_SIZE,
    StreamingHasher,
};
pub use slot::{BackendSlot, build_backend, load_backend, self_test};

// Re-export core types for convenience
pub use stalecheck_core::{ContentDigest, HashBackend, HashError};
