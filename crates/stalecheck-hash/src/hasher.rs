//! xxHash64 backends.
//!
//! All backends hash with xxHash64 and seed 0. They only differ in how the
//! file bytes reach the hasher, so a digest written by one is valid when
//! recomputed by another.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use xxhash_rust::xxh64::{Xxh64, xxh64};

use stalecheck_core::{ContentDigest, HashBackend};

/// Seed shared by every backend.
pub const HASH_SEED: u64 = 0;

/// Chunk size used by the streaming backend.
pub const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Files larger than this are memory-mapped by the mapped backend.
pub const MMAP_THRESHOLD: u64 = 128 * 1024;

/// Computes content digests.
pub trait ContentHasher: Send + Sync + fmt::Debug {
    /// Which backend this is.
    fn backend(&self) -> HashBackend;

    /// Digest an in-memory buffer.
    fn hash_bytes(&self, bytes: &[u8]) -> ContentDigest;

    /// Digest the contents of a file.
    fn hash_file(&self, path: &Path) -> io::Result<ContentDigest>;
}

/// Reads the whole file, then hashes it in one shot.
#[derive(Debug, Default, Clone, Copy)]
pub struct BufferedHasher;

impl ContentHasher for BufferedHasher {
    fn backend(&self) -> HashBackend {
        HashBackend::Buffered
    }

    fn hash_bytes(&self, bytes: &[u8]) -> ContentDigest {
        ContentDigest::new(xxh64(bytes, HASH_SEED))
    }

    fn hash_file(&self, path: &Path) -> io::Result<ContentDigest> {
        let data = std::fs::read(path)?;
        Ok(self.hash_bytes(&data))
    }
}

/// Feeds fixed-size chunks into an incremental hasher; memory use is constant.
#[derive(Debug, Default, Clone, Copy)]
pub struct StreamingHasher;

impl ContentHasher for StreamingHasher {
    fn backend(&self) -> HashBackend {
        HashBackend::Streaming
    }

    fn hash_bytes(&self, bytes: &[u8]) -> ContentDigest {
        let mut hasher = Xxh64::new(HASH_SEED);
        for chunk in bytes.chunks(STREAM_CHUNK_SIZE) {
            hasher.update(chunk);
        }
        ContentDigest::new(hasher.digest())
    }

    fn hash_file(&self, path: &Path) -> io::Result<ContentDigest> {
        let mut file = File::open(path)?;
        let mut hasher = Xxh64::new(HASH_SEED);
        let mut buffer = vec![0u8; STREAM_CHUNK_SIZE];

        loop {
            let bytes_read = match file.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(ContentDigest::new(hasher.digest()))
    }
}

/// Memory-maps large files; small files are read into memory.
#[derive(Debug, Default, Clone, Copy)]
pub struct MappedHasher;

impl ContentHasher for MappedHasher {
    fn backend(&self) -> HashBackend {
        HashBackend::Mapped
    }

    fn hash_bytes(&self, bytes: &[u8]) -> ContentDigest {
        ContentDigest::new(xxh64(bytes, HASH_SEED))
    }

    fn hash_file(&self, path: &Path) -> io::Result<ContentDigest> {
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();

        if file_size > MMAP_THRESHOLD {
            // SAFETY: the map is read-only and dropped before returning. A
            // concurrent truncation can fault; the checker treats files as
            // quiescent for the duration of a check.
            let mmap = unsafe { memmap2::Mmap::map(&file)? };
            Ok(self.hash_bytes(&mmap))
        } else {
            let mut data = Vec::with_capacity(file_size as usize);
            file.read_to_end(&mut data)?;
            Ok(self.hash_bytes(&data))
        }
    }
}
