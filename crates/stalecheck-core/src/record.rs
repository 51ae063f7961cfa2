//! Persisted per-file records and content digests.

use std::fmt;
use std::fs::Metadata;
use std::io;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Width of a hex-encoded digest.
pub const DIGEST_HEX_LEN: usize = 16;

/// xxHash64 (seed 0) content digest.
///
/// Always rendered as 16 lowercase hex characters so digests compare
/// byte-for-byte no matter which backend produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentDigest(pub u64);

impl ContentDigest {
    /// Create a digest from a raw 64-bit hash value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw hash value.
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Get the digest as a zero-padded lowercase hex string.
    pub fn to_hex(&self) -> String {
        format!("{:016x}", self.0)
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Error returned when a digest string is not valid hex.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid digest: {0:?}")]
pub struct ParseDigestError(pub String);

impl FromStr for ContentDigest {
    type Err = ParseDigestError;

    /// Accepts up to 16 hex digits; shorter values are treated as unpadded.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.len() > DIGEST_HEX_LEN {
            return Err(ParseDigestError(s.to_string()));
        }
        u64::from_str_radix(s, 16)
            .map(Self)
            .map_err(|_| ParseDigestError(s.to_string()))
    }
}

impl Serialize for ContentDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Metadata snapshot of a file: modification time and size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FileStamp {
    /// Modification time in milliseconds since the Unix epoch.
    pub modified_ms: f64,
    /// Size in bytes.
    pub size: u64,
}

impl FileStamp {
    /// Create a stamp from raw values.
    pub fn new(modified_ms: f64, size: u64) -> Self {
        Self { modified_ms, size }
    }

    /// Build a stamp from filesystem metadata.
    ///
    /// Fails if the platform cannot report a modification time.
    pub fn from_metadata(metadata: &Metadata) -> io::Result<Self> {
        Ok(Self {
            modified_ms: system_time_to_ms(metadata.modified()?),
            size: metadata.len(),
        })
    }
}

/// Convert a `SystemTime` to fractional milliseconds since the epoch.
///
/// Times before the epoch come out negative.
pub fn system_time_to_ms(time: SystemTime) -> f64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_nanos() as f64 / 1_000_000.0,
        Err(e) => -(e.duration().as_nanos() as f64 / 1_000_000.0),
    }
}

/// Last metadata snapshot observed by a completed check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    /// Modification time in milliseconds since the epoch.
    #[serde(rename = "mtimeMs")]
    pub modified_ms: f64,
    /// Size in bytes.
    pub size: u64,
}

impl MetadataRecord {
    /// Get the stamp this record was written from.
    pub fn stamp(&self) -> FileStamp {
        FileStamp::new(self.modified_ms, self.size)
    }
}

impl From<FileStamp> for MetadataRecord {
    fn from(stamp: FileStamp) -> Self {
        Self {
            modified_ms: stamp.modified_ms,
            size: stamp.size,
        }
    }
}

/// Last content digest computed for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashRecord {
    /// Digest of the file contents at the time of the check.
    pub hash: ContentDigest,
}

impl From<ContentDigest> for HashRecord {
    fn from(hash: ContentDigest) -> Self {
        Self { hash }
    }
}
