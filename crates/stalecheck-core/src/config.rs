//! Checker configuration types.

use std::path::{Path, PathBuf};

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::error::{CheckError, HashError};

/// Default location of the metadata store.
pub const DEFAULT_MTIME_STORE: &str = ".stalecheck/mtimes.json";

/// Default location of the hash store.
pub const DEFAULT_HASH_STORE: &str = ".stalecheck/hashes.json";

/// Selects which implementation computes content digests.
///
/// Every backend produces the same xxHash64 (seed 0) digest; they differ only
/// in how file bytes are read.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum HashBackend {
    /// Read the whole file, hash in one shot.
    #[serde(alias = "native")]
    #[strum(to_string = "buffered", serialize = "native")]
    Buffered,
    /// Feed fixed-size chunks into an incremental hasher.
    #[default]
    #[serde(alias = "js")]
    #[strum(to_string = "streaming", serialize = "js")]
    Streaming,
    /// Memory-map large files.
    #[serde(alias = "wasm")]
    #[strum(to_string = "mapped", serialize = "wasm")]
    Mapped,
}

impl HashBackend {
    /// Resolve a backend by name, including the aliases.
    pub fn from_name(name: &str) -> Result<Self, HashError> {
        name.trim()
            .parse()
            .map_err(|_| HashError::UnknownBackend {
                name: name.to_string(),
            })
    }
}

/// Traversal settings for folder checks.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into))]
pub struct WalkConfig {
    /// Follow symbolic links and check their targets. When false, symlinks are skipped.
    ///
    /// When true, a dangling link fails the whole walk with `CheckError::Walk`.
    #[builder(default = "false")]
    #[serde(default)]
    pub follow_symlinks: bool,

    /// Include hidden files (starting with .).
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub include_hidden: bool,

    /// Glob patterns matched against entry names; matching entries are skipped.
    #[builder(default)]
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Maximum depth to traverse (None = unlimited).
    #[builder(default)]
    #[serde(default)]
    pub max_depth: Option<u32>,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            follow_symlinks: false,
            include_hidden: true,
            ignore_patterns: Vec::new(),
            max_depth: None,
        }
    }
}

impl WalkConfig {
    /// Create a new walk config builder.
    pub fn builder() -> WalkConfigBuilder {
        WalkConfigBuilder::default()
    }
}

fn default_true() -> bool {
    true
}

fn default_mtime_store() -> PathBuf {
    PathBuf::from(DEFAULT_MTIME_STORE)
}

fn default_hash_store() -> PathBuf {
    PathBuf::from(DEFAULT_HASH_STORE)
}

/// Configuration for a change checker instance.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct CheckerConfig {
    /// Where metadata records are persisted.
    #[builder(default = "default_mtime_store()")]
    #[serde(default = "default_mtime_store")]
    pub mtime_store: PathBuf,

    /// Where hash records are persisted.
    #[builder(default = "default_hash_store()")]
    #[serde(default = "default_hash_store")]
    pub hash_store: PathBuf,

    /// Hash backend.
    #[builder(default)]
    #[serde(default)]
    pub backend: HashBackend,

    /// Folder traversal settings.
    #[builder(default)]
    #[serde(default)]
    pub walk: WalkConfig,
}

impl CheckerConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        let mtime = self.mtime_store.as_ref();
        let hash = self.hash_store.as_ref();
        if mtime.is_some_and(|p| p.as_os_str().is_empty())
            || hash.is_some_and(|p| p.as_os_str().is_empty())
        {
            return Err("Store paths cannot be empty".to_string());
        }
        let mtime = mtime.cloned().unwrap_or_else(default_mtime_store);
        let hash = hash.cloned().unwrap_or_else(default_hash_store);
        if mtime == hash {
            return Err("Metadata and hash stores must be different files".to_string());
        }
        Ok(())
    }
}

impl CheckerConfig {
    /// Create a new config builder.
    pub fn builder() -> CheckerConfigBuilder {
        CheckerConfigBuilder::default()
    }

    /// Create a config with explicit store paths and the default backend.
    pub fn new(mtime_store: impl Into<PathBuf>, hash_store: impl Into<PathBuf>) -> Self {
        Self {
            mtime_store: mtime_store.into(),
            hash_store: hash_store.into(),
            backend: HashBackend::default(),
            walk: WalkConfig::default(),
        }
    }

    /// Set the hash backend.
    pub fn with_backend(mut self, backend: HashBackend) -> Self {
        self.backend = backend;
        self
    }

    /// Set the traversal settings.
    pub fn with_walk(mut self, walk: WalkConfig) -> Self {
        self.walk = walk;
        self
    }

    /// Load a config from a TOML file. Missing keys take their defaults.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, CheckError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| CheckError::io(path, e))?;
        Self::from_toml_str(&text)
    }

    /// Parse a config from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, CheckError> {
        let config: Self = toml::from_str(text).map_err(|e| CheckError::InvalidConfig {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the store paths are usable.
    pub fn validate(&self) -> Result<(), CheckError> {
        if self.mtime_store.as_os_str().is_empty() || self.hash_store.as_os_str().is_empty() {
            return Err(CheckError::InvalidConfig {
                message: "Store paths cannot be empty".to_string(),
            });
        }
        if self.mtime_store == self.hash_store {
            return Err(CheckError::InvalidConfig {
                message: "Metadata and hash stores must be different files".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MTIME_STORE, DEFAULT_HASH_STORE)
    }
}
