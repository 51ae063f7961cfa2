//! The change checker: one instance owns one pair of record stores.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use stalecheck_core::{
    ChangeInfo, ChangeReason, CheckError, CheckOptions, CheckOutcome, CheckerConfig,
    ContentDigest, FileStamp, HashBackend, HashRecord, MetadataRecord,
};
use stalecheck_hash::{BackendSlot, ContentHasher};
use stalecheck_store::{HashStore, MetadataStore};

use crate::policy;

/// Decides whether files changed since they were last checked.
///
/// Records are loaded when the checker is opened and only written back by
/// [`ChangeChecker::save`] (folder checks call it once at the end).
#[derive(Debug)]
pub struct ChangeChecker {
    pub(crate) config: CheckerConfig,
    backend: BackendSlot,
    mtimes: MetadataStore,
    hashes: HashStore,
}

impl ChangeChecker {
    /// Open a checker, loading both stores. The hash backend is built on first use.
    pub fn open(config: CheckerConfig) -> Result<Self, CheckError> {
        let backend = BackendSlot::new(config.backend);
        Self::with_slot(config, backend)
    }

    /// Open a checker that hashes with the given implementation.
    pub fn with_hasher(
        config: CheckerConfig,
        hasher: Arc<dyn ContentHasher>,
    ) -> Result<Self, CheckError> {
        Self::with_slot(config, BackendSlot::with_hasher(hasher))
    }

    fn with_slot(config: CheckerConfig, backend: BackendSlot) -> Result<Self, CheckError> {
        config.validate()?;
        let mtimes = MetadataStore::load(&config.mtime_store);
        let hashes = HashStore::load(&config.hash_store);
        tracing::debug!(
            mtimes = mtimes.len(),
            hashes = hashes.len(),
            backend = %backend.backend(),
            "opened change checker"
        );

        Ok(Self {
            config,
            backend,
            mtimes,
            hashes,
        })
    }

    /// The configuration this checker was opened with.
    pub fn config(&self) -> &CheckerConfig {
        &self.config
    }

    /// The selected hash backend.
    pub fn backend(&self) -> HashBackend {
        self.backend.backend()
    }

    /// Wait for the hash backend to finish initializing.
    pub async fn ready(&mut self) -> Result<(), CheckError> {
        self.backend.ready().await?;
        Ok(())
    }

    /// Switch hash backends. Existing digests stay valid.
    pub fn reselect_backend(&mut self, backend: HashBackend) {
        self.config.backend = backend;
        self.backend.reselect(backend);
    }

    /// Digest a file outside the staleness workflow. Stores are untouched.
    pub async fn compute_hash(&mut self, path: impl AsRef<Path>) -> Result<ContentDigest, CheckError> {
        self.hash_path(path.as_ref()).await
    }

    /// Check one file and shape the result according to `options.mode`.
    ///
    /// In callback mode the callback receives every verdict, including
    /// fast-path ones.
    pub async fn check_file(
        &mut self,
        path: impl AsRef<Path>,
        options: &CheckOptions,
    ) -> Result<CheckOutcome, CheckError> {
        let info = self.check(path).await?;
        options.notify(&info);
        Ok(CheckOutcome::from_info(info, options.mode))
    }

    /// Check one file and return the full verdict.
    pub async fn check(&mut self, path: impl AsRef<Path>) -> Result<ChangeInfo, CheckError> {
        let path = path.as_ref();
        // store keys are JSON strings
        if path.to_str().is_none() {
            return Err(CheckError::NonUtf8Path {
                path: path.to_path_buf(),
            });
        }

        let metadata = std::fs::metadata(path).map_err(|e| CheckError::io(path, e))?;
        let stamp = FileStamp::from_metadata(&metadata).map_err(|e| CheckError::io(path, e))?;
        let prev = self.mtimes.get(path).copied();

        if policy::is_fast_path(prev.as_ref(), &stamp) {
            tracing::trace!(path = %path.display(), "metadata match");
            return Ok(ChangeInfo::new(
                path,
                stamp,
                false,
                false,
                None,
                ChangeReason::MetadataMatch,
            ));
        }

        let suspicious = policy::is_suspicious(prev.as_ref(), &stamp);
        let info = if suspicious {
            let digest = self.hash_path(path).await?;
            let previous = self.hashes.get(path).map(|r| r.hash);
            let changed = previous != Some(digest);
            let reason = match previous {
                None => ChangeReason::FirstSeen,
                Some(_) if changed => ChangeReason::ContentChanged,
                Some(_) => ChangeReason::ContentUnchanged,
            };

            // Both records are written together, after the hash is known.
            self.hashes.insert(path, HashRecord::from(digest));
            self.mtimes.insert(path, MetadataRecord::from(stamp));
            ChangeInfo::new(path, stamp, changed, true, Some(digest), reason)
        } else {
            self.mtimes.insert(path, MetadataRecord::from(stamp));
            ChangeInfo::new(path, stamp, true, false, None, ChangeReason::MetadataDiverged)
        };

        tracing::debug!(
            path = %path.display(),
            changed = info.changed,
            suspicious = info.suspicious,
            reason = %info.reason,
            "checked file"
        );
        Ok(info)
    }

    /// Persist both stores.
    ///
    /// Both files are written and synced before either replaces its target,
    /// so an encode or write failure leaves the previous pair on disk. The
    /// hash store is renamed first: if the second rename fails, the stale
    /// metadata keeps changed files off the fast path on the next run.
    ///
    /// On failure the in-memory records are intact and saving can be retried.
    pub fn save(&mut self) -> Result<(), CheckError> {
        let staged_mtimes = self.mtimes.stage()?;
        let staged_hashes = self.hashes.stage()?;
        self.hashes.commit(staged_hashes)?;
        self.mtimes.commit(staged_mtimes)?;
        tracing::info!(
            mtimes = %self.mtimes.path().display(),
            hashes = %self.hashes.path().display(),
            records = self.mtimes.len(),
            "saved stores"
        );
        Ok(())
    }

    /// Drop records for paths that no longer exist. Returns how many paths were dropped.
    ///
    /// Paths whose existence cannot be determined are kept. Call
    /// [`ChangeChecker::save`] to persist the result.
    pub fn prune_missing(&mut self) -> usize {
        let missing: BTreeSet<PathBuf> = self
            .mtimes
            .paths()
            .chain(self.hashes.paths())
            .filter(|p| matches!(p.try_exists(), Ok(false)))
            .map(Path::to_path_buf)
            .collect();

        for path in &missing {
            self.forget(path);
        }
        if !missing.is_empty() {
            tracing::info!(count = missing.len(), "pruned records for missing files");
        }
        missing.len()
    }

    /// Drop both records for one path. Returns whether anything was removed.
    pub fn forget(&mut self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let had_mtime = self.mtimes.remove(path).is_some();
        let had_hash = self.hashes.remove(path).is_some();
        had_mtime || had_hash
    }

    /// Paths with a metadata record.
    pub fn tracked_files(&self) -> impl Iterator<Item = &Path> {
        self.mtimes.paths()
    }

    /// Stored metadata for a path.
    pub fn metadata_record(&self, path: impl AsRef<Path>) -> Option<&MetadataRecord> {
        self.mtimes.get(path.as_ref())
    }

    /// Stored digest for a path.
    pub fn hash_record(&self, path: impl AsRef<Path>) -> Option<&HashRecord> {
        self.hashes.get(path.as_ref())
    }

    /// Successful saves of the (metadata, hash) stores since opening.
    pub fn flush_counts(&self) -> (u64, u64) {
        (self.mtimes.flush_count(), self.hashes.flush_count())
    }

    /// Hash a file on the blocking pool once the backend is ready.
    async fn hash_path(&mut self, path: &Path) -> Result<ContentDigest, CheckError> {
        let hasher = self.backend.ready().await?;
        let owned = path.to_path_buf();

        match tokio::task::spawn_blocking(move || hasher.hash_file(&owned)).await {
            Ok(Ok(digest)) => Ok(digest),
            Ok(Err(e)) => Err(CheckError::io(path, e)),
            Err(e) if e.is_cancelled() => Err(CheckError::Cancelled),
            Err(e) => Err(CheckError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::other(e),
            }),
        }
    }
}
