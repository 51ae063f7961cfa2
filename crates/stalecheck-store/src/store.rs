//! JSON-backed record store.

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;

use stalecheck_core::StoreError;

/// A persistent mapping from file path to record.
///
/// Loaded once, mutated in memory, and written back only when
/// [`RecordStore::save`] is called. Keys are kept exactly as given.
#[derive(Debug, Clone)]
pub struct RecordStore<R> {
    path: PathBuf,
    records: BTreeMap<PathBuf, R>,
    flushes: u64,
}

impl<R> RecordStore<R>
where
    R: Serialize + DeserializeOwned,
{
    /// An empty store that will be saved to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: BTreeMap::new(),
            flushes: 0,
        }
    }

    /// Load a store from `path`.
    ///
    /// A missing, unreadable or malformed file yields an empty store. That
    /// only costs extra hashing on the next checks, so it is never an error.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(records) => records,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "malformed store, starting empty");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no store yet, starting empty");
                BTreeMap::new()
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "unreadable store, starting empty");
                BTreeMap::new()
            }
        };

        Self {
            path,
            records,
            flushes: 0,
        }
    }

    /// Write the store to disk.
    ///
    /// The records go to a temporary file in the same directory which is
    /// then renamed over the target, so a crash mid-write leaves the
    /// previous copy intact.
    pub fn save(&mut self) -> Result<(), StoreError> {
        let staged = self.stage()?;
        self.commit(staged)
    }

    /// Write and sync the records to a temporary file next to the target.
    ///
    /// The target is untouched until [`RecordStore::commit`]. Dropping the
    /// staged file deletes it.
    pub fn stage(&self) -> Result<StagedStore, StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(io_err)?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(io_err)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, &self.records).map_err(|source| {
                StoreError::Encode {
                    path: self.path.clone(),
                    source,
                }
            })?;
            writer.flush().map_err(io_err)?;
        }
        tmp.as_file().sync_all().map_err(io_err)?;

        Ok(StagedStore { tmp })
    }

    /// Rename a file staged by this store over its target.
    pub fn commit(&mut self, staged: StagedStore) -> Result<(), StoreError> {
        staged
            .tmp
            .persist(&self.path)
            .map_err(|e| StoreError::Io {
                path: self.path.clone(),
                source: e.error,
            })?;

        self.flushes += 1;
        tracing::debug!(path = %self.path.display(), records = self.records.len(), "store saved");
        Ok(())
    }
}

/// Store contents written to a temporary file, waiting to be committed.
#[derive(Debug)]
pub struct StagedStore {
    tmp: NamedTempFile,
}

impl<R> RecordStore<R> {
    /// Where this store is persisted.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record for a path.
    pub fn get(&self, path: &Path) -> Option<&R> {
        self.records.get(path)
    }

    /// Insert or overwrite the record for a path.
    pub fn insert(&mut self, path: impl Into<PathBuf>, record: R) -> Option<R> {
        self.records.insert(path.into(), record)
    }

    /// Remove the record for a path.
    pub fn remove(&mut self, path: &Path) -> Option<R> {
        self.records.remove(path)
    }

    /// Keep only records for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&Path, &R) -> bool) {
        self.records.retain(|path, record| keep(path, record));
    }

    /// Tracked paths, in sorted order.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.records.keys().map(PathBuf::as_path)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store has no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// How many times this store has been saved successfully.
    pub fn flush_count(&self) -> u64 {
        self.flushes
    }
}
