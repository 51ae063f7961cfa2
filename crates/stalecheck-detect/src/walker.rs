//! Folder traversal.

use std::path::{Path, PathBuf};
use std::time::Instant;

use globset::{Glob, GlobSet, GlobSetBuilder};
use jwalk::{Parallelism, WalkDir};

use stalecheck_core::{CheckError, CheckOptions, FolderOutcome, WalkConfig};

use crate::checker::ChangeChecker;

impl ChangeChecker {
    /// Check every regular file under `root`, then save both stores once.
    ///
    /// Boolean and callback modes collect changed paths; detail mode
    /// collects every verdict. If `options.cancel` fires between two files
    /// the traversal stops with [`CheckError::Cancelled`] and nothing is
    /// saved. Any per-file failure aborts the traversal, also unsaved.
    pub async fn check_folder(
        &mut self,
        root: impl AsRef<Path>,
        options: &CheckOptions,
    ) -> Result<FolderOutcome, CheckError> {
        let start = Instant::now();
        let root = root.as_ref().to_path_buf();
        let walk = self.config.walk.clone();

        let files = {
            let walk_root = root.clone();
            match tokio::task::spawn_blocking(move || collect_files(&walk_root, &walk)).await {
                Ok(result) => result?,
                Err(e) if e.is_cancelled() => return Err(CheckError::Cancelled),
                Err(e) => {
                    return Err(CheckError::Walk {
                        path: root,
                        message: e.to_string(),
                    });
                }
            }
        };

        let mut outcome = FolderOutcome::empty(options.mode);
        let mut changed = 0usize;

        for path in &files {
            if options.is_cancelled() {
                tracing::info!(root = %root.display(), "folder check cancelled, stores not saved");
                return Err(CheckError::Cancelled);
            }

            let info = self.check(path).await?;
            options.notify(&info);
            if info.changed {
                changed += 1;
            }
            outcome.record(info);
        }

        self.save()?;

        tracing::info!(
            root = %root.display(),
            files = files.len(),
            changed,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "folder check complete"
        );
        Ok(outcome)
    }
}

/// Collect the regular files under `root`, in sorted order.
///
/// Paths are built by joining entry names onto `root` as given. Symlinks
/// are skipped unless `follow_symlinks` is set, in which case their targets
/// are reported under the link's path and a dangling link fails the walk.
/// Special files and paths that are not valid UTF-8 are always skipped.
pub fn collect_files(root: &Path, walk: &WalkConfig) -> Result<Vec<PathBuf>, CheckError> {
    let metadata = std::fs::metadata(root).map_err(|e| CheckError::io(root, e))?;
    if !metadata.is_dir() {
        return Err(CheckError::NotADirectory {
            path: root.to_path_buf(),
        });
    }

    let ignore = build_ignore_set(&walk.ignore_patterns)?;

    let walker = WalkDir::new(root)
        .parallelism(Parallelism::Serial)
        .sort(true)
        .skip_hidden(!walk.include_hidden)
        .follow_links(walk.follow_symlinks)
        .min_depth(0)
        .max_depth(walk.max_depth.map(|d| d as usize).unwrap_or(usize::MAX))
        .process_read_dir(move |_depth, _path, _state, children| {
            children.retain(|entry| match entry {
                Ok(e) => !ignore.is_match(Path::new(&e.file_name)),
                Err(_) => true,
            });
        });

    let mut files = Vec::new();
    let mut skipped = 0usize;

    for entry_result in walker {
        let entry = entry_result.map_err(|err| CheckError::Walk {
            path: err
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| root.to_path_buf()),
            message: err.to_string(),
        })?;

        if entry.depth() == 0 {
            continue;
        }

        let file_type = entry.file_type();
        let path = entry.path();

        if file_type.is_dir() {
            continue;
        } else if file_type.is_file() {
            if path.to_str().is_none() {
                tracing::warn!(path = %path.display(), "skipping file with non-UTF-8 path");
                skipped += 1;
            } else {
                files.push(path);
            }
        } else if file_type.is_symlink() {
            tracing::debug!(path = %path.display(), "skipping symlink");
            skipped += 1;
        } else {
            tracing::debug!(path = %path.display(), "skipping special file");
            skipped += 1;
        }
    }

    tracing::debug!(root = %root.display(), files = files.len(), skipped, "collected files");
    Ok(files)
}

/// Compile ignore patterns into a single matcher.
fn build_ignore_set(patterns: &[String]) -> Result<GlobSet, CheckError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| CheckError::InvalidConfig {
            message: format!("invalid ignore pattern {pattern:?}: {e}"),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| CheckError::InvalidConfig {
        message: e.to_string(),
    })
}
