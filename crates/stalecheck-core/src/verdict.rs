//! Check verdicts, per-check options and result shapes.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio_util::sync::CancellationToken;

use crate::record::{ContentDigest, FileStamp};

/// Why a verdict came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ChangeReason {
    /// Stored mtime and size matched; nothing was hashed.
    MetadataMatch,
    /// No previous digest existed; a baseline hash was taken.
    FirstSeen,
    /// Suspicious metadata, and the content hash differed.
    ContentChanged,
    /// Suspicious metadata, but the content hash matched.
    ContentUnchanged,
    /// Metadata diverged without tripping any suspicion rule.
    MetadataDiverged,
}

/// Outcome of checking a single file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeInfo {
    /// Path exactly as it was passed to the checker.
    pub file_path: PathBuf,
    /// Whether the file is considered changed.
    pub changed: bool,
    /// Whether the metadata pattern required content verification.
    pub suspicious: bool,
    /// Current modification time in milliseconds.
    pub mtime_ms: f64,
    /// Current size in bytes.
    pub size: u64,
    /// Digest computed during this check, if any.
    pub hash: Option<ContentDigest>,
    /// Which branch produced the verdict.
    pub reason: ChangeReason,
}

impl ChangeInfo {
    /// Build a verdict from a stamp.
    pub fn new(
        file_path: impl Into<PathBuf>,
        stamp: FileStamp,
        changed: bool,
        suspicious: bool,
        hash: Option<ContentDigest>,
        reason: ChangeReason,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            changed,
            suspicious,
            mtime_ms: stamp.modified_ms,
            size: stamp.size,
            hash,
            reason,
        }
    }
}

/// Shape of the value returned from a check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum CheckMode {
    /// Return only whether the file changed.
    #[default]
    Boolean,
    /// Return the full verdict.
    Detail,
    /// Return whether the file changed and invoke the callback.
    Callback,
}

/// Callback invoked with each verdict in [`CheckMode::Callback`].
pub type ChangeCallback = Arc<dyn Fn(&ChangeInfo) + Send + Sync>;

/// Options for a single check or a folder traversal.
#[derive(Clone, Default)]
pub struct CheckOptions {
    /// Result shape.
    pub mode: CheckMode,
    /// Invoked once per verdict when `mode` is `Callback`.
    pub on_change: Option<ChangeCallback>,
    /// Consulted between files of a folder traversal.
    pub cancel: Option<CancellationToken>,
}

impl CheckOptions {
    /// Options for the given mode.
    pub fn new(mode: CheckMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    /// Boolean mode.
    pub fn boolean() -> Self {
        Self::new(CheckMode::Boolean)
    }

    /// Detail mode.
    pub fn detail() -> Self {
        Self::new(CheckMode::Detail)
    }

    /// Callback mode with the given callback.
    pub fn callback(f: impl Fn(&ChangeInfo) + Send + Sync + 'static) -> Self {
        Self {
            mode: CheckMode::Callback,
            on_change: Some(Arc::new(f)),
            cancel: None,
        }
    }

    /// Attach a cancellation token.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Whether the attached token, if any, has fired.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    /// Deliver a verdict to the callback if this is callback mode.
    pub fn notify(&self, info: &ChangeInfo) {
        if self.mode == CheckMode::Callback {
            if let Some(callback) = &self.on_change {
                callback(info);
            }
        }
    }
}

impl fmt::Debug for CheckOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckOptions")
            .field("mode", &self.mode)
            .field("on_change", &self.on_change.is_some())
            .field("cancel", &self.cancel)
            .finish()
    }
}

/// Result of `check_file`.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    /// Boolean and callback modes.
    Changed(bool),
    /// Detail mode.
    Detail(ChangeInfo),
}

impl CheckOutcome {
    /// Shape a verdict according to the mode.
    pub fn from_info(info: ChangeInfo, mode: CheckMode) -> Self {
        match mode {
            CheckMode::Detail => Self::Detail(info),
            CheckMode::Boolean | CheckMode::Callback => Self::Changed(info.changed),
        }
    }

    /// Whether the file changed, regardless of shape.
    pub fn is_changed(&self) -> bool {
        match self {
            Self::Changed(changed) => *changed,
            Self::Detail(info) => info.changed,
        }
    }

    /// The verdict, if this is a detail outcome.
    pub fn into_detail(self) -> Option<ChangeInfo> {
        match self {
            Self::Detail(info) => Some(info),
            Self::Changed(_) => None,
        }
    }
}

/// Result of `check_folder`.
#[derive(Debug, Clone, PartialEq)]
pub enum FolderOutcome {
    /// Changed paths only (boolean and callback modes).
    Changed(Vec<PathBuf>),
    /// Every visited file (detail mode).
    Details(Vec<ChangeInfo>),
}

impl FolderOutcome {
    /// Empty outcome of the right shape for `mode`.
    pub fn empty(mode: CheckMode) -> Self {
        match mode {
            CheckMode::Detail => Self::Details(Vec::new()),
            CheckMode::Boolean | CheckMode::Callback => Self::Changed(Vec::new()),
        }
    }

    /// Fold one verdict in.
    pub fn record(&mut self, info: ChangeInfo) {
        match self {
            Self::Changed(paths) => {
                if info.changed {
                    paths.push(info.file_path);
                }
            }
            Self::Details(infos) => infos.push(info),
        }
    }

    /// Number of entries collected.
    pub fn len(&self) -> usize {
        match self {
            Self::Changed(paths) => paths.len(),
            Self::Details(infos) => infos.len(),
        }
    }

    /// Whether nothing was collected.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Paths of changed files, whatever the shape.
    pub fn changed_paths(&self) -> Vec<PathBuf> {
        match self {
            Self::Changed(paths) => paths.clone(),
            Self::Details(infos) => infos
                .iter()
                .filter(|i| i.changed)
                .map(|i| i.file_path.clone())
                .collect(),
        }
    }
}
