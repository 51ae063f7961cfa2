//! Backend factory and the readiness gate in front of it.

use std::sync::Arc;

use stalecheck_core::{ContentDigest, HashBackend, HashError};

use crate::hasher::{BufferedHasher, ContentHasher, MappedHasher, StreamingHasher};

/// Reference digests every backend must reproduce.
const SELF_TEST_VECTORS: &[(&[u8], u64)] = &[
    (b"", 0xef46_db37_51d8_e999),
    (b"abc", 0x44bc_2cf5_ad77_0999),
];

/// Construct a backend and verify it against the reference vectors.
pub fn build_backend(backend: HashBackend) -> Result<Arc<dyn ContentHasher>, HashError> {
    let hasher: Arc<dyn ContentHasher> = match backend {
        HashBackend::Buffered => Arc::new(BufferedHasher),
        HashBackend::Streaming => Arc::new(StreamingHasher),
        HashBackend::Mapped => Arc::new(MappedHasher),
    };
    self_test(hasher.as_ref())?;
    Ok(hasher)
}

/// Check a hasher against the reference vectors.
pub fn self_test(hasher: &dyn ContentHasher) -> Result<(), HashError> {
    for (input, expected) in SELF_TEST_VECTORS {
        let actual = hasher.hash_bytes(input);
        if actual != ContentDigest::new(*expected) {
            return Err(HashError::InitFailed {
                backend: hasher.backend(),
                message: format!(
                    "self-test mismatch for {} byte input: got {actual}, expected {:016x}",
                    input.len(),
                    expected
                ),
            });
        }
    }
    Ok(())
}

/// Build a backend on the blocking pool.
pub async fn load_backend(backend: HashBackend) -> Result<Arc<dyn ContentHasher>, HashError> {
    match tokio::task::spawn_blocking(move || build_backend(backend)).await {
        Ok(result) => result,
        Err(e) if e.is_cancelled() => Err(HashError::InitCancelled { backend }),
        Err(e) => Err(HashError::InitFailed {
            backend,
            message: e.to_string(),
        }),
    }
}

#[derive(Debug)]
enum SlotState {
    Pending,
    Ready(Arc<dyn ContentHasher>),
    Failed,
}

/// Holds the selected backend and gates every hash on its initialization.
///
/// The first call to [`BackendSlot::ready`] builds the backend. If that
/// fails the error is returned once; later calls get
/// [`HashError::Unavailable`] until [`BackendSlot::reselect`] is called.
#[derive(Debug)]
pub struct BackendSlot {
    backend: HashBackend,
    state: SlotState,
}

impl BackendSlot {
    /// A slot for `backend`, not yet initialized.
    pub fn new(backend: HashBackend) -> Self {
        Self {
            backend,
            state: SlotState::Pending,
        }
    }

    /// A slot that is already ready with the given hasher.
    pub fn with_hasher(hasher: Arc<dyn ContentHasher>) -> Self {
        Self {
            backend: hasher.backend(),
            state: SlotState::Ready(hasher),
        }
    }

    /// The selected backend.
    pub fn backend(&self) -> HashBackend {
        self.backend
    }

    /// Whether the backend has been initialized.
    pub fn is_ready(&self) -> bool {
        matches!(self.state, SlotState::Ready(_))
    }

    /// Whether initialization failed.
    pub fn is_failed(&self) -> bool {
        matches!(self.state, SlotState::Failed)
    }

    /// Wait for the backend, initializing it on first use.
    pub async fn ready(&mut self) -> Result<Arc<dyn ContentHasher>, HashError> {
        match &self.state {
            SlotState::Ready(hasher) => return Ok(hasher.clone()),
            SlotState::Failed => {
                return Err(HashError::Unavailable {
                    backend: self.backend,
                });
            }
            SlotState::Pending => {}
        }

        match load_backend(self.backend).await {
            Ok(hasher) => {
                tracing::debug!(backend = %self.backend, "hash backend ready");
                self.state = SlotState::Ready(hasher.clone());
                Ok(hasher)
            }
            Err(e) => {
                tracing::warn!(backend = %self.backend, error = %e, "hash backend failed to initialize");
                self.state = SlotState::Failed;
                Err(e)
            }
        }
    }

    /// Switch to another backend. The next [`BackendSlot::ready`] builds it.
    pub fn reselect(&mut self, backend: HashBackend) {
        self.backend = backend;
        self.state = SlotState::Pending;
    }
}
