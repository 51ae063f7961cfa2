use filetime::{FileTime, set_file_mtime};
use stalecheck_detect::{
    ChangeChecker, ChangeInfo, ChangeReason, CheckError, CheckOptions, CheckOutcome,
    CheckerConfig, ContentDigest, ContentHasher, FolderOutcome, HashBackend,
};
use stalecheck_hash::StreamingHasher;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const T0: i64 = 1_600_000_000;

/// Streaming hasher that counts file reads.
#[derive(Debug, Default)]
struct CountingHasher {
    calls: AtomicUsize,
}

impl CountingHasher {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ContentHasher for CountingHasher {
    fn backend(&self) -> HashBackend {
        HashBackend::Streaming
    }

    fn hash_bytes(&self, bytes: &[u8]) -> ContentDigest {
        StreamingHasher.hash_bytes(bytes)
    }

    fn hash_file(&self, path: &Path) -> std::io::Result<ContentDigest> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        StreamingHasher.hash_file(path)
    }
}

struct Fixture {
    state: TempDir,
    data: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            state: TempDir::new().unwrap(),
            data: TempDir::new().unwrap(),
        }
    }

    fn config(&self) -> CheckerConfig {
        CheckerConfig::new(
            self.state.path().join("mtimes.json"),
            self.state.path().join("hashes.json"),
        )
    }

    fn counting(&self) -> (ChangeChecker, Arc<CountingHasher>) {
        let hasher = Arc::new(CountingHasher::default());
        let checker = ChangeChecker::with_hasher(self.config(), hasher.clone()).unwrap();
        (checker, hasher)
    }

    fn file(&self, name: &str, contents: &[u8], mtime: i64) -> PathBuf {
        let path = self.data.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
        set_mtime(&path, mtime);
        path
    }
}

fn set_mtime(path: &Path, secs: i64) {
    set_file_mtime(path, FileTime::from_unix_time(secs, 0)).unwrap();
}

async fn detail(checker: &mut ChangeChecker, path: &Path) -> ChangeInfo {
    checker
        .check_file(path, &CheckOptions::detail())
        .await
        .unwrap()
        .into_detail()
        .unwrap()
}

#[tokio::test]
async fn test_new_file_is_changed_and_suspicious() {
    let fx = Fixture::new();
    let (mut checker, hasher) = fx.counting();
    let path = fx.file("big.bin", &[b'a'; 100], T0);

    let info = detail(&mut checker, &path).await;

    assert!(info.changed);
    assert!(info.suspicious);
    assert_eq!(info.reason, ChangeReason::FirstSeen);
    assert_eq!(info.size, 100);
    assert_eq!(info.file_path, path);
    assert_eq!(info.hash, Some(StreamingHasher.hash_bytes(&[b'a'; 100])));
    assert_eq!(hasher.calls(), 1);
}

#[tokio::test]
async fn test_second_check_takes_fast_path() {
    let fx = Fixture::new();
    let (mut checker, hasher) = fx.counting();
    let path = fx.file("big.bin", &[b'a'; 100], T0);

    assert!(checker.check_file(&path, &CheckOptions::boolean()).await.unwrap().is_changed());
    let outcome = checker.check_file(&path, &CheckOptions::boolean()).await.unwrap();

    assert_eq!(outcome, CheckOutcome::Changed(false));
    assert_eq!(hasher.calls(), 1);

    let info = detail(&mut checker, &path).await;
    assert_eq!(info.reason, ChangeReason::MetadataMatch);
    assert!(!info.suspicious);
    assert!(info.hash.is_none());
    assert_eq!(hasher.calls(), 1);
}

#[tokio::test]
async fn test_same_size_rewrite_is_verified() {
    let fx = Fixture::new();
    let (mut checker, hasher) = fx.counting();
    let path = fx.file("big.bin", &[b'a'; 100], T0);
    detail(&mut checker, &path).await;

    fx.file("big.bin", &[b'b'; 100], T0 + 10);
    let info = detail(&mut checker, &path).await;

    assert!(info.suspicious);
    assert!(info.changed);
    assert_eq!(info.reason, ChangeReason::ContentChanged);
    assert_eq!(hasher.calls(), 2);
}

#[tokio::test]
async fn test_touch_without_rewrite_is_unchanged() {
    let fx = Fixture::new();
    let (mut checker, _hasher) = fx.counting();
    let path = fx.file("big.bin", &[b'a'; 100], T0);
    detail(&mut checker, &path).await;

    set_mtime(&path, T0 + 10);
    let info = detail(&mut checker, &path).await;

    assert!(info.suspicious);
    assert!(!info.changed);
    assert_eq!(info.reason, ChangeReason::ContentUnchanged);

    // the new mtime is now the baseline
    let info = detail(&mut checker, &path).await;
    assert_eq!(info.reason, ChangeReason::MetadataMatch);
}

#[tokio::test]
async fn test_mtime_rollback_is_suspicious() {
    let fx = Fixture::new();
    let (mut checker, hasher) = fx.counting();
    let path = fx.file("big.bin", &[b'a'; 100], T0);
    detail(&mut checker, &path).await;

    set_mtime(&path, T0 - 100);
    let info = detail(&mut checker, &path).await;
    assert!(info.suspicious);
    assert!(!info.changed);

    fx.file("big.bin", &[b'a'; 300], T0 - 200);
    let info = detail(&mut checker, &path).await;
    assert!(info.suspicious);
    assert!(info.changed);
    assert_eq!(hasher.calls(), 3);
}

#[tokio::test]
async fn test_metadata_divergence_reports_changed_without_hashing() {
    let fx = Fixture::new();
    let (mut checker, hasher) = fx.counting();
    let path = fx.file("big.bin", &[b'a'; 100], T0);
    let first = detail(&mut checker, &path).await;

    fx.file("big.bin", &[b'a'; 200], T0 + 10);
    let info = detail(&mut checker, &path).await;

    assert!(info.changed);
    assert!(!info.suspicious);
    assert!(info.hash.is_none());
    assert_eq!(info.reason, ChangeReason::MetadataDiverged);
    assert_eq!(hasher.calls(), 1);

    // metadata moves forward, the digest stays at the last hashed content
    assert_eq!(checker.metadata_record(&path).unwrap().size, 200);
    assert_eq!(checker.hash_record(&path).unwrap().hash, first.hash.unwrap());
}

#[tokio::test]
async fn test_small_files_are_always_verified() {
    let fx = Fixture::new();
    let (mut checker, hasher) = fx.counting();
    let path = fx.file("tiny.txt", b"tiny", T0);
    detail(&mut checker, &path).await;

    fx.file("tiny.txt", b"tiny!", T0 + 10);
    let info = detail(&mut checker, &path).await;
    assert!(info.suspicious);
    assert!(info.changed);
    assert_eq!(hasher.calls(), 2);

    // identical metadata still short-circuits before suspicion
    let info = detail(&mut checker, &path).await;
    assert!(!info.suspicious);
    assert!(!info.changed);
    assert_eq!(hasher.calls(), 2);
}

#[tokio::test]
async fn test_hello_end_to_end() {
    let fx = Fixture::new();
    let path = fx.data.path().join("a.txt");
    fs::write(&path, "hello").unwrap();

    let mut checker = ChangeChecker::open(fx.config()).unwrap();
    let options = CheckOptions::boolean();

    assert!(checker.check_file(&path, &options).await.unwrap().is_changed());
    assert!(!checker.check_file(&path, &options).await.unwrap().is_changed());

    let mut file = fs::OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(b"!").unwrap();
    drop(file);

    assert!(checker.check_file(&path, &options).await.unwrap().is_changed());
    checker.save().unwrap();
    drop(checker);

    let mut reopened = ChangeChecker::open(fx.config()).unwrap();
    assert!(!reopened.check_file(&path, &options).await.unwrap().is_changed());
}

#[tokio::test]
async fn test_reopened_checker_gives_identical_verdicts() {
    let fx = Fixture::new();
    let paths = vec![
        fx.file("a.txt", b"short", T0),
        fx.file("b.bin", &[7u8; 4096], T0 + 1),
        fx.file("nested/c.bin", &[9u8; 70], T0 + 2),
    ];

    let (mut first, _) = fx.counting();
    first
        .check_folder(fx.data.path(), &CheckOptions::boolean())
        .await
        .unwrap();

    let mut before = Vec::new();
    for path in &paths {
        before.push(detail(&mut first, path).await);
    }
    drop(first);

    let (mut second, hasher) = fx.counting();
    let mut reloaded = Vec::new();
    for path in &paths {
        reloaded.push(detail(&mut second, path).await);
    }

    assert_eq!(before, reloaded);
    assert!(reloaded.iter().all(|i| !i.changed));
    assert_eq!(hasher.calls(), 0);
}

#[tokio::test]
async fn test_check_folder_boolean_saves_once() {
    let fx = Fixture::new();
    for i in 0..5 {
        fx.file(&format!("dir{}/file{i}.txt", i % 2), format!("content {i}").as_bytes(), T0);
    }

    let (mut checker, _) = fx.counting();
    let outcome = checker
        .check_folder(fx.data.path(), &CheckOptions::boolean())
        .await
        .unwrap();

    let FolderOutcome::Changed(paths) = outcome else {
        panic!("expected changed paths");
    };
    assert_eq!(paths.len(), 5);
    assert_eq!(checker.flush_counts(), (1, 1));
    assert!(fx.state.path().join("mtimes.json").exists());
    assert!(fx.state.path().join("hashes.json").exists());

    let outcome = checker
        .check_folder(fx.data.path(), &CheckOptions::boolean())
        .await
        .unwrap();
    assert!(outcome.is_empty());
    assert_eq!(checker.flush_counts(), (2, 2));
}

#[tokio::test]
async fn test_check_folder_detail_reports_every_file() {
    let fx = Fixture::new();
    for i in 0..4 {
        fx.file(&format!("f{i}.txt"), b"same", T0);
    }

    let (mut checker, _) = fx.counting();
    let outcome = checker
        .check_folder(fx.data.path(), &CheckOptions::detail())
        .await
        .unwrap();
    let FolderOutcome::Details(infos) = outcome else {
        panic!("expected details");
    };
    assert_eq!(infos.len(), 4);
    assert!(infos.iter().all(|i| i.changed && i.suspicious));

    let outcome = checker
        .check_folder(fx.data.path(), &CheckOptions::detail())
        .await
        .unwrap();
    assert_eq!(outcome.len(), 4);
    assert!(outcome.changed_paths().is_empty());
}

#[tokio::test]
async fn test_callback_fires_for_every_verdict() {
    let fx = Fixture::new();
    let (mut checker, _) = fx.counting();
    let path = fx.file("a.txt", b"hello", T0);

    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let options = CheckOptions::callback(move |_info| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let first = checker.check_file(&path, &options).await.unwrap();
    let second = checker.check_file(&path, &options).await.unwrap();

    assert_eq!(first, CheckOutcome::Changed(true));
    assert_eq!(second, CheckOutcome::Changed(false));
    assert_eq!(seen.load(Ordering::SeqCst), 2);

    fx.file("b.txt", b"world", T0);
    let outcome = checker.check_folder(fx.data.path(), &options).await.unwrap();
    assert_eq!(outcome, FolderOutcome::Changed(vec![fx.data.path().join("b.txt")]));
    assert_eq!(seen.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_missing_file_propagates() {
    let fx = Fixture::new();
    let (mut checker, _) = fx.counting();

    let err = checker
        .check_file(fx.data.path().join("missing.txt"), &CheckOptions::boolean())
        .await
        .unwrap_err();

    assert!(matches!(err, CheckError::NotFound { .. }));
    assert_eq!(checker.tracked_files().count(), 0);
}

#[tokio::test]
async fn test_folder_root_must_be_directory() {
    let fx = Fixture::new();
    let (mut checker, _) = fx.counting();
    let path = fx.file("a.txt", b"hello", T0);

    let err = checker
        .check_folder(&path, &CheckOptions::boolean())
        .await
        .unwrap_err();
    assert!(matches!(err, CheckError::NotADirectory { .. }));
}

#[tokio::test]
async fn test_cancelled_folder_check_saves_nothing() {
    let fx = Fixture::new();
    for i in 0..3 {
        fx.file(&format!("f{i}.txt"), b"data", T0);
    }

    let token = CancellationToken::new();
    let trigger = token.clone();
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let options = CheckOptions::callback(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        trigger.cancel();
    })
    .with_cancel(token);

    let (mut checker, _) = fx.counting();
    let err = checker
        .check_folder(fx.data.path(), &options)
        .await
        .unwrap_err();

    assert!(matches!(err, CheckError::Cancelled));
    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert_eq!(checker.flush_counts(), (0, 0));
    assert!(!fx.state.path().join("mtimes.json").exists());

    // the one completed check holds a matching pair of records
    let checked = checker.tracked_files().next().unwrap().to_path_buf();
    assert!(checker.hash_record(&checked).is_some());
}

#[tokio::test]
async fn test_prune_missing() {
    let fx = Fixture::new();
    let (mut checker, _) = fx.counting();
    let keep = fx.file("keep.txt", b"keep", T0);
    let gone = fx.file("gone.txt", b"gone", T0);

    checker.check(&keep).await.unwrap();
    checker.check(&gone).await.unwrap();
    fs::remove_file(&gone).unwrap();

    assert_eq!(checker.prune_missing(), 1);
    assert_eq!(checker.tracked_files().collect::<Vec<_>>(), vec![keep.as_path()]);
    assert!(checker.hash_record(&gone).is_none());
    assert!(!checker.forget(&gone));
}

#[tokio::test]
async fn test_digests_survive_backend_switch() {
    let fx = Fixture::new();
    let path = fx.file("big.bin", &vec![3u8; 200 * 1024], T0);

    let mut checker =
        ChangeChecker::open(fx.config().with_backend(HashBackend::Buffered)).unwrap();
    checker.check(&path).await.unwrap();
    checker.save().unwrap();
    drop(checker);

    set_mtime(&path, T0 + 10);
    let mut checker = ChangeChecker::open(fx.config().with_backend(HashBackend::Mapped)).unwrap();
    let info = checker.check(&path).await.unwrap();

    assert!(info.suspicious);
    assert!(!info.changed);

    checker.reselect_backend(HashBackend::Streaming);
    assert_eq!(checker.backend(), HashBackend::Streaming);
    checker.ready().await.unwrap();
    assert_eq!(checker.compute_hash(&path).await.unwrap(), info.hash.unwrap());
}

#[tokio::test]
async fn test_malformed_stores_degrade_to_first_sight() {
    let fx = Fixture::new();
    fs::write(fx.state.path().join("mtimes.json"), "not json").unwrap();
    fs::write(fx.state.path().join("hashes.json"), "[1, 2").unwrap();
    let path = fx.file("a.txt", b"hello", T0);

    let (mut checker, _) = fx.counting();
    let info = checker.check(&path).await.unwrap();

    assert!(info.changed);
    assert_eq!(info.reason, ChangeReason::FirstSeen);
}

#[tokio::test]
async fn test_save_failure_is_reported_and_state_kept() {
    let fx = Fixture::new();
    let blocker = fx.state.path().join("blocker");
    fs::write(&blocker, "").unwrap();
    let config = CheckerConfig::new(blocker.join("mtimes.json"), blocker.join("hashes.json"));

    let mut checker = ChangeChecker::open(config).unwrap();
    let path = fx.file("a.txt", b"hello", T0);
    checker.check(&path).await.unwrap();

    let err = checker.save().unwrap_err();
    assert!(matches!(err, CheckError::Store(_)));
    assert!(checker.metadata_record(&path).is_some());
    assert_eq!(checker.flush_counts(), (0, 0));
}

#[tokio::test]
async fn test_compute_hash_leaves_stores_alone() {
    let fx = Fixture::new();
    let (mut checker, _) = fx.counting();
    let path = fx.file("a.txt", b"hello", T0);

    let digest = checker.compute_hash(&path).await.unwrap();

    assert_eq!(digest, StreamingHasher.hash_bytes(b"hello"));
    assert_eq!(digest.to_hex().len(), 16);
    assert_eq!(checker.tracked_files().count(), 0);
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_non_utf8_file_does_not_block_saving() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let fx = Fixture::new();
    let ok = fx.file("ok.txt", b"fine", T0);
    let bad = fx.data.path().join(OsStr::from_bytes(b"bad\xff.txt"));
    fs::write(&bad, "broken").unwrap();

    let (mut checker, _) = fx.counting();
    let outcome = checker
        .check_folder(fx.data.path(), &CheckOptions::boolean())
        .await
        .unwrap();
    assert_eq!(outcome, FolderOutcome::Changed(vec![ok.clone()]));
    assert_eq!(checker.flush_counts(), (1, 1));

    let err = checker.check(&bad).await.unwrap_err();
    assert!(matches!(err, CheckError::NonUtf8Path { .. }));
    assert!(checker.metadata_record(&bad).is_none());

    fs::remove_file(&bad).unwrap();
    checker
        .check_folder(fx.data.path(), &CheckOptions::boolean())
        .await
        .unwrap();
    checker.save().unwrap();
    assert_eq!(checker.tracked_files().collect::<Vec<_>>(), vec![ok.as_path()]);
}

#[tokio::test]
async fn test_failed_hash_store_write_keeps_disk_pair_consistent() {
    let fx = Fixture::new();
    let hash_dir = fx.state.path().join("hashes");
    let hash_store = hash_dir.join("hashes.json");
    let config = CheckerConfig::new(fx.state.path().join("mtimes.json"), &hash_store);
    let path = fx.file("big.bin", &[b'a'; 100], T0);

    let mut checker = ChangeChecker::open(config.clone()).unwrap();
    checker.check(&path).await.unwrap();
    checker.save().unwrap();
    drop(checker);

    // same-size rewrite, then make only the hash store unwritable
    let mut checker = ChangeChecker::open(config.clone()).unwrap();
    fx.file("big.bin", &[b'b'; 100], T0 + 10);
    assert!(checker.check(&path).await.unwrap().changed);

    let saved = fs::read(&hash_store).unwrap();
    fs::remove_dir_all(&hash_dir).unwrap();
    fs::write(&hash_dir, "").unwrap();

    let err = checker.save().unwrap_err();
    assert!(matches!(err, CheckError::Store(_)));
    assert_eq!(checker.flush_counts(), (0, 0));
    drop(checker);

    fs::remove_file(&hash_dir).unwrap();
    fs::create_dir(&hash_dir).unwrap();
    fs::write(&hash_store, saved).unwrap();

    let mut checker = ChangeChecker::open(config).unwrap();
    assert_eq!(
        checker.metadata_record(&path).unwrap().modified_ms,
        (T0 * 1000) as f64
    );
    let info = checker.check(&path).await.unwrap();
    assert!(info.changed);
    assert_eq!(info.reason, ChangeReason::ContentChanged);
}
