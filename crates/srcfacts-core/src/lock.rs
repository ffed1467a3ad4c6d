//! Advisory locking of the shared aggregate.
//!
//! The aggregate is one mutable tree. Merges and removals take the lock
//! exclusively; queries share it. Every acquisition waits at most the
//! caller's timeout and hands back a guard that releases on drop, so
//! early returns and `?` never leak the lock.
//!
//! [`WorkingSet`] couples the lock with the aggregate and a registry of
//! per-file content digests used to skip re-merging unchanged files.

use std::collections::BTreeMap;
use std::sync::{Condvar, Mutex, PoisonError, RwLock, RwLockReadGuard};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::error::SrcFactsResult;
use crate::merge::merge;
use crate::model::{Language, ScopeTree};
use crate::store::StoredModel;
use crate::unmerge::{remove_file, RemovalStats};

// ============================================================================
// Errors
// ============================================================================

/// Errors raised while acquiring the advisory lock.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LockError {
    /// The lock stayed held for the whole timeout.
    #[error("timed out after {waited_ms} ms waiting for the aggregate lock")]
    Timeout { waited_ms: u64 },
}

/// Result type for lock operations.
pub type LockResult<T> = Result<T, LockError>;

// ============================================================================
// Advisory Lock
// ============================================================================

#[derive(Debug, Default)]
struct LockState {
    readers: usize,
    writer: bool,
}

/// Shared/exclusive lock with bounded waits.
#[derive(Debug, Default)]
pub struct AdvisoryLock {
    state: Mutex<LockState>,
    released: Condvar,
}

/// Shared hold on an [`AdvisoryLock`].
#[derive(Debug)]
pub struct ReadGuard<'a> {
    lock: &'a AdvisoryLock,
}

/// Exclusive hold on an [`AdvisoryLock`].
#[derive(Debug)]
pub struct WriteGuard<'a> {
    lock: &'a AdvisoryLock,
}

impl AdvisoryLock {
    pub fn new() -> Self {
        AdvisoryLock::default()
    }

    /// Acquire shared access, waiting at most `timeout`.
    pub fn read(&self, timeout: Duration) -> LockResult<ReadGuard<'_>> {
        self.acquire(timeout, false)?;
        Ok(ReadGuard { lock: self })
    }

    /// Acquire exclusive access, waiting at most `timeout`.
    pub fn write(&self, timeout: Duration) -> LockResult<WriteGuard<'_>> {
        self.acquire(timeout, true)?;
        Ok(WriteGuard { lock: self })
    }

    /// Whether anyone holds the lock right now.
    pub fn is_held(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.writer || state.readers > 0
    }

    fn acquire(&self, timeout: Duration, exclusive: bool) -> LockResult<()> {
        let start = Instant::now();
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let blocked = |s: &mut LockState| s.writer || (exclusive && s.readers > 0);
        let (mut state, wait) = self
            .released
            .wait_timeout_while(state, timeout, blocked)
            .unwrap_or_else(PoisonError::into_inner);
        let waited_ms = start.elapsed().as_millis() as u64;
        if wait.timed_out() && (state.writer || (exclusive && state.readers > 0)) {
            tracing::warn!(waited_ms, exclusive, "aggregate lock wait timed out");
            return Err(LockError::Timeout { waited_ms });
        }
        if exclusive {
            state.writer = true;
        } else {
            state.readers += 1;
        }
        tracing::debug!(waited_ms, exclusive, readers = state.readers, "acquired aggregate lock");
        Ok(())
    }

    fn release(&self, exclusive: bool) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if exclusive {
            state.writer = false;
        } else {
            state.readers = state.readers.saturating_sub(1);
        }
        drop(state);
        self.released.notify_all();
    }
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.lock.release(false);
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.lock.release(true);
    }
}

// ============================================================================
// Working Set
// ============================================================================

/// SHA-256 of file content, hex encoded.
pub fn digest(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// What [`WorkingSet::update_file`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Digest matched the registry; nothing changed.
    Unchanged,
    /// The file was new and has been merged.
    Added,
    /// The old contribution was removed and the new one merged.
    Replaced,
}

#[derive(Debug)]
struct SetState {
    tree: ScopeTree,
    digests: BTreeMap<String, String>,
}

/// The aggregate together with its advisory lock and digest registry.
#[derive(Debug)]
pub struct WorkingSet {
    lock: AdvisoryLock,
    state: RwLock<SetState>,
}

/// Read-only view of a [`WorkingSet`], valid while the shared hold lasts.
pub struct WorkingSetView<'a> {
    _hold: ReadGuard<'a>,
    state: RwLockReadGuard<'a, SetState>,
}

impl WorkingSetView<'_> {
    pub fn tree(&self) -> &ScopeTree {
        &self.state.tree
    }

    /// Registered files and their digests.
    pub fn digests(&self) -> &BTreeMap<String, String> {
        &self.state.digests
    }
}

impl WorkingSet {
    /// Empty aggregate.
    pub fn new(language: Language) -> Self {
        WorkingSet::from_parts(ScopeTree::new(language), BTreeMap::new())
    }

    /// Resume from a stored model.
    pub fn from_stored(model: StoredModel) -> Self {
        WorkingSet::from_parts(model.tree, model.files)
    }

    fn from_parts(tree: ScopeTree, digests: BTreeMap<String, String>) -> Self {
        WorkingSet {
            lock: AdvisoryLock::new(),
            state: RwLock::new(SetState { tree, digests }),
        }
    }

    /// Merge one file-local tree and record its digest.
    pub fn merge_file(&self, tree: ScopeTree, digest: &str, timeout: Duration) -> SrcFactsResult<()> {
        let _hold = self.lock.write(timeout)?;
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let files = tree.files();
        merge(&mut state.tree, tree)?;
        for file in files {
            state.digests.insert(file, digest.to_string());
        }
        Ok(())
    }

    /// Remove a file's contribution. Unknown files are a no-op.
    pub fn remove_file(&self, file: &str, timeout: Duration) -> SrcFactsResult<RemovalStats> {
        let _hold = self.lock.write(timeout)?;
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.digests.remove(file);
        Ok(remove_file(&mut state.tree, file))
    }

    /// Replace a file's contribution unless its digest is unchanged.
    pub fn update_file(&self, tree: ScopeTree, digest: &str, timeout: Duration) -> SrcFactsResult<UpdateOutcome> {
        let _hold = self.lock.write(timeout)?;
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let files = tree.files();
        let known: Vec<&String> = files.iter().filter(|f| state.digests.contains_key(*f)).collect();
        if !known.is_empty() && files.iter().all(|f| state.digests.get(f).map(String::as_str) == Some(digest)) {
            tracing::debug!(files = ?files, "digest unchanged, skipping update");
            return Ok(UpdateOutcome::Unchanged);
        }
        let outcome = if known.is_empty() {
            UpdateOutcome::Added
        } else {
            UpdateOutcome::Replaced
        };
        for file in &files {
            remove_file(&mut state.tree, file);
        }
        merge(&mut state.tree, tree)?;
        for file in files {
            state.digests.insert(file, digest.to_string());
        }
        Ok(outcome)
    }

    /// Shared view for queries.
    pub fn read(&self, timeout: Duration) -> SrcFactsResult<WorkingSetView<'_>> {
        let hold = self.lock.read(timeout)?;
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(WorkingSetView { _hold: hold, state })
    }

    /// Copy the aggregate out for saving.
    pub fn snapshot(&self, timeout: Duration) -> SrcFactsResult<StoredModel> {
        let view = self.read(timeout)?;
        Ok(StoredModel::new(view.tree().clone(), view.digests().clone()))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equality::assert_structurally_equal;
    use crate::error::SrcFactsError;
    use crate::test_support::{aggregate, parse_snippet};
    use std::sync::Arc;
    use std::thread;

    const SHORT: Duration = Duration::from_millis(20);
    const LONG: Duration = Duration::from_secs(5);

    const A: &str = "<namespace>namespace <name>N</name> <block>{<class>class <name>A</name> <block>{}</block>;</class>}</block></namespace>";
    const B: &str = "<namespace>namespace <name>N</name> <block>{<class>class <name>B</name> <block>{}</block>;</class>}</block></namespace>";

    mod advisory {
        use super::*;

        #[test]
        fn readers_share() {
            let lock = AdvisoryLock::new();
            let first = lock.read(SHORT).unwrap();
            let second = lock.read(SHORT).unwrap();
            assert!(lock.is_held());
            drop(first);
            drop(second);
            assert!(!lock.is_held());
        }

        #[test]
        fn writer_excludes_readers_until_timeout() {
            let lock = AdvisoryLock::new();
            let _writer = lock.write(SHORT).unwrap();
            assert!(matches!(lock.read(SHORT), Err(LockError::Timeout { .. })));
            assert!(matches!(lock.write(SHORT), Err(LockError::Timeout { .. })));
        }

        #[test]
        fn reader_blocks_writer() {
            let lock = AdvisoryLock::new();
            let _reader = lock.read(SHORT).unwrap();
            assert!(lock.write(SHORT).is_err());
        }

        #[test]
        fn guard_releases_on_early_return() {
            fn failing(lock: &AdvisoryLock) -> Result<(), &'static str> {
                let _hold = lock.write(SHORT).map_err(|_| "busy")?;
                Err("failed while holding")
            }
            let lock = AdvisoryLock::new();
            assert!(failing(&lock).is_err());
            assert!(!lock.is_held());
            assert!(lock.write(SHORT).is_ok());
        }

        #[test]
        fn waiting_writer_proceeds_after_release() {
            let lock = Arc::new(AdvisoryLock::new());
            let reader = lock.read(SHORT).unwrap();
            let waiter = {
                let lock = Arc::clone(&lock);
                thread::spawn(move || lock.write(LONG).map(|_| ()))
            };
            thread::sleep(Duration::from_millis(30));
            drop(reader);
            assert!(waiter.join().unwrap().is_ok());
        }
    }

    mod working_set {
        use super::*;

        #[test]
        fn merge_and_remove_round_trip() {
            let set = WorkingSet::new(Language::CPlusPlus);
            set.merge_file(parse_snippet(A, "a.cpp"), &digest(A.as_bytes()), LONG).unwrap();
            set.merge_file(parse_snippet(B, "b.cpp"), &digest(B.as_bytes()), LONG).unwrap();
            set.remove_file("a.cpp", LONG).unwrap();

            let view = set.read(LONG).unwrap();
            assert_structurally_equal(view.tree(), &aggregate(&[("b.cpp", B)]));
            assert_eq!(view.digests().keys().collect::<Vec<_>>(), vec!["b.cpp"]);
        }

        #[test]
        fn unchanged_digest_skips_update() {
            let set = WorkingSet::new(Language::CPlusPlus);
            let d = digest(A.as_bytes());
            assert_eq!(
                set.update_file(parse_snippet(A, "a.cpp"), &d, LONG).unwrap(),
                UpdateOutcome::Added
            );
            assert_eq!(
                set.update_file(parse_snippet(A, "a.cpp"), &d, LONG).unwrap(),
                UpdateOutcome::Unchanged
            );
            assert_eq!(
                set.update_file(parse_snippet(B, "a.cpp"), &digest(B.as_bytes()), LONG).unwrap(),
                UpdateOutcome::Replaced
            );
            let view = set.read(LONG).unwrap();
            assert_structurally_equal(view.tree(), &aggregate(&[("a.cpp", B)]));
        }

        #[test]
        fn writes_time_out_while_a_view_is_open() {
            let set = WorkingSet::new(Language::CPlusPlus);
            let _view = set.read(LONG).unwrap();
            let err = set.remove_file("a.cpp", SHORT).unwrap_err();
            assert!(matches!(err, SrcFactsError::Lock(LockError::Timeout { .. })));
        }

        #[test]
        fn digest_is_hex_sha256() {
            let d = digest(b"abc");
            assert_eq!(d.len(), 64);
            assert!(d.starts_with("ba7816bf"));
        }
    }
}
