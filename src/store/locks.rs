// src/store/locks.rs

//! In-process per-run locks.
//!
//! File locks serialize appends between processes; this registry does the
//! same between threads of one process, keyed by store directory and request
//! id, so unrelated runs never wait on each other.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};

/// Registry size above which idle entries are dropped.
const PRUNE_THRESHOLD: usize = 64;

static GLOBAL: LazyLock<RunLocks> = LazyLock::new(RunLocks::default);

#[derive(Debug, Default)]
pub struct RunLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl RunLocks {
    /// Registry shared by every store instance in this process.
    pub fn global() -> &'static RunLocks {
        &GLOBAL
    }

    /// Lock object for one run, created on first use.
    pub fn lock_for(&self, dir: &Path, request_id: &str) -> Arc<Mutex<()>> {
        let key = format!("{}\u{0}{}", dir.display(), request_id);
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);

        if locks.len() > PRUNE_THRESHOLD {
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }

        Arc::clone(locks.entry(key).or_default())
    }

    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Acquire a run lock. The guarded value is `()`, so a poisoned lock carries
/// no broken state and is simply taken over.
pub fn acquire(lock: &Mutex<()>) -> MutexGuard<'_, ()> {
    lock.lock().unwrap_or_else(PoisonError::into_inner)
}
