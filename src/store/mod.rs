//! In-memory monitoring store.
//!
//! Holds per-target check history, the last observed status of every target,
//! the global incident log, rate-limit buckets and the confirmed-email table.
//! All of it lives behind one mutex; only the confirmed-email table outlives
//! the process, through a JSON snapshot written after the lock is released.

mod confirmations;
mod history;
mod limiter;
mod models;

pub use history::{MAX_HISTORY, MAX_INCIDENTS};
pub use models::*;

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// State guarded by the store lock.
#[derive(Default)]
struct StoreInner {
    history: HashMap<String, VecDeque<CheckRecord>>,
    last_status: HashMap<String, HealthStatus>,
    /// Most recent first.
    incidents: VecDeque<Incident>,
    incident_seq: u64,
    rate_buckets: HashMap<String, limiter::RateBucket>,
    /// Normalized email -> confirmation time (unix ms).
    confirmed: HashMap<String, i64>,
}

/// Thread-safe monitoring store.
pub struct Store {
    inner: Mutex<StoreInner>,
    confirm_path: Option<PathBuf>,
    /// Serializes snapshot writes without holding the primary lock.
    persist_lock: Mutex<()>,
}

impl Store {
    /// Create a store that keeps confirmed emails in memory only.
    pub fn in_memory() -> Self {
        Self {
            inner: Mutex::new(StoreInner::default()),
            confirm_path: None,
            persist_lock: Mutex::new(()),
        }
    }

    /// Create a store whose confirmed emails are snapshotted to `path`.
    ///
    /// A missing or unreadable snapshot starts the table empty.
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let inner = StoreInner {
            confirmed: confirmations::load_snapshot(&path),
            ..Default::default()
        };
        Self {
            inner: Mutex::new(inner),
            confirm_path: Some(path),
            persist_lock: Mutex::new(()),
        }
    }

    // Critical sections never panic midway, so a poisoned lock still guards
    // consistent data.
    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
