//! Confirmed-email table and its disk snapshot.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::PoisonError;

use chrono::Utc;

use super::Store;

impl Store {
    pub fn is_confirmed(&self, email: &str) -> bool {
        self.lock().confirmed.contains_key(&normalize_email(email))
    }

    /// Mark `email` as confirmed and persist the table.
    pub fn mark_confirmed(&self, email: &str) {
        self.lock()
            .confirmed
            .insert(normalize_email(email), Utc::now().timestamp_millis());
        self.persist_confirmed();
    }

    pub fn confirmed_count(&self) -> usize {
        self.lock().confirmed.len()
    }

    fn persist_confirmed(&self) {
        let Some(path) = &self.confirm_path else {
            return;
        };

        let _writer = self.persist_lock.lock().unwrap_or_else(PoisonError::into_inner);
        // Re-read under the writer lock so the last writer always stores the
        // newest table.
        let snapshot = self.lock().confirmed.clone();

        if let Err(e) = write_snapshot(path, &snapshot) {
            tracing::warn!("Failed to persist confirmed emails to {}: {}", path.display(), e);
        }
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(super) fn load_snapshot(path: &Path) -> HashMap<String, i64> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!("Could not read {}: {}", path.display(), e);
            }
            return HashMap::new();
        }
    };

    match serde_json::from_slice::<HashMap<String, i64>>(&bytes) {
        Ok(table) => table
            .into_iter()
            .map(|(email, ts)| (normalize_email(&email), ts))
            .collect(),
        Err(e) => {
            tracing::warn!("Ignoring corrupt confirmation snapshot {}: {}", path.display(), e);
            HashMap::new()
        }
    }
}

/// Write to `<path>.tmp` and rename over `path`.
fn write_snapshot(path: &Path, snapshot: &HashMap<String, i64>) -> io::Result<()> {
    let tmp = tmp_path(path);
    let body = serde_json::to_vec_pretty(snapshot)?;
    fs::write(&tmp, body)?;
    fs::rename(&tmp, path)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}
