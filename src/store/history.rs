//! Check history and incident log.

use super::models::*;
use super::Store;

/// Retained checks per target.
pub const MAX_HISTORY: usize = 500;
/// Retained incidents across all targets.
pub const MAX_INCIDENTS: usize = 200;

impl Store {
    /// Append a check for `target` and detect a status transition.
    ///
    /// Returns the incident created when the status differs from the
    /// previous check. The first check of a target never creates one.
    pub fn record_check(&self, target: &Target, record: CheckRecord) -> Option<Incident> {
        let mut guard = self.lock();
        let inner = &mut *guard;

        let status = record.status;
        let timestamp_ms = record.timestamp_ms;

        let history = inner.history.entry(target.id.clone()).or_default();
        history.push_back(record);
        while history.len() > MAX_HISTORY {
            history.pop_front();
        }

        match inner.last_status.insert(target.id.clone(), status) {
            Some(previous) if previous != status => {}
            _ => return None,
        }

        let seq = inner.incident_seq;
        inner.incident_seq += 1;

        let incident = Incident {
            id: format!("{}_{}_{}_{}", timestamp_ms, target.id, status, seq),
            timestamp_ms,
            target_id: target.id.clone(),
            target_name: target.name.clone(),
            status,
            message: status.transition_message().to_string(),
        };
        inner.incidents.push_front(incident.clone());
        inner.incidents.truncate(MAX_INCIDENTS);

        Some(incident)
    }

    /// Most recent `limit` checks of a target, oldest first.
    ///
    /// A `limit` of 0 or above the retained count returns everything.
    pub fn history(&self, target_id: &str, limit: usize) -> Vec<CheckRecord> {
        let inner = self.lock();
        let Some(history) = inner.history.get(target_id) else {
            return Vec::new();
        };
        let take = effective_limit(limit, history.len());
        history.iter().skip(history.len() - take).cloned().collect()
    }

    /// Most recent `limit` incidents, newest first.
    pub fn incidents(&self, limit: usize) -> Vec<Incident> {
        let inner = self.lock();
        let take = effective_limit(limit, inner.incidents.len());
        inner.incidents.iter().take(take).cloned().collect()
    }
}

fn effective_limit(limit: usize, available: usize) -> usize {
    if limit == 0 || limit > available {
        available
    } else {
        limit
    }
}
