//! Dispatcher that probes a batch of targets concurrently.

use crate::notify::Notifier;
use crate::probe::{probe_target, ProbeSettings};
use crate::store::{HealthStatus, Store, Target, TargetStatus};

use chrono::Utc;
use std::sync::Arc;

/// Fans a status sweep out to one task per target and joins the results.
pub struct Dispatcher {
    store: Arc<Store>,
    notifier: Notifier,
    client: reqwest::Client,
    settings: ProbeSettings,
}

impl Dispatcher {
    pub fn new(store: Arc<Store>, notifier: Notifier, settings: ProbeSettings) -> Self {
        Self {
            store,
            notifier,
            client: reqwest::Client::new(),
            settings,
        }
    }

    /// Probe every target, record each result and return one status per
    /// target in input order.
    ///
    /// Probe tasks are detached: dropping the returned future does not stop
    /// them and their results are still recorded.
    pub async fn check_all(&self, targets: Vec<Target>) -> Vec<TargetStatus> {
        let handles: Vec<_> = targets
            .iter()
            .cloned()
            .map(|target| {
                let store = self.store.clone();
                let notifier = self.notifier.clone();
                let client = self.client.clone();
                let settings = self.settings.clone();
                tokio::spawn(async move { check_one(&client, &store, &notifier, &target, &settings).await })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (target, handle) in targets.into_iter().zip(handles) {
            match handle.await {
                Ok(status) => results.push(status),
                Err(e) => {
                    tracing::error!("Probe task for {} failed: {}", target.name, e);
                    results.push(TargetStatus {
                        id: target.id,
                        name: target.name,
                        url: target.url,
                        status: HealthStatus::Down,
                        latency: 0,
                    });
                }
            }
        }
        results
    }
}

async fn check_one(
    client: &reqwest::Client,
    store: &Store,
    notifier: &Notifier,
    target: &Target,
    settings: &ProbeSettings,
) -> TargetStatus {
    let outcome = probe_target(client, target, settings).await;
    let status = outcome.status;
    let latency = outcome.latency_ms;

    if let Some(incident) = store.record_check(target, outcome.into_record(Utc::now().timestamp_millis())) {
        tracing::info!("Incident for {}: {}", target.name, incident.message);
        notifier.notify(incident);
    }

    TargetStatus {
        id: target.id.clone(),
        name: target.name.clone(),
        url: target.url.clone(),
        status,
        latency,
    }
}
