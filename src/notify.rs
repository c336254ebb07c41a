//! Incident notification to webhook sinks.
//!
//! Delivery is best-effort: incidents are queued to a background task, each
//! sink gets a single POST, and failures are only logged.

use crate::config::ServerConfig;
use crate::store::Incident;

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const SINK_TIMEOUT: Duration = Duration::from_secs(5);
const QUEUE_CAPACITY: usize = 256;

/// Kind of notification endpoint, which decides the body shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    /// Receives the full incident as JSON.
    Webhook,
    Slack,
    Discord,
}

impl SinkKind {
    fn as_str(&self) -> &'static str {
        match self {
            SinkKind::Webhook => "webhook",
            SinkKind::Slack => "slack",
            SinkKind::Discord => "discord",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Sink {
    pub kind: SinkKind,
    pub url: String,
}

impl Sink {
    pub fn new(kind: SinkKind, url: impl Into<String>) -> Self {
        Self { kind, url: url.into() }
    }

    /// JSON body for this sink.
    pub fn body(&self, incident: &Incident) -> Value {
        match self.kind {
            SinkKind::Webhook => serde_json::to_value(incident).unwrap_or(Value::Null),
            SinkKind::Slack => json!({
                "text": format!("*Heartbeat* {} - {}", incident.target_name, incident.message),
            }),
            SinkKind::Discord => json!({
                "content": format!("**Heartbeat** {} - {}", incident.target_name, incident.message),
            }),
        }
    }
}

/// Configured sinks; blank URLs are skipped.
pub fn sinks_from_config(cfg: &ServerConfig) -> Vec<Sink> {
    [
        (SinkKind::Webhook, &cfg.webhook_url),
        (SinkKind::Slack, &cfg.slack_webhook_url),
        (SinkKind::Discord, &cfg.discord_webhook_url),
    ]
    .into_iter()
    .filter(|(_, url)| !url.trim().is_empty())
    .map(|(kind, url)| Sink::new(kind, url.trim()))
    .collect()
}

/// Handle for queueing incidents for delivery.
#[derive(Clone)]
pub struct Notifier {
    tx: Option<mpsc::Sender<Incident>>,
}

impl Notifier {
    /// Create a notifier and spawn its delivery task.
    ///
    /// Must be called from within a tokio runtime when `sinks` is non-empty.
    pub fn new(sinks: Vec<Sink>) -> Self {
        if sinks.is_empty() {
            return Self::disabled();
        }

        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        tokio::spawn(run_delivery(rx, reqwest::Client::new(), Arc::new(sinks)));

        Self { tx: Some(tx) }
    }

    /// A notifier that drops every incident.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Queue an incident without waiting for delivery.
    pub fn notify(&self, incident: Incident) {
        let Some(tx) = &self.tx else {
            return;
        };

        if let Err(e) = tx.try_send(incident) {
            tracing::warn!("Dropping incident notification: {}", e);
        }
    }
}

async fn run_delivery(mut rx: mpsc::Receiver<Incident>, client: reqwest::Client, sinks: Arc<Vec<Sink>>) {
    while let Some(incident) = rx.recv().await {
        // One task per sink so a slow sink never holds up the others.
        for sink in sinks.iter() {
            tokio::spawn(deliver(client.clone(), sink.clone(), incident.clone()));
        }
    }
}

async fn deliver(client: reqwest::Client, sink: Sink, incident: Incident) {
    let result = client
        .post(&sink.url)
        .timeout(SINK_TIMEOUT)
        .json(&sink.body(&incident))
        .send()
        .await;

    match result {
        Ok(resp) => tracing::debug!(
            "Delivered incident {} to {} sink: HTTP {}",
            incident.id,
            sink.kind.as_str(),
            resp.status()
        ),
        Err(e) => tracing::debug!(
            "Failed to deliver incident {} to {} sink: {}",
            incident.id,
            sink.kind.as_str(),
            e
        ),
    }
}
