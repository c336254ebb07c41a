//! Heartbeat - multi-target uptime monitor
//!
//! Probes the targets registered in an external datastore on every status
//! request, keeps a bounded in-memory history and incident log, and notifies
//! webhooks when a target changes state.

mod config;
mod confirm;
mod datastore;
mod dispatch;
mod notify;
mod probe;
mod store;
mod web;

use config::{ServerConfig, DEFAULT_CONFIRM_SECRET};
use datastore::DatastoreClient;
use dispatch::Dispatcher;
use notify::{sinks_from_config, Notifier};
use probe::ProbeSettings;
use store::Store;
use web::Server;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("heartbeat=info".parse()?))
        .init();

    // Load configuration; invalid values are fatal
    let cfg = ServerConfig::load()?;
    tracing::info!("Starting Heartbeat on port {}...", cfg.http_port);
    tracing::info!(
        "Probing with timeout {:?}, {} attempt(s), retry delay {:?}, degraded at {}ms",
        cfg.ping_timeout,
        cfg.ping_retries,
        cfg.ping_retry_delay,
        cfg.degraded_ms
    );
    if cfg.confirm_token_secret == DEFAULT_CONFIRM_SECRET {
        tracing::warn!("CONFIRM_TOKEN_SECRET is not set; using the development secret");
    }

    let store = Arc::new(open_store(&cfg.confirm_store_path));

    let sinks = sinks_from_config(&cfg);
    tracing::info!("Notifications enabled for {} sink(s)", sinks.len());
    let notifier = Notifier::new(sinks);

    let dispatcher = Arc::new(Dispatcher::new(store.clone(), notifier, ProbeSettings::from_config(&cfg)));
    let datastore = DatastoreClient::from_config(&cfg);

    // Start web server
    let server = Server::new(cfg, store, dispatcher, datastore);
    server.start().await?;

    Ok(())
}

/// Open the store, snapshotting confirmed emails to `path` unless it is empty.
fn open_store(path: &str) -> Store {
    if path.is_empty() {
        tracing::warn!("CONFIRM_STORE_PATH is empty; confirmed emails will be lost on restart");
        return Store::in_memory();
    }
    let store = Store::open(path);
    tracing::info!("Loaded {} confirmed email(s) from {}", store.confirmed_count(), path);
    store
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_store_persists_only_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("confirmed.json");
        let path = path.to_str().unwrap();

        open_store(path).mark_confirmed("a@example.com");
        assert!(open_store(path).is_confirmed("a@example.com"));

        open_store("").mark_confirmed("b@example.com");
        assert!(!open_store("").is_confirmed("b@example.com"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
