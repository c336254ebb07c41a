//! Configuration module for Heartbeat.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Every value is range-checked; an invalid environment stops the process
//! before it serves traffic.

use std::env;
use std::time::Duration;

use thiserror::Error;

/// Configuration error types.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("missing required variable {0}")]
    Missing(&'static str),
    #[error("invalid {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the web server (default: 8080)
    pub http_port: u16,
    /// Value of `Access-Control-Allow-Origin` (default: "*")
    pub cors_origin: String,
    /// Base URL of the REST datastore holding the target list
    pub datastore_url: String,
    /// API key sent to the datastore
    pub datastore_key: String,
    /// Per-attempt probe timeout (default: 5s)
    pub ping_timeout: Duration,
    /// Attempts per probe, 1 to 5 (default: 1)
    pub ping_retries: u32,
    /// Sleep between failed attempts (default: 200ms)
    pub ping_retry_delay: Duration,
    /// Latency at or above which a reachable target is DEGRADED (default: 1200)
    pub degraded_ms: u64,
    pub webhook_url: String,
    pub slack_webhook_url: String,
    pub discord_webhook_url: String,
    /// Frontend origin that serves the `/confirm` page
    pub confirm_base_url: String,
    pub confirm_token_ttl_minutes: u32,
    pub confirm_token_secret: String,
    /// Snapshot file for confirmed emails; empty disables persistence
    pub confirm_store_path: String,
}

pub const DEFAULT_CONFIRM_SECRET: &str = "dev-only-change-me";

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            cors_origin: "*".to_string(),
            datastore_url: String::new(),
            datastore_key: String::new(),
            ping_timeout: Duration::from_secs(5),
            ping_retries: 1,
            ping_retry_delay: Duration::from_millis(200),
            degraded_ms: 1200,
            webhook_url: String::new(),
            slack_webhook_url: String::new(),
            discord_webhook_url: String::new(),
            confirm_base_url: "http://localhost:5173".to_string(),
            confirm_token_ttl_minutes: 30,
            confirm_token_secret: DEFAULT_CONFIRM_SECRET.to_string(),
            confirm_store_path: ".confirm_store.json".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from the process environment.
    ///
    /// Environment variables:
    /// - `PORT`: HTTP port (default: 8080)
    /// - `CORS_ORIGIN`: allowed origin (default: "*")
    /// - `SUPABASE_URL`, `SUPABASE_ANON_KEY`: target datastore (required)
    /// - `PING_TIMEOUT_MS`: per-attempt timeout, > 0 (default: 5000)
    /// - `PING_RETRIES`: attempts per probe, 1-5 (default: 1)
    /// - `PING_RETRY_DELAY_MS`: 0-10000 (default: 200)
    /// - `DEGRADED_LATENCY_MS`: > 0 (default: 1200)
    /// - `WEBHOOK_URL`, `SLACK_WEBHOOK_URL`, `DISCORD_WEBHOOK_URL`: blank disables
    /// - `CONFIRM_BASE_URL`, `CONFIRM_TOKEN_TTL_MINUTES` (5-1440),
    ///   `CONFIRM_TOKEN_SECRET`, `CONFIRM_STORE_PATH`
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut cfg = Self::default();

        if let Some(port) = get("PORT") {
            cfg.http_port = port.parse().map_err(|_| ConfigError::Invalid {
                name: "PORT",
                reason: format!("{port:?} is not a port number"),
            })?;
        }

        if let Some(origin) = get("CORS_ORIGIN") {
            if axum::http::HeaderValue::from_str(&origin).is_err() {
                return Err(ConfigError::Invalid {
                    name: "CORS_ORIGIN",
                    reason: "not a valid header value".to_string(),
                });
            }
            cfg.cors_origin = origin;
        }

        cfg.datastore_url = get("SUPABASE_URL")
            .ok_or(ConfigError::Missing("SUPABASE_URL"))?
            .trim_end_matches('/')
            .to_string();
        cfg.datastore_key = get("SUPABASE_ANON_KEY").ok_or(ConfigError::Missing("SUPABASE_ANON_KEY"))?;

        if let Some(v) = get("PING_TIMEOUT_MS") {
            let ms = parse_ranged("PING_TIMEOUT_MS", &v, 1, u64::MAX)?;
            cfg.ping_timeout = Duration::from_millis(ms);
        }

        if let Some(v) = get("PING_RETRIES") {
            cfg.ping_retries = parse_ranged("PING_RETRIES", &v, 1, 5)? as u32;
        }

        if let Some(v) = get("PING_RETRY_DELAY_MS") {
            let ms = parse_ranged("PING_RETRY_DELAY_MS", &v, 0, 10_000)?;
            cfg.ping_retry_delay = Duration::from_millis(ms);
        }

        if let Some(v) = get("DEGRADED_LATENCY_MS") {
            cfg.degraded_ms = parse_ranged("DEGRADED_LATENCY_MS", &v, 1, u64::MAX)?;
        }

        cfg.webhook_url = get("WEBHOOK_URL").unwrap_or_default();
        cfg.slack_webhook_url = get("SLACK_WEBHOOK_URL").unwrap_or_default();
        cfg.discord_webhook_url = get("DISCORD_WEBHOOK_URL").unwrap_or_default();

        if let Some(base) = get("CONFIRM_BASE_URL") {
            cfg.confirm_base_url = base.trim_end_matches('/').to_string();
        }

        if let Some(v) = get("CONFIRM_TOKEN_TTL_MINUTES") {
            cfg.confirm_token_ttl_minutes = parse_ranged("CONFIRM_TOKEN_TTL_MINUTES", &v, 5, 24 * 60)? as u32;
        }

        if let Some(secret) = get("CONFIRM_TOKEN_SECRET") {
            cfg.confirm_token_secret = secret;
        }

        // An explicitly blank path turns persistence off.
        if let Some(path) = lookup("CONFIRM_STORE_PATH") {
            cfg.confirm_store_path = path.trim().to_string();
        }

        Ok(cfg)
    }

    /// Token lifetime as a duration.
    pub fn confirm_token_ttl(&self) -> Duration {
        Duration::from_secs(u64::from(self.confirm_token_ttl_minutes) * 60)
    }
}

fn parse_ranged(name: &'static str, value: &str, min: u64, max: u64) -> Result<u64, ConfigError> {
    let parsed: u64 = value.parse().map_err(|_| ConfigError::Invalid {
        name,
        reason: format!("{value:?} is not a non-negative integer"),
    })?;
    if parsed < min || parsed > max {
        return Err(ConfigError::Invalid {
            name,
            reason: format!("{parsed} is outside {min}..={max}"),
        });
    }
    Ok(parsed)
}
