//! Probe module for uptime monitoring.
//!
//! A probe is a classified HTTP GET against one target, retried a bounded
//! number of times before the target is declared DOWN.

mod http;

pub use http::*;

use crate::config::ServerConfig;
use crate::store::{CheckRecord, HealthStatus, Target};

use std::time::Duration;
use thiserror::Error;

/// Probe error types.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Retry and classification parameters shared by every probe of a sweep.
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub timeout: Duration,
    pub retries: u32,
    pub retry_delay: Duration,
    pub degraded_ms: u64,
}

impl ProbeSettings {
    pub fn from_config(cfg: &ServerConfig) -> Self {
        Self {
            timeout: cfg.ping_timeout,
            retries: cfg.ping_retries,
            retry_delay: cfg.ping_retry_delay,
            degraded_ms: cfg.degraded_ms,
        }
    }
}

/// Classified result of a probe.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub status: HealthStatus,
    pub latency_ms: u64,
    pub http_status_code: Option<u16>,
    pub error: Option<String>,
}

impl ProbeOutcome {
    /// Classify the final attempt of a probe.
    pub fn classify(last: Result<HttpAttempt, ProbeError>, degraded_ms: u64) -> Self {
        match last {
            Err(e) => Self {
                status: HealthStatus::Down,
                latency_ms: 0,
                http_status_code: None,
                error: Some(e.to_string()),
            },
            Ok(attempt) if attempt.status_code >= 400 => Self {
                status: HealthStatus::Down,
                latency_ms: 0,
                http_status_code: Some(attempt.status_code),
                error: Some(format!("unexpected status {}", attempt.status_code)),
            },
            Ok(attempt) => {
                let latency_ms = attempt.latency.as_millis() as u64;
                let status = if latency_ms >= degraded_ms {
                    HealthStatus::Degraded
                } else {
                    HealthStatus::Healthy
                };
                Self {
                    status,
                    latency_ms,
                    http_status_code: Some(attempt.status_code),
                    error: None,
                }
            }
        }
    }

    pub fn into_record(self, timestamp_ms: i64) -> CheckRecord {
        CheckRecord {
            timestamp_ms,
            status: self.status,
            latency_ms: self.latency_ms,
            http_status_code: self.http_status_code,
            error: self.error,
        }
    }
}

/// Probe a target, retrying failed attempts.
///
/// An attempt fails on a transport error or a status code of 400 or above.
/// Only the last attempt made is classified.
pub async fn probe_target(
    client: &reqwest::Client,
    target: &Target,
    settings: &ProbeSettings,
) -> ProbeOutcome {
    let attempts = settings.retries.max(1);
    let mut attempt = 1;

    loop {
        let result = run_http_attempt(client, &target.url, settings.timeout).await;

        match &result {
            Ok(a) => tracing::debug!(
                "Probe {} attempt {}/{}: HTTP {} in {:?}",
                target.name, attempt, attempts, a.status_code, a.latency
            ),
            Err(e) => tracing::debug!(
                "Probe {} attempt {}/{} failed: {}",
                target.name, attempt, attempts, e
            ),
        }

        let succeeded = matches!(&result, Ok(a) if a.status_code < 400);
        if succeeded || attempt >= attempts {
            return ProbeOutcome::classify(result, settings.degraded_ms);
        }

        if !settings.retry_delay.is_zero() {
            tokio::time::sleep(settings.retry_delay).await;
        }
        attempt += 1;
    }
}
