//! HTTP probe implementation.

use std::time::{Duration, Instant};

use super::ProbeError;

/// Response of a single HTTP attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HttpAttempt {
    pub status_code: u16,
    /// Time until response headers arrived.
    pub latency: Duration,
}

/// Issue one GET against `address`, bounded by `timeout`.
///
/// Any received response is `Ok`, whatever its status code.
pub async fn run_http_attempt(
    client: &reqwest::Client,
    address: &str,
    timeout: Duration,
) -> Result<HttpAttempt, ProbeError> {
    let url = normalize_url(address);

    let start = Instant::now();

    let response = client
        .get(&url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                ProbeError::Timeout(timeout)
            } else if e.is_builder() {
                ProbeError::Config(format!("invalid url {url:?}: {e}"))
            } else {
                ProbeError::Network(e.to_string())
            }
        })?;

    Ok(HttpAttempt {
        status_code: response.status().as_u16(),
        latency: start.elapsed(),
    })
}

fn normalize_url(address: &str) -> String {
    let address = address.trim();
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    }
}
