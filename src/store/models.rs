//! Monitoring model types.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// A monitoring target as served by the datastore.
///
/// A row with a missing or null `name` or `url` still decodes; an empty URL
/// simply probes as DOWN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub url: String,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Classified health of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Down,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "HEALTHY",
            HealthStatus::Degraded => "DEGRADED",
            HealthStatus::Down => "DOWN",
        }
    }

    /// Incident message for a transition into this status.
    pub fn transition_message(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "Service recovered",
            HealthStatus::Degraded => "Service is DEGRADED",
            HealthStatus::Down => "Service went DOWN",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single retained probe result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckRecord {
    /// Capture time in unix milliseconds
    #[serde(rename = "ts")]
    pub timestamp_ms: i64,
    pub status: HealthStatus,
    /// Latency in milliseconds, 0 when DOWN
    #[serde(rename = "latency")]
    pub latency_ms: u64,
    #[serde(rename = "code", default, skip_serializing_if = "Option::is_none")]
    pub http_status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A logged transition between classified statuses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    #[serde(rename = "ts")]
    pub timestamp_ms: i64,
    #[serde(rename = "projectId")]
    pub target_id: String,
    #[serde(rename = "projectName")]
    pub target_name: String,
    pub status: HealthStatus,
    pub message: String,
}

/// Per-target entry of a status sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetStatus {
    pub id: String,
    pub name: String,
    pub url: String,
    pub status: HealthStatus,
    /// Latency in milliseconds, 0 when DOWN
    pub latency: u64,
}
