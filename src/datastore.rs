//! Client for the REST datastore that owns the target list.

use crate::config::ServerConfig;
use crate::store::Target;

use std::time::Duration;
use thiserror::Error;

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Datastore error types.
#[derive(Error, Debug)]
pub enum DatastoreError {
    #[error("datastore connection error: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("datastore returned HTTP {0}")]
    Status(u16),
    #[error("invalid datastore response: {0}")]
    Decode(#[source] reqwest::Error),
}

#[derive(Clone)]
pub struct DatastoreClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl DatastoreClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn from_config(cfg: &ServerConfig) -> Self {
        Self::new(&cfg.datastore_url, &cfg.datastore_key)
    }

    /// Fetch every registered target.
    pub async fn fetch_targets(&self) -> Result<Vec<Target>, DatastoreError> {
        let url = format!("{}/rest/v1/projects?select=*", self.base_url);

        let response = self
            .client
            .get(&url)
            .timeout(FETCH_TIMEOUT)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(DatastoreError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(DatastoreError::Status(status.as_u16()));
        }

        response.json().await.map_err(DatastoreError::Decode)
    }
}
