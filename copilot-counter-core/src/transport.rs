//! Reachability probe for the target backend.
//!
//! Issues `GET <base>/v1/models` against the local proxy. A connection failure
//! is a normal "not reachable" status, not an error.

use std::time::Duration;

use serde::Deserialize;

use crate::config::AttributionConfig;
use crate::error::{Error, Result};

/// Default probe timeout.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendStatus {
    pub endpoint: String,
    pub reachable: bool,
    pub http_status: Option<u16>,
    /// Models listed by the backend, when the response parsed
    pub model_count: Option<usize>,
    pub error: Option<String>,
}

impl BackendStatus {
    pub fn is_healthy(&self) -> bool {
        self.reachable && self.http_status.is_some_and(|s| (200..300).contains(&s))
    }
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<serde_json::Value>,
}

pub struct BackendProbe {
    client: reqwest::Client,
    base_url: String,
}

impl BackendProbe {
    pub fn new(config: &AttributionConfig, timeout: Duration) -> Result<Self> {
        Self::with_base_url(config.target_base_url(), timeout)
    }

    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/v1/models", self.base_url)
    }

    pub async fn check(&self) -> BackendStatus {
        let endpoint = self.endpoint();
        let response = match self.client.get(&endpoint).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(endpoint = %endpoint, error = %e, "Backend not reachable");
                return BackendStatus {
                    endpoint,
                    reachable: false,
                    http_status: None,
                    model_count: None,
                    error: Some(e.to_string()),
                };
            }
        };

        let status = response.status();
        let model_count = if status.is_success() {
            match response.json::<ModelList>().await {
                Ok(list) => Some(list.data.len()),
                Err(e) => {
                    tracing::debug!(endpoint = %endpoint, error = %e, "Unparseable model list");
                    None
                }
            }
        } else {
            None
        };

        BackendStatus {
            endpoint,
            reachable: true,
            http_status: Some(status.as_u16()),
            model_count,
            error: None,
        }
    }
}

/// Synchronous wrapper for [`BackendProbe`]
///
/// Owns a current-thread runtime for use from blocking code.
pub struct SyncBackendProbe {
    inner: BackendProbe,
    runtime: tokio::runtime::Runtime,
}

impl SyncBackendProbe {
    pub fn new(config: &AttributionConfig, timeout: Duration) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Config(format!("failed to create runtime: {}", e)))?;

        Ok(Self {
            inner: BackendProbe::new(config, timeout)?,
            runtime,
        })
    }

    pub fn check(&self) -> BackendStatus {
        self.runtime.block_on(self.inner.check())
    }

    pub fn endpoint(&self) -> String {
        self.inner.endpoint()
    }
}
