//! HTTP transport for a context provider.
//!
//! Talks to a provider that exposes its context document as JSON at a single
//! endpoint: GET returns the current document (a `Last-Modified` header, if
//! present, becomes the snapshot's modification time), PUT replaces it.
//! Connection failures and timeouts map to `ProviderUnavailable`; a 4xx
//! response to a write maps to `ProviderWriteRejected` (the provider's own
//! validation turned the payload down).

use crate::document::ContextDocument;
use crate::error::SyncError;
use crate::provider::{ContextProvider, ContextSnapshot};
use crate::types::ContextSource;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header, Client, StatusCode};
use std::time::Duration;

pub struct HttpProvider {
    source: ContextSource,
    endpoint: String,
    client: Client,
}

impl HttpProvider {
    /// Build a provider client for the given context endpoint.
    ///
    /// The per-request timeout should match the engine's provider timeout so
    /// a hung provider is reported once, not twice.
    pub fn new(
        source: ContextSource,
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            source,
            endpoint: endpoint.into(),
            client,
        })
    }

    fn unavailable(&self, error: reqwest::Error) -> SyncError {
        SyncError::ProviderUnavailable {
            provider: self.source,
            reason: error.to_string(),
        }
    }
}

#[async_trait]
impl ContextProvider for HttpProvider {
    fn source(&self) -> ContextSource {
        self.source
    }

    async fn read_context(&self) -> Result<ContextSnapshot, SyncError> {
        let response = self
            .client
            .get(&self.endpoint)
            .send()
            .await
            .map_err(|e| self.unavailable(e))?;

        if !response.status().is_success() {
            return Err(SyncError::ProviderUnavailable {
                provider: self.source,
                reason: format!("read returned status {}", response.status()),
            });
        }

        // An unparseable Last-Modified header is treated as absent, not as
        // a read failure.
        let modified_at = response
            .headers()
            .get(header::LAST_MODIFIED)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| DateTime::parse_from_rfc2822(value).ok())
            .map(|value| value.with_timezone(&Utc));

        let document = response
            .json::<ContextDocument>()
            .await
            .map_err(|e| {
                SyncError::ContextFormat(format!("provider returned invalid JSON: {}", e))
            })?;
        Ok(ContextSnapshot {
            document,
            modified_at,
        })
    }

    async fn write_context(&self, document: &ContextDocument) -> Result<(), SyncError> {
        let response = self
            .client
            .put(&self.endpoint)
            .json(document)
            .send()
            .await
            .map_err(|e| self.unavailable(e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status.is_client_error() && status != StatusCode::REQUEST_TIMEOUT {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::ProviderWriteRejected {
                provider: self.source,
                reason: format!("status {}: {}", status, body),
            });
        }
        Err(SyncError::ProviderUnavailable {
            provider: self.source,
            reason: format!("write returned status {}", status),
        })
    }
}
