//! Context provider abstraction.
//!
//! A provider is an external system that owns one side of the shared context
//! and exposes read/write access to its current document. The engine only
//! ever talks to this trait; concrete transports live in the submodules.

use crate::document::ContextDocument;
use crate::error::SyncError;
use crate::types::ContextSource;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

pub mod http;
pub mod memory;

pub use http::HttpProvider;
pub use memory::MemoryProvider;

/// One provider read: the document plus, when the provider reports it, the
/// time of its last local modification. The modification time is what gives
/// the last-write-wins strategy a real ordering; providers that cannot
/// report one leave it unset and the engine falls back to fetch time.
#[derive(Debug, Clone)]
pub struct ContextSnapshot {
    pub document: ContextDocument,
    pub modified_at: Option<DateTime<Utc>>,
}

/// Read/write access to one provider's context document.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    /// Which side of the sync this provider occupies.
    fn source(&self) -> ContextSource;

    /// Fetch the provider's current context document.
    async fn read_context(&self) -> Result<ContextSnapshot, SyncError>;

    /// Push an updated context document to the provider.
    async fn write_context(&self, document: &ContextDocument) -> Result<(), SyncError>;
}

/// Shared handle to a provider.
pub type ProviderHandle = Arc<dyn ContextProvider>;

/// Run a provider read with a bounded timeout; elapsing counts as
/// `ProviderUnavailable` for the named provider.
pub async fn read_with_timeout(
    provider: &dyn ContextProvider,
    timeout: Duration,
) -> Result<ContextSnapshot, SyncError> {
    match tokio::time::timeout(timeout, provider.read_context()).await {
        Ok(result) => result,
        Err(_) => Err(SyncError::ProviderUnavailable {
            provider: provider.source(),
            reason: format!("read timed out after {:?}", timeout),
        }),
    }
}

/// Run a provider write with a bounded timeout.
pub async fn write_with_timeout(
    provider: &dyn ContextProvider,
    document: &ContextDocument,
    timeout: Duration,
) -> Result<(), SyncError> {
    match tokio::time::timeout(timeout, provider.write_context(document)).await {
        Ok(result) => result,
        Err(_) => Err(SyncError::ProviderUnavailable {
            provider: provider.source(),
            reason: format!("write timed out after {:?}", timeout),
        }),
    }
}
