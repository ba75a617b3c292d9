//! Error types for the context synchronization engine.

use crate::types::{ContextSource, VersionId};
use thiserror::Error;

/// Version store errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Version not found: {0}")]
    VersionNotFound(VersionId),

    #[error("Version already stored: {0}")]
    DuplicateVersion(VersionId),

    #[error("Version number {attempted} is not greater than latest {latest}")]
    VersionOrder { attempted: u64, latest: u64 },

    #[error("Parent version not found: {0}")]
    MissingParent(VersionId),

    #[error("Version checksum equals parent checksum; no-op cycles must not be stored")]
    EmptyDelta,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Engine- and API-level errors
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Malformed context document: {0}")]
    ContextFormat(String),

    #[error("Provider {provider} unavailable: {reason}")]
    ProviderUnavailable {
        provider: ContextSource,
        reason: String,
    },

    #[error("Provider {provider} rejected write: {reason}")]
    ProviderWriteRejected {
        provider: ContextSource,
        reason: String,
    },

    #[error("Cache tier {tier} unavailable: {reason}")]
    CacheUnavailable { tier: &'static str, reason: String },

    #[error("Persistence error: {0}")]
    Persistence(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<config::ConfigError> for SyncError {
    fn from(err: config::ConfigError) -> Self {
        SyncError::Config(err.to_string())
    }
}
