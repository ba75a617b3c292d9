//! Core identifier types shared across the synchronization engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 32-byte BLAKE3 digest of a canonicalized context document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum(pub [u8; 32]);

impl Checksum {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Opaque identifier for a stored context version.
///
/// Derived deterministically from the version's lineage position and content
/// checksum, so the same merge outcome always produces the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionId(pub [u8; 32]);

impl VersionId {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Actor that produced a context document or version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextSource {
    ProviderA,
    ProviderB,
    Unified,
}

impl ContextSource {
    /// Stable string tag used in index keys and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextSource::ProviderA => "provider_a",
            ContextSource::ProviderB => "provider_b",
            ContextSource::Unified => "unified",
        }
    }
}

impl fmt::Display for ContextSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
