//! Persistence layer for the version store.

use crate::error::StorageError;
use crate::store::{validate_append, VersionStore};
use crate::types::{Checksum, ContextSource, VersionId};
use crate::version::ContextVersion;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// On-disk record. Content is stored as a JSON string and timestamps as
/// RFC 3339 text so the record stays bincode-friendly (serde_json::Value
/// cannot be deserialized from a non-self-describing format).
#[derive(Debug, Serialize, Deserialize)]
struct VersionRecord {
    id: [u8; 32],
    version_number: u64,
    content: String,
    source: ContextSource,
    timestamp: String,
    checksum: [u8; 32],
    parent_id: Option<[u8; 32]>,
}

impl VersionRecord {
    fn from_version(version: &ContextVersion) -> Result<Self, StorageError> {
        let content = serde_json::to_string(&version.content)
            .map_err(|e| StorageError::Serialization(format!("Failed to encode content: {}", e)))?;
        Ok(Self {
            id: version.id.0,
            version_number: version.version_number,
            content,
            source: version.source,
            timestamp: version.timestamp.to_rfc3339(),
            checksum: version.checksum.0,
            parent_id: version.parent_id.map(|p| p.0),
        })
    }

    fn into_version(self) -> Result<ContextVersion, StorageError> {
        let content = serde_json::from_str(&self.content)
            .map_err(|e| StorageError::Serialization(format!("Failed to decode content: {}", e)))?;
        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)
            .map_err(|e| StorageError::Serialization(format!("Failed to parse timestamp: {}", e)))?
            .with_timezone(&Utc);
        Ok(ContextVersion {
            id: VersionId(self.id),
            version_number: self.version_number,
            content,
            source: self.source,
            timestamp,
            checksum: Checksum(self.checksum),
            parent_id: self.parent_id.map(VersionId),
        })
    }
}

/// Sled-based implementation of VersionStore.
///
/// Primary records are keyed by `ver:` plus the raw 32-byte version id. A
/// secondary index `src:{source}:{version_number:020}` supports range scans
/// for "latest unified" without touching primary records.
pub struct SledVersionStore {
    db: sled::Db,
}

const LATEST_NUMBER_KEY: &[u8] = b"meta:latest_number";
const RECORD_PREFIX: &[u8] = b"ver:";

fn record_key(id: &VersionId) -> Vec<u8> {
    let mut key = Vec::with_capacity(RECORD_PREFIX.len() + 32);
    key.extend_from_slice(RECORD_PREFIX);
    key.extend_from_slice(id.as_bytes());
    key
}

fn index_key(source: ContextSource, version_number: u64) -> Vec<u8> {
    format!("src:{}:{:020}", source.as_str(), version_number).into_bytes()
}

fn index_prefix(source: ContextSource) -> Vec<u8> {
    format!("src:{}:", source.as_str()).into_bytes()
}

impl SledVersionStore {
    /// Open (or create) a version store at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to open sled database: {}", e),
            ))
        })?;
        Ok(Self { db })
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush().map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to flush database: {}", e),
            ))
        })?;
        Ok(())
    }

    fn read_version(&self, key: &[u8]) -> Result<Option<ContextVersion>, StorageError> {
        match self.db.get(key).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to get version record: {}", e),
            ))
        })? {
            Some(value) => {
                let record: VersionRecord = bincode::deserialize(&value).map_err(|e| {
                    StorageError::Serialization(format!(
                        "Failed to deserialize version record: {}",
                        e
                    ))
                })?;
                Ok(Some(record.into_version()?))
            }
            None => Ok(None),
        }
    }
}

impl VersionStore for SledVersionStore {
    fn append(&self, version: &ContextVersion) -> Result<(), StorageError> {
        if self
            .db
            .contains_key(record_key(&version.id))
            .map_err(|e| {
                StorageError::IoError(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("Failed to check version existence: {}", e),
                ))
            })?
        {
            return Err(StorageError::DuplicateVersion(version.id));
        }

        let parent = match &version.parent_id {
            Some(parent_id) => self.read_version(&record_key(parent_id))?,
            None => None,
        };
        validate_append(version, self.latest_version_number()?, parent.as_ref())?;

        let record = VersionRecord::from_version(version)?;
        let value = bincode::serialize(&record).map_err(|e| {
            StorageError::Serialization(format!("Failed to serialize version record: {}", e))
        })?;

        // Record, secondary index, and latest-number meta commit together.
        let mut batch = sled::Batch::default();
        batch.insert(record_key(&version.id), value);
        batch.insert(
            index_key(version.source, version.version_number),
            version.id.as_bytes().to_vec(),
        );
        batch.insert(
            LATEST_NUMBER_KEY.to_vec(),
            version.version_number.to_be_bytes().to_vec(),
        );
        self.db.apply_batch(batch).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to apply append batch: {}", e),
            ))
        })?;
        Ok(())
    }

    fn get(&self, id: &VersionId) -> Result<Option<ContextVersion>, StorageError> {
        self.read_version(&record_key(id))
    }

    fn latest_unified(&self) -> Result<Option<ContextVersion>, StorageError> {
        // Zero-padded version numbers make lexicographic order numeric, so
        // the last index entry under the prefix is the latest version.
        let prefix = index_prefix(ContextSource::Unified);
        let last = self.db.scan_prefix(&prefix).last();
        match last {
            Some(entry) => {
                let (_, id_bytes) = entry.map_err(|e| {
                    StorageError::IoError(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        format!("Failed to scan unified index: {}", e),
                    ))
                })?;
                let mut key = RECORD_PREFIX.to_vec();
                key.extend_from_slice(&id_bytes);
                self.read_version(&key)
            }
            None => Ok(None),
        }
    }

    fn latest_version_number(&self) -> Result<u64, StorageError> {
        match self.db.get(LATEST_NUMBER_KEY).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to read latest version number: {}", e),
            ))
        })? {
            Some(bytes) => {
                let mut buf = [0u8; 8];
                if bytes.len() != 8 {
                    return Err(StorageError::Serialization(
                        "Corrupt latest-number record".to_string(),
                    ));
                }
                buf.copy_from_slice(&bytes);
                Ok(u64::from_be_bytes(buf))
            }
            None => Ok(0),
        }
    }

    fn lineage(&self, id: &VersionId) -> Result<Vec<ContextVersion>, StorageError> {
        let mut chain = Vec::new();
        let mut cursor = Some(*id);
        while let Some(current) = cursor {
            let version = self
                .read_version(&record_key(&current))?
                .ok_or(StorageError::VersionNotFound(current))?;
            cursor = version.parent_id;
            chain.push(version);
        }
        Ok(chain)
    }

    fn len(&self) -> Result<usize, StorageError> {
        let mut count = 0;
        for item in self.db.scan_prefix(RECORD_PREFIX) {
            item.map_err(|e| {
                StorageError::IoError(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("Failed to iterate store: {}", e),
                ))
            })?;
            count += 1;
        }
        Ok(count)
    }
}
