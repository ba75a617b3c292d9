//! Coalesce: Versioned Context Synchronization
//!
//! Keeps two external context providers converged on a single shared
//! document: periodic cycles fetch both sides, diff them structurally
//! against the last unified version, resolve conflicts deterministically,
//! persist the merged result as an immutable version, and propagate it back.

pub mod cache;
pub mod config;
pub mod diff;
pub mod document;
pub mod engine;
pub mod error;
pub mod events;
pub mod logging;
pub mod provider;
pub mod resolve;
pub mod store;
pub mod types;
pub mod version;
