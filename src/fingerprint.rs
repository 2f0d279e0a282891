//! Document fingerprints.
//!
//! Two digests exist and are never interchangeable:
//! - [`ContentFingerprint`] covers the whole binary and is the identity used
//!   by the record store, the semantic index payloads and chunk ids.
//! - [`FastFingerprint`] covers only a prefix and names content-store blobs.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// blake3 digest of the entire document binary, lowercase hex
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentFingerprint(String);

impl ContentFingerprint {
    pub fn compute(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes).to_hex().to_string())
    }

    /// Wrap a digest that was computed elsewhere (e.g. read back from a store)
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Deterministic point id for the chunk at `index`
    pub fn chunk_id(&self, index: usize) -> Uuid {
        Uuid::new_v5(
            &Uuid::NAMESPACE_DNS,
            format!("{}-{}", self.0, index).as_bytes(),
        )
    }
}

impl fmt::Display for ContentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// blake3 digest of the first `prefix_len` bytes, lowercase hex
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FastFingerprint(String);

impl FastFingerprint {
    pub fn compute(bytes: &[u8], prefix_len: usize) -> Self {
        let end = prefix_len.min(bytes.len());
        Self(blake3::hash(&bytes[..end]).to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FastFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
