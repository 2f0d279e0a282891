//! Content store: durable backup of original document binaries.
//!
//! Blobs live under a two-level tree keyed by the fast fingerprint:
//! `{dir}/{fast[0..2]}/{fast}/{content}.pdf`. The fast fingerprint only
//! narrows the lookup; presence is decided by the full content fingerprint,
//! so two documents sharing a prefix are both stored.

use crate::error::{Error, Result};
use crate::fingerprint::{ContentFingerprint, FastFingerprint};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// A binary about to be backed up
#[derive(Debug, Clone)]
pub struct StoredContent<'a> {
    pub filename: &'a str,
    pub bytes: &'a [u8],
    pub fingerprint: &'a ContentFingerprint,
    pub fast: FastFingerprint,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    Stored { path: PathBuf },
    AlreadyPresent { path: PathBuf },
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn put_if_absent(&self, content: &StoredContent<'_>) -> Result<PutOutcome>;
}

/// Content-addressed directory tree on the local filesystem
#[derive(Debug, Clone)]
pub struct FsContentStore {
    root: PathBuf,
}

impl FsContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket(&self, fast: &FastFingerprint) -> PathBuf {
        let fast = fast.as_str();
        let shard = fast.get(..2).unwrap_or(fast);
        self.root.join(shard).join(fast)
    }

    pub fn blob_path(&self, fast: &FastFingerprint, fingerprint: &ContentFingerprint) -> PathBuf {
        self.bucket(fast).join(format!("{}.pdf", fingerprint))
    }
}

#[async_trait]
impl ContentStore for FsContentStore {
    async fn put_if_absent(&self, content: &StoredContent<'_>) -> Result<PutOutcome> {
        let bucket = self.bucket(&content.fast);
        let path = self.blob_path(&content.fast, content.fingerprint);

        if fs::try_exists(&bucket).await? && fs::try_exists(&path).await? {
            debug!(fingerprint = %content.fingerprint, "Content already backed up");
            return Ok(PutOutcome::AlreadyPresent { path });
        }

        fs::create_dir_all(&bucket).await.map_err(|e| {
            Error::ContentStore(format!("Cannot create {}: {}", bucket.display(), e))
        })?;

        // Write beside the target and rename so readers never see a partial blob
        let partial = path.with_extension("partial");
        fs::write(&partial, content.bytes).await?;
        fs::rename(&partial, &path).await?;

        debug!(
            fingerprint = %content.fingerprint,
            filename = content.filename,
            path = %path.display(),
            "Backed up original binary"
        );
        Ok(PutOutcome::Stored { path })
    }
}
