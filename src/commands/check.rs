//! Check command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use crate::fingerprint::{ContentFingerprint, FastFingerprint};
use crate::meta::{DocumentRecord, RecordStore};
use crate::models::Source;
use crate::store::SemanticIndex;
use serde::Serialize;
use std::path::Path;
use tracing::debug;

/// What is known about one file
#[derive(Debug, Clone, Serialize)]
pub struct CheckInfo {
    pub path: String,
    pub fingerprint: String,
    pub fast_fingerprint: String,
    pub document: Option<DocumentRecord>,
    /// Collections holding chunks of this document
    pub indexed_in: Vec<String>,
}

/// Fingerprint a file and look it up in the record store and every
/// source collection
pub async fn cmd_check(
    config: &Config,
    records: &dyn RecordStore,
    index: &dyn SemanticIndex,
    path: &Path,
) -> Result<CheckInfo> {
    if !path.is_file() {
        return Err(Error::InvalidPath(path.display().to_string()));
    }

    let bytes = tokio::fs::read(path).await?;
    let fingerprint = ContentFingerprint::compute(&bytes);
    let fast = FastFingerprint::compute(&bytes, config.content_store.fast_prefix_bytes);

    let document = records.find_document(&fingerprint).await?;

    let mut indexed_in = Vec::new();
    for source in Source::ALL {
        let collection = source.collection_name();
        match index.exists(&collection, &fingerprint).await {
            Ok(true) => indexed_in.push(collection),
            Ok(false) => {}
            Err(e) => debug!(collection = %collection, "Existence check failed: {}", e),
        }
    }

    Ok(CheckInfo {
        path: path.display().to_string(),
        fingerprint: fingerprint.to_string(),
        fast_fingerprint: fast.to_string(),
        document,
        indexed_in,
    })
}

/// Print check information to console
pub fn print_check(info: &CheckInfo) {
    println!("\n🔎 {}\n", info.path);
    println!("Fingerprint: {}", info.fingerprint);
    println!("Fast fingerprint: {}", info.fast_fingerprint);

    match &info.document {
        Some(doc) => {
            println!("\nRegistered as document {}", doc.id);
            println!("  Source: {}", doc.source);
            println!("  Report date: {}", doc.report_date);
            println!("  Filename: {}", doc.filename);
            println!("  Registered: {}", doc.created_at.to_rfc3339());
        }
        None => println!("\nNot registered"),
    }

    if info.indexed_in.is_empty() {
        println!("Not indexed");
    } else {
        println!("Indexed in: {}", info.indexed_in.join(", "));
    }
}
