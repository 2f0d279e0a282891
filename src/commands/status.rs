//! Status command implementation

use crate::config::Config;
use crate::error::Result;
use crate::meta::{RecordStore, StoreStats};
use crate::models::Source;
use crate::store::{CollectionInfo, QdrantIndex};
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize)]
pub struct CollectionStatus {
    pub name: String,
    pub info: Option<CollectionInfo>,
}

/// Status information
#[derive(Debug, Clone, Serialize)]
pub struct StatusInfo {
    pub config_path: String,
    pub record_backend: String,
    pub qdrant_url: String,
    pub qdrant_connected: bool,
    pub qdrant_version: Option<String>,
    pub embedding_model: String,
    pub extraction_model: String,
    pub collections: Vec<CollectionStatus>,
    pub records: StoreStats,
}

/// Get system status
pub async fn cmd_status(
    config: &Config,
    records: &dyn RecordStore,
    index: &QdrantIndex,
) -> Result<StatusInfo> {
    info!("Getting status");

    let stats = records.stats().await?;

    let qdrant_version = match index.health_check().await {
        Ok(version) => Some(version),
        Err(e) => {
            debug!("Qdrant connection error: {:?}", e);
            None
        }
    };

    let mut collections = Vec::new();
    if qdrant_version.is_some() {
        for source in Source::ALL {
            let name = source.collection_name();
            let info = match index.get_collection_info(&name).await {
                Ok(info) => info,
                Err(e) => {
                    debug!(collection = %name, "Qdrant stats error: {:?}", e);
                    None
                }
            };
            collections.push(CollectionStatus { name, info });
        }
    }

    Ok(StatusInfo {
        config_path: config.paths.config_file.display().to_string(),
        record_backend: config.record_store.backend.to_string(),
        qdrant_url: config.qdrant_url.clone(),
        qdrant_connected: qdrant_version.is_some(),
        qdrant_version,
        embedding_model: config.embedding.model.clone(),
        extraction_model: config.extraction.model.clone(),
        collections,
        records: stats,
    })
}

/// Print status to console
pub fn print_status(status: &StatusInfo) {
    println!("\n📊 report-ingest Status\n");
    println!("Configuration: {}", status.config_path);
    println!("Record store: {}", status.record_backend);
    println!("\nQdrant:");
    println!("  URL: {}", status.qdrant_url);

    match &status.qdrant_version {
        Some(version) => println!("  Status: ✓ Connected (v{})", version),
        None => println!("  Status: ✗ Not connected"),
    }
    for collection in &status.collections {
        match &collection.info {
            Some(info) => println!(
                "  {}: {} points ({})",
                collection.name, info.points_count, info.status
            ),
            None => println!("  {}: not created", collection.name),
        }
    }

    println!("\nEmbedding Model: {}", status.embedding_model);
    println!("Extraction Model: {}", status.extraction_model);

    let r = &status.records;
    println!("\nRecords:");
    println!("  Documents: {}", r.documents);
    println!("  Prices: {}", r.prices);
    println!("  Inventories: {}", r.inventories);
    println!("  News: {}", r.news);
    println!("  Charts: {}", r.charts);
    println!("  Processing events: {}", r.processing_events);
    println!("  Task logs: {}", r.task_logs);
}
