//! Relational record storage
//!
//! This module handles everything the pipeline persists outside the
//! semantic index:
//! - Documents (one row per content fingerprint)
//! - Extracted prices, inventories, news and charts
//! - The processing-event and task-log audit trail
//!
//! Two interchangeable sqlx backends implement `RecordStore`; all SQL lives
//! in this module.

mod postgres;
mod rows;
mod schema;
mod sqlite;

pub use postgres::PostgresRecordStore;
pub use rows::*;
pub use schema::*;
pub use sqlite::SqliteRecordStore;

use crate::config::{Config, RecordBackend};
use crate::error::Result;
use crate::fingerprint::ContentFingerprint;
use crate::models::{ProcessingEvent, Source, TaskLog};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::FromRow;
use std::sync::Arc;
use tracing::info;

/// A document about to be registered
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub filename: String,
    pub date: NaiveDate,
    pub source: Source,
    pub fingerprint: ContentFingerprint,
}

/// Outcome of an idempotent registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Registered { id: i64 },
    Duplicate { existing_id: i64 },
}

/// A stored document
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DocumentRecord {
    pub id: i64,
    pub filename: String,
    pub report_date: NaiveDate,
    pub source: String,
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
}

/// Row counts per table
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub documents: i64,
    pub prices: i64,
    pub inventories: i64,
    pub news: i64,
    pub charts: i64,
    pub processing_events: i64,
    pub task_logs: i64,
}

/// Durable relational storage for documents, extracted entities and audit logs
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create tables if they do not exist
    async fn init_schema(&self) -> Result<()>;

    /// Insert the document unless its fingerprint is already known.
    /// Must be atomic under concurrent callers.
    async fn register_document(&self, doc: &NewDocument) -> Result<Registration>;

    async fn find_document(&self, fingerprint: &ContentFingerprint)
        -> Result<Option<DocumentRecord>>;

    async fn insert_prices(&self, ctx: &RowContext, rows: &[PriceRow]) -> Result<u64>;

    async fn insert_inventories(&self, ctx: &RowContext, rows: &[InventoryRow]) -> Result<u64>;

    async fn insert_news(&self, ctx: &RowContext, rows: &[NewsRow]) -> Result<u64>;

    async fn insert_charts(&self, ctx: &RowContext, rows: &[ChartRow]) -> Result<u64>;

    async fn log_stage_event(&self, event: &ProcessingEvent) -> Result<()>;

    async fn log_task_event(&self, log: &TaskLog) -> Result<()>;

    async fn stats(&self) -> Result<StoreStats>;
}

/// Open the backend selected by `record_store.backend`
pub async fn open_record_store(config: &Config) -> Result<Arc<dyn RecordStore>> {
    info!("Opening {} record store", config.record_store.backend);
    match config.record_store.backend {
        RecordBackend::Sqlite => {
            let store = match &config.record_store.url {
                Some(url) => SqliteRecordStore::connect(url).await?,
                None => SqliteRecordStore::open(&config.paths.db_file).await?,
            };
            Ok(Arc::new(store))
        }
        RecordBackend::Postgres => {
            let store = PostgresRecordStore::connect(&config.record_store_url()?).await?;
            Ok(Arc::new(store))
        }
    }
}

fn details_json(event: &ProcessingEvent) -> Option<String> {
    event.details.as_ref().map(|d| d.to_string())
}
