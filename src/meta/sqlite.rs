use super::{
    details_json, ChartRow, DocumentRecord, InventoryRow, NewDocument, NewsRow, PriceRow,
    RecordStore, Registration, RowContext, StoreStats, SQLITE_SCHEMA,
};
use crate::error::{Error, Result};
use crate::fingerprint::ContentFingerprint;
use crate::models::{ProcessingEvent, TaskLog};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// SQLite record store
#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    /// Open (creating if needed) the database file at `db_path`
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        debug!("Connecting to SQLite database at {:?}", db_path);
        let options = SqliteConnectOptions::new().filename(db_path);
        Self::with_options(options).await
    }

    /// Connect from a `sqlite://` URL
    pub async fn connect(url: &str) -> Result<Self> {
        debug!("Connecting to SQLite database at {}", url);
        let options = SqliteConnectOptions::from_str(url)?;
        Self::with_options(options).await
    }

    async fn with_options(options: SqliteConnectOptions) -> Result<Self> {
        let options = options
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn init_schema(&self) -> Result<()> {
        info!("Initializing SQLite record schema");
        sqlx::raw_sql(SQLITE_SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    async fn register_document(&self, doc: &NewDocument) -> Result<Registration> {
        let inserted: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO documents (filename, report_date, source, fingerprint, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(fingerprint) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&doc.filename)
        .bind(doc.date)
        .bind(doc.source.label())
        .bind(doc.fingerprint.as_str())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(id) = inserted {
            return Ok(Registration::Registered { id });
        }

        let existing: Option<i64> =
            sqlx::query_scalar("SELECT id FROM documents WHERE fingerprint = ?")
                .bind(doc.fingerprint.as_str())
                .fetch_optional(&self.pool)
                .await?;

        existing
            .map(|existing_id| Registration::Duplicate { existing_id })
            .ok_or_else(|| {
                Error::Other(format!(
                    "Fingerprint {} conflicted but no document row exists",
                    doc.fingerprint
                ))
            })
    }

    async fn find_document(
        &self,
        fingerprint: &ContentFingerprint,
    ) -> Result<Option<DocumentRecord>> {
        let doc = sqlx::query_as::<_, DocumentRecord>(
            "SELECT id, filename, report_date, source, fingerprint, created_at FROM documents WHERE fingerprint = ?",
        )
        .bind(fingerprint.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(doc)
    }

    async fn insert_prices(&self, ctx: &RowContext, rows: &[PriceRow]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for row in rows {
            inserted += sqlx::query(
                r#"
                INSERT INTO prices (document_id, source, price_type, value, price_date, currency, unit)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(ctx.document_id)
            .bind(&ctx.source)
            .bind(&row.price_type)
            .bind(row.value)
            .bind(row.date)
            .bind(&row.currency)
            .bind(&row.unit)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }
        tx.commit().await?;
        Ok(inserted)
    }

    async fn insert_inventories(&self, ctx: &RowContext, rows: &[InventoryRow]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for row in rows {
            inserted += sqlx::query(
                r#"
                INSERT INTO inventories (document_id, source, inventory_type, value, data_date)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(ctx.document_id)
            .bind(&ctx.source)
            .bind(&row.inventory_type)
            .bind(row.value)
            .bind(row.date)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }
        tx.commit().await?;
        Ok(inserted)
    }

    async fn insert_news(&self, ctx: &RowContext, rows: &[NewsRow]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for row in rows {
            inserted += sqlx::query(
                r#"
                INSERT INTO news (document_id, source, title, summary, sentiment, news_date, category, tags_json)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(ctx.document_id)
            .bind(&ctx.source)
            .bind(&row.title)
            .bind(&row.summary)
            .bind(&row.sentiment)
            .bind(row.date)
            .bind(&row.category)
            .bind(&row.tags_json)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }
        tx.commit().await?;
        Ok(inserted)
    }

    async fn insert_charts(&self, ctx: &RowContext, rows: &[ChartRow]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for row in rows {
            inserted += sqlx::query(
                r#"
                INSERT INTO charts (document_id, source, title, page, mime_type, image, description, chart_date)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(ctx.document_id)
            .bind(&ctx.source)
            .bind(&row.title)
            .bind(row.page)
            .bind(&row.mime_type)
            .bind(&row.image)
            .bind(&row.description)
            .bind(row.date)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }
        tx.commit().await?;
        Ok(inserted)
    }

    async fn log_stage_event(&self, event: &ProcessingEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO processing_events
                (document_id, fingerprint, stage, status, duration_ms, details_json, error_message, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.document_id)
        .bind(&event.fingerprint)
        .bind(event.stage.as_str())
        .bind(event.status.as_str())
        .bind(event.duration_ms)
        .bind(details_json(event))
        .bind(&event.error_message)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn log_task_event(&self, log: &TaskLog) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO task_logs
                (document_id, task, status, started_at, finished_at, items_found, error_message)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(log.document_id)
        .bind(&log.task)
        .bind(log.status.as_str())
        .bind(log.started_at)
        .bind(log.finished_at)
        .bind(log.items_found)
        .bind(&log.error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        async fn count(pool: &SqlitePool, table: &str) -> Result<i64> {
            let n: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
                .fetch_one(pool)
                .await?;
            Ok(n)
        }

        Ok(StoreStats {
            documents: count(&self.pool, "documents").await?,
            prices: count(&self.pool, "prices").await?,
            inventories: count(&self.pool, "inventories").await?,
            news: count(&self.pool, "news").await?,
            charts: count(&self.pool, "charts").await?,
            processing_events: count(&self.pool, "processing_events").await?,
            task_logs: count(&self.pool, "task_logs").await?,
        })
    }
}
