use super::{
    details_json, ChartRow, DocumentRecord, InventoryRow, NewDocument, NewsRow, PriceRow,
    RecordStore, Registration, RowContext, StoreStats, POSTGRES_SCHEMA,
};
use crate::error::{Error, Result};
use crate::fingerprint::ContentFingerprint;
use crate::models::{ProcessingEvent, TaskLog};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info};

/// PostgreSQL record store
#[derive(Clone)]
pub struct PostgresRecordStore {
    pool: PgPool,
}

impl PostgresRecordStore {
    pub async fn connect(url: &str) -> Result<Self> {
        debug!("Connecting to PostgreSQL record store");
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    async fn init_schema(&self) -> Result<()> {
        info!("Initializing PostgreSQL record schema");
        sqlx::raw_sql(POSTGRES_SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    async fn register_document(&self, doc: &NewDocument) -> Result<Registration> {
        let inserted: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO documents (filename, report_date, source, fingerprint, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (fingerprint) DO NOTHING
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
            sqlx::query_scalar("SELECT id FROM documents WHERE fingerprint = $1")
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
            "SELECT id, filename, report_date, source, fingerprint, created_at FROM documents WHERE fingerprint = $1",
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
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (document_id, price_type) DO NOTHING
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
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (document_id, inventory_type) DO NOTHING
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
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
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
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
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
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
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
            VALUES ($1, $2, $3, $4, $5, $6, $7)
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
        let (documents, prices, inventories, news, charts, processing_events, task_logs): (
            i64,
            i64,
            i64,
            i64,
            i64,
            i64,
            i64,
        ) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM documents),
                (SELECT COUNT(*) FROM prices),
                (SELECT COUNT(*) FROM inventories),
                (SELECT COUNT(*) FROM news),
                (SELECT COUNT(*) FROM charts),
                (SELECT COUNT(*) FROM processing_events),
                (SELECT COUNT(*) FROM task_logs)
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(StoreStats {
            documents,
            prices,
            inventories,
            news,
            charts,
            processing_events,
            task_logs,
        })
    }
}
