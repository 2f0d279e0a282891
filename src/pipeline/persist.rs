//! Routing of normalized task results to record-store handlers

use super::registry::{PersistKind, TaskId};
use super::with_timeout;
use crate::error::Result;
use crate::extract::is_empty_result;
use crate::meta::{chart_rows, inventory_rows, news_rows, price_rows, RecordStore, RowContext};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Summary of one persist stage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistReport {
    pub rows: u64,
    pub failures: Vec<(TaskId, String)>,
}

impl PersistReport {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// True when a result should reach the record store
pub fn is_persistable(result: &Value) -> bool {
    !is_empty_result(result) && result.get("error").is_none()
}

/// Persist one result through the handler fixed for its task
pub async fn persist_result(
    records: &dyn RecordStore,
    kind: PersistKind,
    ctx: &RowContext,
    result: &Value,
) -> Result<u64> {
    let fallback = ctx.document_date;
    match kind {
        PersistKind::Prices => records.insert_prices(ctx, &price_rows(result, fallback)).await,
        PersistKind::Inventory => {
            records
                .insert_inventories(ctx, &inventory_rows(result, fallback))
                .await
        }
        PersistKind::News => records.insert_news(ctx, &news_rows(result, fallback)).await,
        PersistKind::Charts => records.insert_charts(ctx, &chart_rows(result, fallback)).await,
    }
}

/// Persist every eligible result. A failing handler is recorded and the
/// remaining ones still run.
pub async fn persist_all(
    records: &dyn RecordStore,
    ctx: &RowContext,
    results: &[(TaskId, PersistKind, &Value)],
    timeout: Duration,
) -> PersistReport {
    let mut report = PersistReport::default();

    for (task, kind, result) in results {
        if !is_persistable(result) {
            debug!(task = %task, "Nothing to persist");
            continue;
        }

        let operation = format!("persist {}", task);
        match with_timeout(&operation, timeout, persist_result(records, *kind, ctx, result)).await {
            Ok(rows) => {
                debug!(task = %task, rows, "Persisted result");
                report.rows += rows;
            }
            Err(e) => {
                warn!(task = %task, "Persistence failed: {}", e);
                report.failures.push((*task, e.to_string()));
            }
        }
    }

    report
}
