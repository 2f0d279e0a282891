//! Task execution for one document
//!
//! Every task runs in isolation: its failure is recorded in its own
//! `TaskRun` and never reaches sibling tasks.

use super::registry::{TaskDefinition, TaskId};
use super::with_timeout;
use crate::error::{Error, Result};
use crate::extract::{count_items, is_empty_result, Capability, ExtractionInput, ExtractionService};
use crate::models::{Status, TaskLog};
use crate::reader::DocumentReader;
use crate::store::SemanticIndex;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Separator placed between retrieved chunks in an extraction context
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Per-document inputs shared by every task
pub struct DispatchContext<'a> {
    pub reader: &'a dyn DocumentReader,
    pub index: &'a dyn SemanticIndex,
    pub extractor: &'a dyn ExtractionService,
    pub collection: &'a str,
    pub bytes: &'a [u8],
    pub top_k: usize,
    pub timeout: Duration,
}

/// What one task produced
#[derive(Debug, Clone)]
pub struct TaskRun {
    pub task: TaskId,
    pub status: Status,
    /// Normalized result; `None` for failures and for tasks with no data
    pub result: Option<Value>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub error: Option<String>,
}

impl TaskRun {
    pub fn items_found(&self) -> i64 {
        self.result.as_ref().map(count_items).unwrap_or(0)
    }

    pub fn to_log(&self, document_id: i64) -> TaskLog {
        TaskLog {
            document_id,
            task: self.task.to_string(),
            status: self.status,
            started_at: self.started_at,
            finished_at: self.finished_at,
            items_found: self.items_found(),
            error_message: self.error.clone(),
        }
    }
}

/// Deduplicate texts, keeping the first occurrence of each
pub fn union_first_seen<I>(texts: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    texts
        .into_iter()
        .filter(|text| seen.insert(text.clone()))
        .collect()
}

/// Run `tasks` and return their runs in the order given.
///
/// With `parallel` the tasks are polled concurrently; the returned order is
/// still the input order.
pub async fn run_tasks(
    ctx: &DispatchContext<'_>,
    tasks: &[&TaskDefinition],
    parallel: bool,
) -> Vec<TaskRun> {
    if parallel {
        join_all(tasks.iter().map(|task| run_task(ctx, task))).await
    } else {
        let mut runs = Vec::with_capacity(tasks.len());
        for task in tasks {
            runs.push(run_task(ctx, task).await);
        }
        runs
    }
}

/// Run a single task. Never fails; errors land in the returned run.
pub async fn run_task(ctx: &DispatchContext<'_>, task: &TaskDefinition) -> TaskRun {
    let started_at = Utc::now();
    debug!(task = %task.id, "Running task");

    let (status, result, error) = match execute(ctx, task).await {
        Ok(Executed {
            output: Some(output),
            note,
        }) if !is_empty_result(&output) => (Status::Success, Some(output), note),
        Ok(Executed { note, .. }) => {
            info!(task = %task.id, "No relevant content found");
            (Status::SuccessNoData, None, note)
        }
        Err(e) => {
            warn!(task = %task.id, "Task failed: {}", e);
            (Status::Error, None, Some(e.to_string()))
        }
    };

    TaskRun {
        task: task.id,
        status,
        result,
        started_at,
        finished_at: Utc::now(),
        error,
    }
}

/// Normalized output of one task, plus a note for the task log when some
/// retrieval queries failed
struct Executed {
    output: Option<Value>,
    note: Option<String>,
}

async fn execute(ctx: &DispatchContext<'_>, task: &TaskDefinition) -> Result<Executed> {
    let (input, note) = if task.needs_document {
        (document_input(ctx, task.capability).await?, None)
    } else {
        let retrieved = gather_context(ctx, task).await?;
        let note = (!retrieved.failures.is_empty())
            .then(|| format!("Queries failed: {}", retrieved.failures.join("; ")));
        (retrieved.context.map(ExtractionInput::Text), note)
    };

    let Some(input) = input else {
        return Ok(Executed { output: None, note });
    };

    let output = with_timeout(
        &format!("extract {}", task.capability),
        ctx.timeout,
        ctx.extractor.extract(task.capability, input),
    )
    .await?;

    Ok(Executed {
        output: Some(output.normalize()),
        note,
    })
}

/// Raw-document input for a capability; `None` when the document has nothing
/// the capability can read
async fn document_input(
    ctx: &DispatchContext<'_>,
    capability: Capability,
) -> Result<Option<ExtractionInput>> {
    match capability {
        Capability::ChartAnalysis => {
            let images =
                with_timeout("read images", ctx.timeout, ctx.reader.read_images(ctx.bytes)).await?;
            debug!("Found {} embedded images", images.len());
            Ok((!images.is_empty()).then_some(ExtractionInput::Images(images)))
        }
        _ => {
            let chunks = with_timeout(
                "read document",
                ctx.timeout,
                ctx.reader.read_all_chunks(ctx.bytes),
            )
            .await?;
            Ok(Some(ExtractionInput::Text(chunks.join(CONTEXT_SEPARATOR))))
        }
    }
}

/// Retrieval result for one task
struct Retrieved {
    /// Distinct chunk texts joined in first-seen order; `None` when nothing
    /// was retrieved
    context: Option<String>,
    /// `"query: error"` for every failed search
    failures: Vec<String>,
}

/// Search every query and join the distinct chunk texts.
///
/// A failing query is skipped while others still contribute. When nothing
/// was retrieved and at least one query failed, the task fails with every
/// query error.
async fn gather_context(ctx: &DispatchContext<'_>, task: &TaskDefinition) -> Result<Retrieved> {
    let mut retrieved = Vec::new();
    let mut failures = Vec::new();

    for query in task.queries {
        let search = ctx.index.search(ctx.collection, query, ctx.top_k);
        match with_timeout("search", ctx.timeout, search).await {
            Ok(hits) => {
                debug!(task = %task.id, query, "Retrieved {} chunks", hits.len());
                retrieved.extend(hits.into_iter().map(|hit| hit.content));
            }
            Err(e) => {
                warn!(task = %task.id, query, "Search failed: {}", e);
                failures.push(format!("{}: {}", query, e));
            }
        }
    }

    let chunks = union_first_seen(retrieved);
    if chunks.is_empty() && !failures.is_empty() {
        return Err(Error::Retrieval(failures.join("; ")));
    }

    Ok(Retrieved {
        context: (!chunks.is_empty()).then(|| chunks.join(CONTEXT_SEPARATOR)),
        failures,
    })
}
