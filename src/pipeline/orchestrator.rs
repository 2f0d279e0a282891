//! Stage sequencing for one document

use super::dispatch::{run_tasks, DispatchContext, TaskRun};
use super::outcome::ProcessingOutcome;
use super::persist::persist_all;
use super::registry::{TaskDefinition, TaskId, TaskRegistry};
use super::with_timeout;
use crate::config::Config;
use crate::content::{ContentStore, PutOutcome, StoredContent};
use crate::error::Result;
use crate::extract::{is_empty_result, ExtractionService};
use crate::fingerprint::{ContentFingerprint, FastFingerprint};
use crate::meta::{NewDocument, RecordStore, Registration, RowContext};
use crate::models::{Classification, ProcessingEvent, Source, Stage, Status};
use crate::reader::DocumentReader;
use crate::store::{ChunkPayload, IndexedChunk, SemanticIndex};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// A submitted document binary and its identity
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub fingerprint: ContentFingerprint,
}

impl SourceDocument {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        let fingerprint = ContentFingerprint::compute(&bytes);
        Self {
            filename: filename.into(),
            bytes,
            fingerprint,
        }
    }
}

/// Capabilities the orchestrator drives, injected at construction
#[derive(Clone)]
pub struct Collaborators {
    pub reader: Arc<dyn DocumentReader>,
    pub index: Arc<dyn SemanticIndex>,
    pub extractor: Arc<dyn ExtractionService>,
    pub records: Arc<dyn RecordStore>,
    /// Backup is skipped when absent
    pub content: Option<Arc<dyn ContentStore>>,
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub search_top_k: usize,
    pub capability_timeout: Duration,
    pub parallel_tasks: bool,
    pub fast_prefix_bytes: usize,
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            search_top_k: config.pipeline.search_top_k,
            capability_timeout: config.pipeline.capability_timeout(),
            parallel_tasks: config.pipeline.parallel_tasks,
            fast_prefix_bytes: config.content_store.fast_prefix_bytes,
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            search_top_k: 5,
            capability_timeout: Duration::from_secs(180),
            parallel_tasks: false,
            fast_prefix_bytes: 4096,
        }
    }
}

/// Sequences classify, register, backup, index, dispatch and persist.
/// Holds no state between documents.
pub struct Orchestrator {
    collab: Collaborators,
    registry: TaskRegistry,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(collab: Collaborators, registry: TaskRegistry, settings: OrchestratorSettings) -> Self {
        Self {
            collab,
            registry,
            settings,
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Process one document. Infallible: fatal stage errors become outcome
    /// variants.
    pub async fn process(&self, doc: &SourceDocument) -> ProcessingOutcome {
        let fp = doc.fingerprint.as_str();
        info!(fingerprint = fp, filename = %doc.filename, "Processing document");

        // Classify
        let started = Instant::now();
        let classification = match self.classify(doc).await {
            Ok(c) => c,
            Err(e) => {
                error!(fingerprint = fp, stage = "classify", "Classification failed: {}", e);
                self.record_event(
                    ProcessingEvent::new(Stage::Classify, Status::Error, fp, started)
                        .with_error(e.to_string()),
                )
                .await;
                return ProcessingOutcome::ClassificationError {
                    detail: e.to_string(),
                };
            }
        };
        info!(
            fingerprint = fp,
            source = %classification.source,
            date = %classification.date,
            "Classified document"
        );
        let classify_event = ProcessingEvent::new(Stage::Classify, Status::Success, fp, started)
            .with_details(json!({
                "source": classification.source,
                "date": classification.date,
            }));

        // Register
        let started = Instant::now();
        let new_doc = NewDocument {
            filename: doc.filename.clone(),
            date: classification.date,
            source: classification.source,
            fingerprint: doc.fingerprint.clone(),
        };
        let registration = with_timeout(
            "register document",
            self.settings.capability_timeout,
            self.collab.records.register_document(&new_doc),
        )
        .await;

        let document_id = match registration {
            Ok(Registration::Registered { id }) => id,
            Ok(Registration::Duplicate { existing_id }) => {
                info!(fingerprint = fp, existing_id, "Duplicate document, skipping");
                self.record_event(
                    ProcessingEvent::new(Stage::Register, Status::Skipped, fp, started)
                        .with_document(existing_id)
                        .with_details(json!({ "reason": "duplicate" })),
                )
                .await;
                return ProcessingOutcome::Duplicate {
                    document_id: existing_id,
                };
            }
            Err(e) => {
                error!(fingerprint = fp, stage = "register", "Registration failed: {}", e);
                self.record_event(
                    ProcessingEvent::new(Stage::Register, Status::Error, fp, started)
                        .with_error(e.to_string()),
                )
                .await;
                return ProcessingOutcome::RegistrationError {
                    detail: e.to_string(),
                };
            }
        };
        self.record_event(classify_event.with_document(document_id))
            .await;
        self.record_event(
            ProcessingEvent::new(Stage::Register, Status::Success, fp, started)
                .with_document(document_id),
        )
        .await;

        // Backup
        self.backup(doc, document_id).await;

        // Index
        let started = Instant::now();
        let collection = classification.source.collection_name();
        match self
            .index(doc, document_id, &classification, &collection)
            .await
        {
            Ok(chunks) => {
                info!(fingerprint = fp, collection = %collection, chunks, "Indexed document");
                self.record_event(
                    ProcessingEvent::new(Stage::Index, Status::Success, fp, started)
                        .with_document(document_id)
                        .with_details(json!({ "chunks": chunks, "collection": collection })),
                )
                .await;
            }
            Err(e) => {
                error!(fingerprint = fp, stage = "index", "Indexing failed: {}", e);
                self.record_event(
                    ProcessingEvent::new(Stage::Index, Status::Error, fp, started)
                        .with_document(document_id)
                        .with_error(e.to_string()),
                )
                .await;
                return ProcessingOutcome::IndexingError {
                    detail: e.to_string(),
                };
            }
        }

        if classification.source == Source::Other {
            info!(fingerprint = fp, "Source is Other, no tasks to run");
            self.record_event(
                ProcessingEvent::new(Stage::Dispatch, Status::Skipped, fp, Instant::now())
                    .with_document(document_id)
                    .with_details(json!({ "reason": "no tasks for source Other" })),
            )
            .await;
            return ProcessingOutcome::IndexedOther {
                document_id,
                date: classification.date,
            };
        }

        // Dispatch
        let started = Instant::now();
        let tasks = self.registry.tasks_for(classification.source);
        let ctx = DispatchContext {
            reader: self.collab.reader.as_ref(),
            index: self.collab.index.as_ref(),
            extractor: self.collab.extractor.as_ref(),
            collection: &collection,
            bytes: &doc.bytes,
            top_k: self.settings.search_top_k,
            timeout: self.settings.capability_timeout,
        };
        let runs = run_tasks(&ctx, &tasks, self.settings.parallel_tasks).await;

        for run in &runs {
            self.record_task(run, document_id).await;
        }
        let failed = runs.iter().filter(|r| r.status == Status::Error).count();
        self.record_event(
            ProcessingEvent::new(Stage::Dispatch, Status::Success, fp, started)
                .with_document(document_id)
                .with_details(json!({ "tasks": runs.len(), "failed": failed })),
        )
        .await;

        // Persist
        let started = Instant::now();
        let results = collect_results(&tasks, runs);
        let row_ctx = RowContext {
            document_id,
            source: classification.source.label().to_string(),
            document_date: classification.date,
        };
        let routed: Vec<_> = tasks
            .iter()
            .filter_map(|task| results.get(&task.id).map(|r| (task.id, task.persist, r)))
            .collect();
        let report = persist_all(
            self.collab.records.as_ref(),
            &row_ctx,
            &routed,
            self.settings.capability_timeout,
        )
        .await;

        let status = if report.has_failures() {
            Status::Error
        } else {
            Status::Success
        };
        let mut event = ProcessingEvent::new(Stage::Persist, status, fp, started)
            .with_document(document_id)
            .with_details(json!({ "rows": report.rows }));
        if report.has_failures() {
            let message = report
                .failures
                .iter()
                .map(|(task, e)| format!("{}: {}", task, e))
                .collect::<Vec<_>>()
                .join("; ");
            event = event.with_error(message);
        }
        self.record_event(event).await;

        info!(
            fingerprint = fp,
            results = results.len(),
            rows = report.rows,
            "Document completed"
        );
        ProcessingOutcome::Completed {
            document_id,
            source: classification.source,
            date: classification.date,
            results,
        }
    }

    async fn classify(&self, doc: &SourceDocument) -> Result<Classification> {
        let timeout = self.settings.capability_timeout;
        let text = with_timeout(
            "read first page",
            timeout,
            self.collab.reader.read_first_page(&doc.bytes),
        )
        .await?;
        with_timeout("classify", timeout, self.collab.extractor.classify(&text)).await
    }

    async fn backup(&self, doc: &SourceDocument, document_id: i64) {
        let Some(content) = &self.collab.content else {
            return;
        };

        let fp = doc.fingerprint.as_str();
        let started = Instant::now();
        let blob = StoredContent {
            filename: &doc.filename,
            bytes: &doc.bytes,
            fingerprint: &doc.fingerprint,
            fast: FastFingerprint::compute(&doc.bytes, self.settings.fast_prefix_bytes),
        };

        let result = with_timeout(
            "back up document",
            self.settings.capability_timeout,
            content.put_if_absent(&blob),
        )
        .await;

        let event = match result {
            Ok(outcome) => {
                let (stored, path) = match outcome {
                    PutOutcome::Stored { path } => (true, path),
                    PutOutcome::AlreadyPresent { path } => (false, path),
                };
                debug!(fingerprint = fp, stored, "Backup finished");
                ProcessingEvent::new(Stage::Backup, Status::Success, fp, started).with_details(
                    json!({ "stored": stored, "path": path.display().to_string() }),
                )
            }
            Err(e) => {
                warn!(fingerprint = fp, stage = "backup", "Backup failed: {}", e);
                ProcessingEvent::new(Stage::Backup, Status::Error, fp, started)
                    .with_error(e.to_string())
            }
        };
        self.record_event(event.with_document(document_id)).await;
    }

    async fn index(
        &self,
        doc: &SourceDocument,
        document_id: i64,
        classification: &Classification,
        collection: &str,
    ) -> Result<usize> {
        let timeout = self.settings.capability_timeout;
        let index = self.collab.index.as_ref();

        with_timeout("ensure collection", timeout, index.ensure_collection(collection)).await?;

        let texts = with_timeout(
            "read chunks",
            timeout,
            self.collab.reader.read_all_chunks(&doc.bytes),
        )
        .await?;

        let chunks = build_chunks(doc, document_id, classification, texts);
        let count = chunks.len();
        with_timeout("upsert chunks", timeout, index.upsert(collection, chunks)).await?;
        Ok(count)
    }

    async fn record_event(&self, event: ProcessingEvent) {
        let write = self.collab.records.log_stage_event(&event);
        if let Err(e) = with_timeout("log stage event", self.settings.capability_timeout, write).await {
            warn!(stage = %event.stage, "Failed to write processing event: {}", e);
        }
    }

    async fn record_task(&self, run: &TaskRun, document_id: i64) {
        let log = run.to_log(document_id);
        let write = self.collab.records.log_task_event(&log);
        if let Err(e) = with_timeout("log task event", self.settings.capability_timeout, write).await {
            warn!(task = %run.task, "Failed to write task log: {}", e);
        }
    }
}

/// Chunks with deterministic ids and their index payloads
pub fn build_chunks(
    doc: &SourceDocument,
    document_id: i64,
    classification: &Classification,
    texts: Vec<String>,
) -> Vec<IndexedChunk> {
    texts
        .into_iter()
        .enumerate()
        .map(|(index, content)| IndexedChunk {
            id: doc.fingerprint.chunk_id(index),
            payload: ChunkPayload {
                document_hash: doc.fingerprint.to_string(),
                document_id,
                document_name: doc.filename.clone(),
                chunk_index: index as i64,
                content,
                source: classification.source.label().to_string(),
                document_date: classification.date.to_string(),
            },
        })
        .collect()
}

/// Non-empty results keyed by task id
fn collect_results(
    tasks: &[&TaskDefinition],
    runs: Vec<TaskRun>,
) -> BTreeMap<TaskId, Value> {
    debug_assert_eq!(tasks.len(), runs.len());
    runs.into_iter()
        .filter_map(|run| {
            let result = run.result?;
            (!is_empty_result(&result)).then_some((run.task, result))
        })
        .collect()
}
