//! Document processing pipeline
//!
//! `Pipeline` wires the production capabilities from configuration and
//! exposes the single entry point `process_document`. The stage logic lives
//! in [`Orchestrator`], which takes its collaborators as trait objects so
//! tests can substitute fakes.

mod dispatch;
mod orchestrator;
mod outcome;
mod persist;
mod registry;

pub use dispatch::{run_task, run_tasks, union_first_seen, DispatchContext, TaskRun, CONTEXT_SEPARATOR};
pub use orchestrator::{build_chunks, Collaborators, Orchestrator, OrchestratorSettings, SourceDocument};
pub use outcome::ProcessingOutcome;
pub use persist::{is_persistable, persist_all, persist_result, PersistReport};
pub use registry::{PersistKind, TaskDefinition, TaskId, TaskRegistry};

use crate::config::Config;
use crate::content::{ContentStore, FsContentStore};
use crate::error::{Error, Result};
use crate::extract::ChatExtractionClient;
use crate::meta::{open_record_store, RecordStore};
use crate::reader::PdfDocumentReader;
use crate::store::QdrantIndex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Await `fut`, failing with `Error::Timeout` once `limit` elapses
pub(crate) async fn with_timeout<T, F>(operation: &str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            operation: operation.to_string(),
            secs: limit.as_secs(),
        }),
    }
}

/// Caller-facing pipeline
pub struct Pipeline {
    orchestrator: Orchestrator,
    records: Arc<dyn RecordStore>,
}

impl Pipeline {
    /// Build the production pipeline: PDF reader, Qdrant index, chat
    /// extraction client, the configured record store and, when enabled,
    /// the filesystem content store.
    pub async fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let records = open_record_store(config).await?;
        records.init_schema().await?;

        let content: Option<Arc<dyn ContentStore>> = if config.content_store.enabled {
            let dir = config.documents_dir();
            info!("Backing up originals to {:?}", dir);
            Some(Arc::new(FsContentStore::new(dir)))
        } else {
            None
        };

        let collab = Collaborators {
            reader: Arc::new(PdfDocumentReader::new()),
            index: Arc::new(QdrantIndex::connect(config)?),
            extractor: Arc::new(ChatExtractionClient::from_config(config)?),
            records: Arc::clone(&records),
            content,
        };

        let orchestrator = Orchestrator::new(
            collab,
            TaskRegistry::standard(),
            OrchestratorSettings::from_config(config),
        );
        Ok(Self {
            orchestrator,
            records,
        })
    }

    pub fn new(orchestrator: Orchestrator, records: Arc<dyn RecordStore>) -> Self {
        Self {
            orchestrator,
            records,
        }
    }

    /// Fingerprint and process one document binary
    pub async fn process_document(&self, filename: &str, bytes: Vec<u8>) -> ProcessingOutcome {
        let doc = SourceDocument::new(filename, bytes);
        self.orchestrator.process(&doc).await
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn records(&self) -> &Arc<dyn RecordStore> {
        &self.records
    }
}
