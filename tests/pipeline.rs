//! End-to-end orchestrator behaviour against in-memory capabilities

use async_trait::async_trait;
use chrono::NaiveDate;
use report_ingest::content::{ContentStore, PutOutcome, StoredContent};
use report_ingest::error::{Error, Result};
use report_ingest::commands::cmd_process;
use report_ingest::extract::{
    Capability, Chart, ChartReport, DatedValue, ExtractionInput, ExtractionService, MarketNews,
    MysteelInventory, NewsItem, PlattsPrices, TaskOutput,
};
use report_ingest::fingerprint::ContentFingerprint;
use report_ingest::meta::{
    ChartRow, DocumentRecord, InventoryRow, NewDocument, NewsRow, PriceRow, RecordStore,
    Registration, RowContext, SqliteRecordStore, StoreStats,
};
use report_ingest::models::{Classification, ProcessingEvent, Source, Stage, Status, TaskLog};
use report_ingest::pipeline::{
    Collaborators, Orchestrator, OrchestratorSettings, PersistKind, Pipeline, ProcessingOutcome,
    SourceDocument, TaskDefinition, TaskId, TaskRegistry, CONTEXT_SEPARATOR,
};
use report_ingest::reader::{DocumentReader, PageImage};
use report_ingest::store::{ChunkPayload, IndexedChunk, SemanticIndex};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

// ============================================================================
// Fakes
// ============================================================================

struct FakeReader {
    pages: Vec<String>,
    images: Vec<PageImage>,
}

impl FakeReader {
    fn with_pages(pages: &[&str]) -> Self {
        Self {
            pages: pages.iter().map(|p| p.to_string()).collect(),
            images: Vec::new(),
        }
    }
}

#[async_trait]
impl DocumentReader for FakeReader {
    async fn read_first_page(&self, _bytes: &[u8]) -> Result<String> {
        let first = self.pages.first().ok_or(Error::NoPages)?;
        if first.trim().is_empty() {
            return Err(Error::NoText);
        }
        Ok(first.clone())
    }

    async fn read_all_chunks(&self, _bytes: &[u8]) -> Result<Vec<String>> {
        let chunks: Vec<String> = self
            .pages
            .iter()
            .filter(|p| !p.trim().is_empty())
            .cloned()
            .collect();
        if chunks.is_empty() {
            return Err(Error::NoPages);
        }
        Ok(chunks)
    }

    async fn read_images(&self, _bytes: &[u8]) -> Result<Vec<PageImage>> {
        Ok(self.images.clone())
    }
}

#[derive(Default)]
struct FakeIndex {
    /// collection -> point id -> payload
    points: Mutex<HashMap<String, HashMap<Uuid, ChunkPayload>>>,
    upserts: Mutex<usize>,
    /// query -> chunk texts; a `None` entry makes the query fail
    answers: HashMap<String, Option<Vec<String>>>,
    fail_upsert: bool,
}

impl FakeIndex {
    fn answer(mut self, query: &str, texts: &[&str]) -> Self {
        let texts = texts.iter().map(|t| t.to_string()).collect();
        self.answers.insert(query.to_string(), Some(texts));
        self
    }

    fn failing(mut self, query: &str) -> Self {
        self.answers.insert(query.to_string(), None);
        self
    }

    fn ids(&self, collection: &str) -> BTreeSet<Uuid> {
        self.points
            .lock()
            .unwrap()
            .get(collection)
            .map(|points| points.keys().copied().collect())
            .unwrap_or_default()
    }

    fn upsert_count(&self) -> usize {
        *self.upserts.lock().unwrap()
    }
}

#[async_trait]
impl SemanticIndex for FakeIndex {
    async fn ensure_collection(&self, collection: &str) -> Result<()> {
        self.points
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default();
        Ok(())
    }

    async fn upsert(&self, collection: &str, chunks: Vec<IndexedChunk>) -> Result<()> {
        if self.fail_upsert {
            return Err(Error::Qdrant("connection refused".to_string()));
        }
        *self.upserts.lock().unwrap() += 1;
        let mut points = self.points.lock().unwrap();
        let target = points.entry(collection.to_string()).or_default();
        for chunk in chunks {
            target.insert(chunk.id, chunk.payload);
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<ChunkPayload>> {
        let texts = match self.answers.get(query) {
            Some(Some(texts)) => texts.clone(),
            Some(None) => return Err(Error::Qdrant(format!("search failed for '{}'", query))),
            None => Vec::new(),
        };
        Ok(texts
            .into_iter()
            .take(top_k)
            .enumerate()
            .map(|(i, content)| ChunkPayload {
                document_hash: "hash".to_string(),
                document_id: 1,
                document_name: "doc.pdf".to_string(),
                chunk_index: i as i64,
                content,
                source: collection.to_string(),
                document_date: "2024-11-28".to_string(),
            })
            .collect())
    }

    async fn exists(&self, collection: &str, fingerprint: &ContentFingerprint) -> Result<bool> {
        Ok(self
            .points
            .lock()
            .unwrap()
            .get(collection)
            .is_some_and(|points| {
                points
                    .values()
                    .any(|p| p.document_hash == fingerprint.as_str())
            }))
    }
}

struct FakeExtractor {
    classification: Option<Classification>,
    /// capability -> output; a missing entry makes extraction fail
    outputs: HashMap<Capability, TaskOutput>,
    delays: HashMap<Capability, Duration>,
    calls: Mutex<Vec<(Capability, String)>>,
}

impl FakeExtractor {
    fn classifying(source: Source, date: NaiveDate) -> Self {
        Self {
            classification: Some(Classification { source, date }),
            outputs: HashMap::new(),
            delays: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn with_output(mut self, capability: Capability, output: TaskOutput) -> Self {
        self.outputs.insert(capability, output);
        self
    }

    fn with_delay(mut self, capability: Capability, delay: Duration) -> Self {
        self.delays.insert(capability, delay);
        self
    }

    fn contexts(&self, capability: Capability) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == capability)
            .map(|(_, context)| context.clone())
            .collect()
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ExtractionService for FakeExtractor {
    async fn classify(&self, _text: &str) -> Result<Classification> {
        self.classification
            .ok_or_else(|| Error::Classification("service unavailable".to_string()))
    }

    async fn extract(&self, capability: Capability, input: ExtractionInput) -> Result<TaskOutput> {
        let context = match input {
            ExtractionInput::Text(text) => text,
            ExtractionInput::Images(images) => images
                .iter()
                .map(|image| {
                    format!("p{} {}", image.page, image.title.as_deref().unwrap_or("untitled"))
                })
                .collect::<Vec<_>>()
                .join(" | "),
        };
        self.calls.lock().unwrap().push((capability, context));

        if let Some(delay) = self.delays.get(&capability) {
            tokio::time::sleep(*delay).await;
        }

        self.outputs
            .get(&capability)
            .cloned()
            .ok_or_else(|| Error::Extraction(format!("{} failed", capability)))
    }
}

#[derive(Default)]
struct RecordState {
    documents: HashMap<String, i64>,
    events: Vec<ProcessingEvent>,
    task_logs: Vec<TaskLog>,
    prices: Vec<PriceRow>,
    inventories: Vec<InventoryRow>,
    news: Vec<NewsRow>,
    charts: Vec<ChartRow>,
}

#[derive(Default)]
struct FakeRecords {
    state: Mutex<RecordState>,
    fail_register: bool,
    fail_inventories: bool,
    fail_audit: bool,
}

impl FakeRecords {
    fn events(&self) -> Vec<(Stage, Status)> {
        self.state
            .lock()
            .unwrap()
            .events
            .iter()
            .map(|e| (e.stage, e.status))
            .collect()
    }

    fn task_logs(&self) -> Vec<(String, Status)> {
        self.state
            .lock()
            .unwrap()
            .task_logs
            .iter()
            .map(|l| (l.task.clone(), l.status))
            .collect()
    }

    fn entity_writes(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.prices.len() + state.inventories.len() + state.news.len() + state.charts.len()
    }
}

#[async_trait]
impl RecordStore for FakeRecords {
    async fn init_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn register_document(&self, doc: &NewDocument) -> Result<Registration> {
        if self.fail_register {
            return Err(Error::Other("database is locked".to_string()));
        }
        let mut state = self.state.lock().unwrap();
        if let Some(&existing_id) = state.documents.get(doc.fingerprint.as_str()) {
            return Ok(Registration::Duplicate { existing_id });
        }
        let id = state.documents.len() as i64 + 1;
        state.documents.insert(doc.fingerprint.to_string(), id);
        Ok(Registration::Registered { id })
    }

    async fn find_document(
        &self,
        _fingerprint: &ContentFingerprint,
    ) -> Result<Option<DocumentRecord>> {
        Ok(None)
    }

    async fn insert_prices(&self, _ctx: &RowContext, rows: &[PriceRow]) -> Result<u64> {
        self.state.lock().unwrap().prices.extend_from_slice(rows);
        Ok(rows.len() as u64)
    }

    async fn insert_inventories(&self, _ctx: &RowContext, rows: &[InventoryRow]) -> Result<u64> {
        if self.fail_inventories {
            return Err(Error::Other("disk full".to_string()));
        }
        self.state.lock().unwrap().inventories.extend_from_slice(rows);
        Ok(rows.len() as u64)
    }

    async fn insert_news(&self, _ctx: &RowContext, rows: &[NewsRow]) -> Result<u64> {
        self.state.lock().unwrap().news.extend_from_slice(rows);
        Ok(rows.len() as u64)
    }

    async fn insert_charts(&self, _ctx: &RowContext, rows: &[ChartRow]) -> Result<u64> {
        self.state.lock().unwrap().charts.extend_from_slice(rows);
        Ok(rows.len() as u64)
    }

    async fn log_stage_event(&self, event: &ProcessingEvent) -> Result<()> {
        if self.fail_audit {
            return Err(Error::Other("audit table missing".to_string()));
        }
        self.state.lock().unwrap().events.push(event.clone());
        Ok(())
    }

    async fn log_task_event(&self, log: &TaskLog) -> Result<()> {
        if self.fail_audit {
            return Err(Error::Other("audit table missing".to_string()));
        }
        self.state.lock().unwrap().task_logs.push(log.clone());
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats::default())
    }
}

#[derive(Default)]
struct FakeContent {
    puts: Mutex<Vec<String>>,
}

#[async_trait]
impl ContentStore for FakeContent {
    async fn put_if_absent(&self, content: &StoredContent<'_>) -> Result<PutOutcome> {
        let mut puts = self.puts.lock().unwrap();
        let path = std::path::PathBuf::from(content.fingerprint.as_str());
        if puts.iter().any(|p| p == content.fingerprint.as_str()) {
            return Ok(PutOutcome::AlreadyPresent { path });
        }
        puts.push(content.fingerprint.to_string());
        Ok(PutOutcome::Stored { path })
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    index: Arc<FakeIndex>,
    extractor: Arc<FakeExtractor>,
    records: Arc<FakeRecords>,
    content: Arc<FakeContent>,
    orchestrator: Orchestrator,
}

impl Harness {
    fn new(
        reader: FakeReader,
        index: FakeIndex,
        extractor: FakeExtractor,
        records: FakeRecords,
        registry: TaskRegistry,
        settings: OrchestratorSettings,
    ) -> Self {
        let index = Arc::new(index);
        let extractor = Arc::new(extractor);
        let records = Arc::new(records);
        let content = Arc::new(FakeContent::default());

        let collab = Collaborators {
            reader: Arc::new(reader),
            index: index.clone(),
            extractor: extractor.clone(),
            records: records.clone(),
            content: Some(content.clone()),
        };

        Self {
            orchestrator: Orchestrator::new(collab, registry, settings),
            index,
            extractor,
            records,
            content,
        }
    }

    fn standard(reader: FakeReader, index: FakeIndex, extractor: FakeExtractor) -> Self {
        Self::new(
            reader,
            index,
            extractor,
            FakeRecords::default(),
            TaskRegistry::standard(),
            OrchestratorSettings::default(),
        )
    }

    async fn process(&self, bytes: &[u8]) -> ProcessingOutcome {
        let doc = SourceDocument::new("report.pdf", bytes.to_vec());
        self.orchestrator.process(&doc).await
    }
}

fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn price(value: f64) -> Option<DatedValue> {
    Some(DatedValue { value, date: None })
}

fn platts_output() -> TaskOutput {
    TaskOutput::PlattsPrices(PlattsPrices {
        platts_62_cfr_china: price(101.5),
        platts_65_cfr_china: None,
        iomgd00: price(99.0),
    })
}

fn inventory_output() -> TaskOutput {
    TaskOutput::Inventory(MysteelInventory {
        pellet: price(1520.3),
        ..Default::default()
    })
}

fn news_output() -> TaskOutput {
    TaskOutput::News(MarketNews {
        news: vec![NewsItem {
            title: "Steel mills cut output".to_string(),
            summary: "Margins remain negative.".to_string(),
            sentiment: "Negative".to_string(),
            date: None,
            category: None,
            tags: Vec::new(),
        }],
    })
}

const PLATTS_QUERIES: &[&str] = &[
    "Table or text with Iron Ore Platts 62% and 65% CFR China prices and their date",
    "Table or text with IOMGD00 prices and their date",
];

fn platts_index() -> FakeIndex {
    FakeIndex::default()
        .answer(PLATTS_QUERIES[0], &["62% CFR China 101.50"])
        .answer(PLATTS_QUERIES[1], &["IOMGD00 99.00"])
}

fn mysteel_index() -> FakeIndex {
    FakeIndex::default()
        .answer("Iron Ore Inventories", &["Pellet 1520.3 kt"])
        .answer("news", &["Steel mills cut output"])
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_platts_document_completes_and_persists() {
    let harness = Harness::standard(
        FakeReader::with_pages(&["Platts Iron Ore 28 Nov 2024", "62% CFR China 101.50"]),
        platts_index(),
        FakeExtractor::classifying(Source::Platts, day("2024-11-28"))
            .with_output(Capability::PlattsPrices, platts_output()),
    );

    let outcome = harness.process(b"platts report").await;

    let ProcessingOutcome::Completed {
        source,
        date,
        results,
        document_id,
    } = outcome
    else {
        panic!("expected completed, got {outcome:?}");
    };
    assert_eq!(source, Source::Platts);
    assert_eq!(date, day("2024-11-28"));
    assert_eq!(document_id, 1);
    assert_eq!(results.keys().copied().collect::<Vec<_>>(), vec![TaskId::GetPlattsPrices]);
    assert_eq!(results[&TaskId::GetPlattsPrices]["iomgd00"]["value"], 99.0);

    let state = harness.records.state.lock().unwrap();
    assert_eq!(state.prices.len(), 2);
    assert!(state.prices.iter().all(|p| p.date == day("2024-11-28")));

    let stages: Vec<Stage> = state.events.iter().map(|e| e.stage).collect();
    assert_eq!(
        stages,
        vec![
            Stage::Classify,
            Stage::Register,
            Stage::Backup,
            Stage::Index,
            Stage::Dispatch,
            Stage::Persist
        ]
    );
    assert!(state.events.iter().all(|e| e.document_id == Some(1)));
    assert!(state.events.iter().all(|e| e.status == Status::Success));
}

#[tokio::test]
async fn test_resubmission_is_a_duplicate_with_no_further_writes() {
    let harness = Harness::standard(
        FakeReader::with_pages(&["Platts Iron Ore", "62% CFR China 101.50"]),
        platts_index(),
        FakeExtractor::classifying(Source::Platts, day("2024-11-28"))
            .with_output(Capability::PlattsPrices, platts_output()),
    );

    let first = harness.process(b"same bytes").await;
    assert_eq!(first.status(), "completed");

    let events_before = harness.records.events().len();
    let upserts_before = harness.index.upsert_count();
    let extractions_before = harness.extractor.call_count();
    let entities_before = harness.records.entity_writes();
    let logs_before = harness.records.task_logs().len();

    let second = harness.process(b"same bytes").await;
    assert_eq!(second, ProcessingOutcome::Duplicate { document_id: 1 });

    let events = harness.records.events();
    assert_eq!(events.len(), events_before + 1);
    assert_eq!(events.last(), Some(&(Stage::Register, Status::Skipped)));
    assert_eq!(harness.index.upsert_count(), upserts_before);
    assert_eq!(harness.extractor.call_count(), extractions_before);
    assert_eq!(harness.records.entity_writes(), entities_before);
    assert_eq!(harness.records.task_logs().len(), logs_before);
    assert_eq!(harness.content.puts.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_completed_task_set_matches_registry_minus_empty_tasks() {
    let harness = Harness::standard(
        FakeReader::with_pages(&["Mysteel weekly", "Pellet 1520.3 kt"]),
        mysteel_index(),
        FakeExtractor::classifying(Source::Mysteel, day("2024-11-28"))
            .with_output(Capability::MysteelInventory, inventory_output())
            .with_output(Capability::MarketNews, news_output()),
    );

    let outcome = harness.process(b"mysteel weekly").await;
    let ProcessingOutcome::Completed { results, .. } = outcome else {
        panic!("expected completed, got {outcome:?}");
    };

    // The graphs task finds no images and produces nothing
    let expected: BTreeSet<TaskId> = TaskRegistry::standard()
        .tasks_for(Source::Mysteel)
        .iter()
        .map(|t| t.id)
        .filter(|id| *id != TaskId::GetMysteelGraphs)
        .collect();
    assert_eq!(results.keys().copied().collect::<BTreeSet<_>>(), expected);

    assert_eq!(
        harness.records.task_logs(),
        vec![
            ("get_mysteel_inventory".to_string(), Status::Success),
            ("get_mysteel_news".to_string(), Status::Success),
            ("get_mysteel_graphs".to_string(), Status::SuccessNoData),
        ]
    );
    let state = harness.records.state.lock().unwrap();
    assert_eq!(state.inventories.len(), 1);
    assert_eq!(state.news.len(), 1);
    assert_eq!(state.task_logs[1].items_found, 1);
}

#[tokio::test]
async fn test_other_source_is_indexed_without_tasks() {
    let harness = Harness::standard(
        FakeReader::with_pages(&["Quarterly letter", "Body"]),
        FakeIndex::default(),
        FakeExtractor::classifying(Source::Other, day("2024-10-01")),
    );

    let outcome = harness.process(b"other report").await;
    assert_eq!(
        outcome,
        ProcessingOutcome::IndexedOther {
            document_id: 1,
            date: day("2024-10-01")
        }
    );

    assert_eq!(harness.index.ids("source_other").len(), 2);
    assert_eq!(harness.extractor.call_count(), 0);
    assert_eq!(harness.records.entity_writes(), 0);
    assert!(harness.records.task_logs().is_empty());
}

#[tokio::test]
async fn test_unreadable_documents_are_classification_errors() {
    for pages in [vec![], vec!["   "]] {
        let harness = Harness::standard(
            FakeReader::with_pages(&pages),
            FakeIndex::default(),
            FakeExtractor::classifying(Source::Platts, day("2024-11-28")),
        );

        let outcome = harness.process(b"scan").await;
        assert_eq!(outcome.status(), "classification_error", "{pages:?}");

        let state = harness.records.state.lock().unwrap();
        assert!(state.documents.is_empty());
        assert_eq!(state.events.len(), 1);
        assert_eq!(state.events[0].stage, Stage::Classify);
        assert_eq!(state.events[0].status, Status::Error);
        assert_eq!(state.events[0].document_id, None);
    }
}

#[tokio::test]
async fn test_classification_failure_stops_the_pipeline() {
    let mut extractor = FakeExtractor::classifying(Source::Platts, day("2024-11-28"));
    extractor.classification = None;
    let harness = Harness::standard(
        FakeReader::with_pages(&["Platts"]),
        FakeIndex::default(),
        extractor,
    );

    let outcome = harness.process(b"platts").await;
    assert!(matches!(
        outcome,
        ProcessingOutcome::ClassificationError { ref detail } if detail.contains("service unavailable")
    ));
    assert_eq!(harness.index.upsert_count(), 0);
    assert!(harness.content.puts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_registration_failure_is_reported() {
    let harness = Harness::new(
        FakeReader::with_pages(&["Platts"]),
        FakeIndex::default(),
        FakeExtractor::classifying(Source::Platts, day("2024-11-28")),
        FakeRecords {
            fail_register: true,
            ..Default::default()
        },
        TaskRegistry::standard(),
        OrchestratorSettings::default(),
    );

    let outcome = harness.process(b"platts").await;
    assert_eq!(outcome.status(), "registration_error");
    assert_eq!(
        harness.records.events(),
        vec![(Stage::Register, Status::Error)]
    );
}

#[tokio::test]
async fn test_indexing_failure_aborts_before_dispatch() {
    let harness = Harness::standard(
        FakeReader::with_pages(&["Platts", "prices"]),
        FakeIndex {
            fail_upsert: true,
            ..platts_index()
        },
        FakeExtractor::classifying(Source::Platts, day("2024-11-28"))
            .with_output(Capability::PlattsPrices, platts_output()),
    );

    let outcome = harness.process(b"platts").await;
    assert!(matches!(
        outcome,
        ProcessingOutcome::IndexingError { ref detail } if detail.contains("connection refused")
    ));
    assert_eq!(harness.extractor.call_count(), 0);
    assert_eq!(
        harness.records.events().last(),
        Some(&(Stage::Index, Status::Error))
    );
}

#[tokio::test]
async fn test_chunk_ids_are_stable_across_indexing_runs() {
    let pages = ["Other report", "page two", "page three"];
    let index = Arc::new(FakeIndex::default());

    let mut id_sets = Vec::new();
    for _ in 0..2 {
        // Fresh record store each run so the document is not a duplicate
        let orchestrator = Orchestrator::new(
            Collaborators {
                reader: Arc::new(FakeReader::with_pages(&pages)),
                index: index.clone(),
                extractor: Arc::new(FakeExtractor::classifying(Source::Other, day("2024-10-01"))),
                records: Arc::new(FakeRecords::default()),
                content: None,
            },
            TaskRegistry::standard(),
            OrchestratorSettings::default(),
        );
        let doc = SourceDocument::new("other.pdf", b"stable bytes".to_vec());
        orchestrator.process(&doc).await;
        id_sets.push(index.ids("source_other"));
    }

    assert_eq!(id_sets[0].len(), 3);
    assert_eq!(id_sets[0], id_sets[1]);
    assert_eq!(index.upsert_count(), 2);
}

#[tokio::test]
async fn test_failing_task_does_not_affect_siblings() {
    // Inventory extraction fails; news still completes and persists
    let harness = Harness::standard(
        FakeReader::with_pages(&["Mysteel weekly", "news"]),
        mysteel_index(),
        FakeExtractor::classifying(Source::Mysteel, day("2024-11-28"))
            .with_output(Capability::MarketNews, news_output()),
    );

    let outcome = harness.process(b"mysteel").await;
    let ProcessingOutcome::Completed { results, .. } = outcome else {
        panic!("expected completed, got {outcome:?}");
    };
    assert_eq!(
        results.keys().copied().collect::<Vec<_>>(),
        vec![TaskId::GetMysteelNews]
    );

    let state = harness.records.state.lock().unwrap();
    assert_eq!(state.task_logs[0].status, Status::Error);
    assert!(state.task_logs[0]
        .error_message
        .as_deref()
        .is_some_and(|m| m.contains("mysteel_inventory failed")));
    assert_eq!(state.task_logs[1].status, Status::Success);
    assert_eq!(state.news.len(), 1);

    let dispatch = state
        .events
        .iter()
        .find(|e| e.stage == Stage::Dispatch)
        .unwrap();
    assert_eq!(dispatch.details.as_ref().unwrap()["failed"], 1);
}

#[tokio::test]
async fn test_persistence_failure_is_isolated() {
    let harness = Harness::new(
        FakeReader::with_pages(&["Mysteel weekly", "news"]),
        mysteel_index(),
        FakeExtractor::classifying(Source::Mysteel, day("2024-11-28"))
            .with_output(Capability::MysteelInventory, inventory_output())
            .with_output(Capability::MarketNews, news_output()),
        FakeRecords {
            fail_inventories: true,
            ..Default::default()
        },
        TaskRegistry::standard(),
        OrchestratorSettings::default(),
    );

    let outcome = harness.process(b"mysteel").await;
    assert_eq!(outcome.status(), "completed");

    let state = harness.records.state.lock().unwrap();
    assert_eq!(state.news.len(), 1);
    let persist = state
        .events
        .iter()
        .find(|e| e.stage == Stage::Persist)
        .unwrap();
    assert_eq!(persist.status, Status::Error);
    assert!(persist
        .error_message
        .as_deref()
        .is_some_and(|m| m.contains("get_mysteel_inventory")));
}

#[tokio::test]
async fn test_audit_failures_never_abort_processing() {
    let harness = Harness::new(
        FakeReader::with_pages(&["Platts", "prices"]),
        platts_index(),
        FakeExtractor::classifying(Source::Platts, day("2024-11-28"))
            .with_output(Capability::PlattsPrices, platts_output()),
        FakeRecords {
            fail_audit: true,
            ..Default::default()
        },
        TaskRegistry::standard(),
        OrchestratorSettings::default(),
    );

    let outcome = harness.process(b"platts").await;
    assert_eq!(outcome.status(), "completed");
    assert_eq!(harness.records.entity_writes(), 2);
}

const F1_TASKS: &[TaskDefinition] = &[
    TaskDefinition {
        id: TaskId::GetPlattsPrices,
        source: Source::Platts,
        queries: &["platts price table"],
        capability: Capability::PlattsPrices,
        needs_document: false,
        persist: PersistKind::Prices,
    },
    TaskDefinition {
        id: TaskId::GetFastmarketsPrices,
        source: Source::Platts,
        queries: &["something absent"],
        capability: Capability::FastmarketsPrices,
        needs_document: false,
        persist: PersistKind::Prices,
    },
];

#[tokio::test]
async fn test_one_result_and_one_empty_task() {
    let harness = Harness::new(
        FakeReader::with_pages(&["Platts 28 Nov 2024", "price table"]),
        FakeIndex::default().answer("platts price table", &["62% CFR China 101.50"]),
        FakeExtractor::classifying(Source::Platts, day("2024-11-28"))
            .with_output(Capability::PlattsPrices, platts_output()),
        FakeRecords::default(),
        TaskRegistry::from_slice(F1_TASKS),
        OrchestratorSettings::default(),
    );

    let bytes = b"F1";
    let outcome = harness.process(bytes).await;
    let ProcessingOutcome::Completed { results, .. } = outcome else {
        panic!("expected completed, got {outcome:?}");
    };
    assert_eq!(results.len(), 1);
    assert!(results.contains_key(&TaskId::GetPlattsPrices));

    assert_eq!(
        harness.records.task_logs(),
        vec![
            ("get_platts_prices".to_string(), Status::Success),
            ("get_fastmarkets_prices".to_string(), Status::SuccessNoData),
        ]
    );

    // Re-submitting adds only the registration-check event
    let events_before = harness.records.events().len();
    assert_eq!(
        harness.process(bytes).await,
        ProcessingOutcome::Duplicate { document_id: 1 }
    );
    assert_eq!(harness.records.events().len(), events_before + 1);
    assert_eq!(harness.records.task_logs().len(), 2);
}

#[tokio::test]
async fn test_context_keeps_first_seen_chunk_order() {
    const TASKS: &[TaskDefinition] = &[TaskDefinition {
        id: TaskId::GetPlattsPrices,
        source: Source::Platts,
        queries: &["q1", "q2", "q3"],
        capability: Capability::PlattsPrices,
        needs_document: false,
        persist: PersistKind::Prices,
    }];

    let harness = Harness::new(
        FakeReader::with_pages(&["Platts"]),
        FakeIndex::default()
            .answer("q1", &["gamma", "alpha"])
            .answer("q2", &["alpha", "beta"])
            .answer("q3", &["gamma", "delta"]),
        FakeExtractor::classifying(Source::Platts, day("2024-11-28"))
            .with_output(Capability::PlattsPrices, platts_output()),
        FakeRecords::default(),
        TaskRegistry::from_slice(TASKS),
        OrchestratorSettings::default(),
    );

    for _ in 0..3 {
        // Distinct bytes each time so every run dispatches
        harness.process(Uuid::new_v4().as_bytes()).await;
    }

    let expected = ["gamma", "alpha", "beta", "delta"].join(CONTEXT_SEPARATOR);
    let contexts = harness.extractor.contexts(Capability::PlattsPrices);
    assert_eq!(contexts.len(), 3);
    assert!(contexts.iter().all(|c| *c == expected));
}

#[tokio::test]
async fn test_failing_query_is_skipped() {
    const TASKS: &[TaskDefinition] = &[TaskDefinition {
        id: TaskId::GetPlattsPrices,
        source: Source::Platts,
        queries: &["broken", "working"],
        capability: Capability::PlattsPrices,
        needs_document: false,
        persist: PersistKind::Prices,
    }];

    let harness = Harness::new(
        FakeReader::with_pages(&["Platts"]),
        FakeIndex::default()
            .failing("broken")
            .answer("working", &["IOMGD00 99.00"]),
        FakeExtractor::classifying(Source::Platts, day("2024-11-28"))
            .with_output(Capability::PlattsPrices, platts_output()),
        FakeRecords::default(),
        TaskRegistry::from_slice(TASKS),
        OrchestratorSettings::default(),
    );

    let outcome = harness.process(b"platts").await;
    assert_eq!(outcome.status(), "completed");
    assert_eq!(
        harness.extractor.contexts(Capability::PlattsPrices),
        vec!["IOMGD00 99.00".to_string()]
    );
    assert_eq!(
        harness.records.task_logs(),
        vec![("get_platts_prices".to_string(), Status::Success)]
    );

    let state = harness.records.state.lock().unwrap();
    let note = state.task_logs[0].error_message.as_deref().unwrap_or_default();
    assert!(note.contains("broken"), "{note}");
    assert!(!note.contains("working"), "{note}");
}

#[tokio::test]
async fn test_every_query_failing_is_a_task_error() {
    const TASKS: &[TaskDefinition] = &[TaskDefinition {
        id: TaskId::GetPlattsPrices,
        source: Source::Platts,
        queries: &["broken-a", "broken-b"],
        capability: Capability::PlattsPrices,
        needs_document: false,
        persist: PersistKind::Prices,
    }];

    let harness = Harness::new(
        FakeReader::with_pages(&["Platts"]),
        FakeIndex::default().failing("broken-a").failing("broken-b"),
        FakeExtractor::classifying(Source::Platts, day("2024-11-28"))
            .with_output(Capability::PlattsPrices, platts_output()),
        FakeRecords::default(),
        TaskRegistry::from_slice(TASKS),
        OrchestratorSettings::default(),
    );

    let outcome = harness.process(b"platts").await;
    let ProcessingOutcome::Completed { results, .. } = outcome else {
        panic!("expected completed, got {outcome:?}");
    };
    assert!(results.is_empty());
    assert_eq!(harness.extractor.call_count(), 0);

    let state = harness.records.state.lock().unwrap();
    assert_eq!(state.task_logs[0].status, Status::Error);
    let message = state.task_logs[0].error_message.as_deref().unwrap_or_default();
    assert!(message.contains("search failed for 'broken-a'"), "{message}");
    assert!(message.contains("search failed for 'broken-b'"), "{message}");

    let dispatch = state
        .events
        .iter()
        .find(|e| e.stage == Stage::Dispatch)
        .unwrap();
    assert_eq!(dispatch.details.as_ref().unwrap()["failed"], 1);
}

#[tokio::test]
async fn test_empty_news_list_counts_as_no_data() {
    let harness = Harness::standard(
        FakeReader::with_pages(&["Mysteel weekly", "Pellet 1520.3 kt"]),
        mysteel_index(),
        FakeExtractor::classifying(Source::Mysteel, day("2024-11-28"))
            .with_output(Capability::MysteelInventory, inventory_output())
            .with_output(Capability::MarketNews, TaskOutput::News(MarketNews::default())),
    );

    let outcome = harness.process(b"quiet week").await;
    let ProcessingOutcome::Completed { results, .. } = outcome else {
        panic!("expected completed, got {outcome:?}");
    };
    assert_eq!(
        results.keys().copied().collect::<Vec<_>>(),
        vec![TaskId::GetMysteelInventory]
    );
    assert_eq!(
        harness.records.task_logs(),
        vec![
            ("get_mysteel_inventory".to_string(), Status::Success),
            ("get_mysteel_news".to_string(), Status::SuccessNoData),
            ("get_mysteel_graphs".to_string(), Status::SuccessNoData),
        ]
    );
}

#[tokio::test]
async fn test_located_charts_reach_the_chart_task() {
    let chart_image = |page: u32, index: usize, title: &str| PageImage {
        page,
        index,
        width: 1650,
        height: 700,
        mime_type: "image/png".to_string(),
        title: Some(title.to_string()),
        data: vec![0x89, 0x50, 0x4E, 0x47],
    };
    let reader = FakeReader {
        pages: vec!["Mysteel weekly".to_string(), "charts".to_string()],
        images: vec![
            chart_image(2, 0, "Capacity utilization BF & EAF (%)"),
            chart_image(2, 1, "Ports & Steel Mills Inventories (10,000t)"),
        ],
    };
    let charts = TaskOutput::Charts(ChartReport {
        charts: vec![Chart {
            title: "Capacity utilization BF & EAF (%)".to_string(),
            description: "BF utilization eased to 85%".to_string(),
            chart_date: None,
            page: 2,
            mime_type: "image/png".to_string(),
            image: vec![0x89, 0x50, 0x4E, 0x47],
        }],
    });

    let harness = Harness::standard(
        reader,
        mysteel_index(),
        FakeExtractor::classifying(Source::Mysteel, day("2024-11-28"))
            .with_output(Capability::ChartAnalysis, charts),
    );

    let outcome = harness.process(b"mysteel with charts").await;
    let ProcessingOutcome::Completed { results, .. } = outcome else {
        panic!("expected completed, got {outcome:?}");
    };
    assert!(results.contains_key(&TaskId::GetMysteelGraphs));
    assert_eq!(
        harness.extractor.contexts(Capability::ChartAnalysis),
        vec![
            "p2 Capacity utilization BF & EAF (%) | p2 Ports & Steel Mills Inventories (10,000t)"
                .to_string()
        ]
    );

    let state = harness.records.state.lock().unwrap();
    assert_eq!(state.charts.len(), 1);
    assert_eq!(state.charts[0].title, "Capacity utilization BF & EAF (%)");
    assert_eq!(state.charts[0].mime_type, "image/png");
}

#[tokio::test]
async fn test_parallel_tasks_log_in_declaration_order() {
    let harness = Harness::new(
        FakeReader::with_pages(&["Mysteel weekly", "news"]),
        mysteel_index(),
        FakeExtractor::classifying(Source::Mysteel, day("2024-11-28"))
            .with_output(Capability::MysteelInventory, inventory_output())
            .with_output(Capability::MarketNews, news_output())
            .with_delay(Capability::MysteelInventory, Duration::from_millis(100)),
        FakeRecords::default(),
        TaskRegistry::standard(),
        OrchestratorSettings {
            parallel_tasks: true,
            ..Default::default()
        },
    );

    let outcome = harness.process(b"mysteel").await;
    assert_eq!(outcome.status(), "completed");

    let tasks: Vec<String> = harness
        .records
        .task_logs()
        .into_iter()
        .map(|(task, _)| task)
        .collect();
    assert_eq!(
        tasks,
        vec!["get_mysteel_inventory", "get_mysteel_news", "get_mysteel_graphs"]
    );
}

#[tokio::test]
async fn test_extraction_timeout_is_a_task_error() {
    let harness = Harness::new(
        FakeReader::with_pages(&["Platts", "prices"]),
        platts_index(),
        FakeExtractor::classifying(Source::Platts, day("2024-11-28"))
            .with_output(Capability::PlattsPrices, platts_output())
            .with_delay(Capability::PlattsPrices, Duration::from_millis(500)),
        FakeRecords::default(),
        TaskRegistry::standard(),
        OrchestratorSettings {
            capability_timeout: Duration::from_millis(50),
            ..Default::default()
        },
    );

    let outcome = harness.process(b"platts").await;
    let ProcessingOutcome::Completed { results, .. } = outcome else {
        panic!("expected completed, got {outcome:?}");
    };
    assert!(results.is_empty());

    let state = harness.records.state.lock().unwrap();
    assert_eq!(state.task_logs[0].status, Status::Error);
    assert!(state.task_logs[0]
        .error_message
        .as_deref()
        .is_some_and(|m| m.contains("Timed out")));
}

#[tokio::test]
async fn test_pipeline_with_sqlite_records_is_idempotent() {
    let tmp = tempfile::TempDir::new().unwrap();
    let records = Arc::new(
        SqliteRecordStore::open(&tmp.path().join("records.db"))
            .await
            .unwrap(),
    );
    records.init_schema().await.unwrap();

    let orchestrator = Orchestrator::new(
        Collaborators {
            reader: Arc::new(FakeReader::with_pages(&["Platts", "prices"])),
            index: Arc::new(platts_index()),
            extractor: Arc::new(
                FakeExtractor::classifying(Source::Platts, day("2024-11-28"))
                    .with_output(Capability::PlattsPrices, platts_output()),
            ),
            records: records.clone(),
            content: None,
        },
        TaskRegistry::standard(),
        OrchestratorSettings::default(),
    );
    let pipeline = Pipeline::new(orchestrator, records.clone());

    let first = pipeline
        .process_document("platts.pdf", b"platts bytes".to_vec())
        .await;
    assert_eq!(first.status(), "completed");
    let after_first = records.stats().await.unwrap();

    let second = pipeline
        .process_document("platts-copy.pdf", b"platts bytes".to_vec())
        .await;
    assert_eq!(second.status(), "duplicate");
    let after_second = records.stats().await.unwrap();

    assert_eq!(after_first.documents, 1);
    assert_eq!(after_first.prices, 2);
    assert_eq!(after_first.task_logs, 1);
    assert_eq!(after_second.documents, 1);
    assert_eq!(after_second.prices, 2);
    assert_eq!(after_second.task_logs, 1);
    assert_eq!(after_second.processing_events, after_first.processing_events + 1);
}

#[tokio::test]
async fn test_process_command_reports_every_file() {
    let tmp = tempfile::TempDir::new().unwrap();
    std::fs::write(tmp.path().join("a.pdf"), b"first report").unwrap();
    std::fs::write(tmp.path().join("b.PDF"), b"second report").unwrap();
    std::fs::write(tmp.path().join("notes.txt"), b"ignored").unwrap();

    let records = Arc::new(FakeRecords::default());
    let orchestrator = Orchestrator::new(
        Collaborators {
            reader: Arc::new(FakeReader::with_pages(&["Quarterly letter", "Body"])),
            index: Arc::new(FakeIndex::default()),
            extractor: Arc::new(FakeExtractor::classifying(Source::Other, day("2024-10-01"))),
            records: records.clone(),
            content: None,
        },
        TaskRegistry::standard(),
        OrchestratorSettings::default(),
    );
    let pipeline = Pipeline::new(orchestrator, records);

    let report = cmd_process(&pipeline, &[tmp.path().to_path_buf()], 2)
        .await
        .unwrap();

    let mut paths: Vec<&str> = report.files.iter().map(|f| f.path.as_str()).collect();
    paths.sort();
    assert_eq!(paths.len(), 2);
    assert!(paths[0].ends_with("a.pdf"));
    assert!(paths[1].ends_with("b.PDF"));
    assert_eq!(report.counts().get("indexed_other"), Some(&2));
    assert!(report.unreadable.is_empty());
    assert!(!report.has_errors());
}
