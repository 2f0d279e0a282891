//! Qdrant vector database integration
//!
//! This module wraps the Qdrant client and provides:
//! - The `SemanticIndex` seam used by the pipeline
//! - Per-source collection management
//! - Chunk upsert, text search and fingerprint lookups

mod payload;

pub use payload::*;

use crate::config::Config;
use crate::embed::{create_embedder, embed_in_batches, Embedder};
use crate::error::{Error, Result};
use crate::fingerprint::ContentFingerprint;
use async_trait::async_trait;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, Distance, Filter, GetCollectionInfoResponse, PointStruct,
    ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

/// Per-collection vector store used for retrieval
#[async_trait]
pub trait SemanticIndex: Send + Sync {
    /// Create the collection if it does not exist yet
    async fn ensure_collection(&self, collection: &str) -> Result<()>;

    /// Insert or overwrite chunks by id
    async fn upsert(&self, collection: &str, chunks: Vec<IndexedChunk>) -> Result<()>;

    /// Nearest-neighbour search, best match first
    async fn search(&self, collection: &str, query: &str, top_k: usize)
        -> Result<Vec<ChunkPayload>>;

    /// Whether any chunk of the document is stored in the collection
    async fn exists(&self, collection: &str, fingerprint: &ContentFingerprint) -> Result<bool>;
}

/// Information about a Qdrant collection
#[derive(Debug, Clone, Serialize)]
pub struct CollectionInfo {
    pub points_count: u64,
    pub indexed_vectors_count: u64,
    pub status: String,
}

/// Qdrant-backed semantic index
pub struct QdrantIndex {
    client: Qdrant,
    embedder: Box<dyn Embedder>,
    batch_size: usize,
}

impl QdrantIndex {
    /// Connect to Qdrant using config
    pub fn connect(config: &Config) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        Self::new(
            &config.qdrant_url,
            config.qdrant_api_key(),
            embedder,
            config.embedding.batch_size,
        )
    }

    /// Create a new index handle directly with URL and embedder
    pub fn new(
        url: &str,
        api_key: Option<String>,
        embedder: Box<dyn Embedder>,
        batch_size: usize,
    ) -> Result<Self> {
        debug!("Connecting to Qdrant at {}", url);

        let mut builder = Qdrant::from_url(url).skip_compatibility_check();
        if let Some(key) = api_key {
            builder = builder.api_key(key);
        }
        let client = builder.build().map_err(|e| Error::Qdrant(e.to_string()))?;

        Ok(Self {
            client,
            embedder,
            batch_size,
        })
    }

    /// Get the expected vector dimension for this index
    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    /// Round-trip to the server
    pub async fn health_check(&self) -> Result<String> {
        let reply = self.client.health_check().await?;
        Ok(reply.version)
    }

    /// Get collection info (point count, etc)
    pub async fn get_collection_info(&self, collection: &str) -> Result<Option<CollectionInfo>> {
        if !self.client.collection_exists(collection).await? {
            return Ok(None);
        }

        let info = self.client.collection_info(collection).await?;
        if let Some(result) = info.result {
            Ok(Some(CollectionInfo {
                points_count: result.points_count.unwrap_or(0),
                indexed_vectors_count: result.indexed_vectors_count.unwrap_or(0),
                status: format!("{:?}", result.status()),
            }))
        } else {
            Ok(None)
        }
    }

    async fn check_vector_size(&self, collection: &str) -> Result<()> {
        let info = self.client.collection_info(collection).await?;
        match extract_vector_size(&info) {
            Some(size) if size as usize != self.dimension() => Err(Error::Qdrant(format!(
                "Collection '{}' has vector size {}, but model '{}' produces {}",
                collection,
                size,
                self.embedder.model_name(),
                self.dimension()
            ))),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl SemanticIndex for QdrantIndex {
    async fn ensure_collection(&self, collection: &str) -> Result<()> {
        if self.client.collection_exists(collection).await? {
            debug!("Collection {} already exists", collection);
            return self.check_vector_size(collection).await;
        }

        info!(
            "Creating collection {} with dimension {}",
            collection,
            self.dimension()
        );

        let vectors_config = VectorParamsBuilder::new(self.dimension() as u64, Distance::Cosine);
        self.client
            .create_collection(CreateCollectionBuilder::new(collection).vectors_config(vectors_config))
            .await?;

        info!("Collection {} created successfully", collection);
        Ok(())
    }

    async fn upsert(&self, collection: &str, chunks: Vec<IndexedChunk>) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.payload.content.clone()).collect();
        let vectors = embed_in_batches(self.embedder.as_ref(), texts, self.batch_size).await?;

        if vectors.len() != chunks.len() {
            return Err(Error::Embedding(format!(
                "Expected {} vectors, got {}",
                chunks.len(),
                vectors.len()
            )));
        }

        debug!("Upserting {} points to collection {}", chunks.len(), collection);

        let points: Vec<PointStruct> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| chunk.to_point_struct(vector))
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
            .await?;

        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<ChunkPayload>> {
        debug!("Searching collection {} with limit {}", collection, top_k);

        let vector = self
            .embedder
            .embed(vec![query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("No vector returned for query".to_string()))?;

        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(collection, vector, top_k as u64).with_payload(true),
            )
            .await?;

        let payloads = response
            .result
            .into_iter()
            .filter_map(|point| {
                let map = point
                    .payload
                    .into_iter()
                    .map(|(k, v)| (k, json_from_qdrant_value(v)))
                    .collect::<serde_json::Map<String, Value>>();
                match ChunkPayload::try_from(map) {
                    Ok(payload) => Some(payload),
                    Err(e) => {
                        warn!("Skipping point in {}: {}", collection, e);
                        None
                    }
                }
            })
            .collect();

        Ok(payloads)
    }

    async fn exists(&self, collection: &str, fingerprint: &ContentFingerprint) -> Result<bool> {
        if !self.client.collection_exists(collection).await? {
            return Ok(false);
        }

        let response = self
            .client
            .scroll(
                ScrollPointsBuilder::new(collection)
                    .filter(Filter::must([Condition::matches(
                        "document_hash",
                        fingerprint.to_string(),
                    )]))
                    .limit(1)
                    .with_payload(false)
                    .with_vectors(false),
            )
            .await?;

        Ok(!response.result.is_empty())
    }
}

fn extract_vector_size(info: &GetCollectionInfoResponse) -> Option<u64> {
    let result = info.result.as_ref()?;
    let config = result.config.as_ref()?;
    let params = config.params.as_ref()?;
    let vectors_config = params.vectors_config.as_ref()?;

    match vectors_config.config.as_ref()? {
        qdrant_client::qdrant::vectors_config::Config::Params(params) => Some(params.size),
        qdrant_client::qdrant::vectors_config::Config::ParamsMap(_) => None,
    }
}

/// Convert Qdrant value to serde_json Value
fn json_from_qdrant_value(v: qdrant_client::qdrant::Value) -> Value {
    use qdrant_client::qdrant::value::Kind;

    match v.kind {
        Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::IntegerValue(i)) => Value::Number(i.into()),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::ListValue(list)) => Value::Array(
            list.values
                .into_iter()
                .map(json_from_qdrant_value)
                .collect(),
        ),
        Some(Kind::StructValue(s)) => Value::Object(
            s.fields
                .into_iter()
                .map(|(k, v)| (k, json_from_qdrant_value(v)))
                .collect(),
        ),
        None => Value::Null,
    }
}
