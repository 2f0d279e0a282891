//! Payload schema for Qdrant points

use crate::error::{Error, Result};
use qdrant_client::qdrant::{PointStruct, Value as QdrantValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

/// A chunk ready to be embedded and upserted
#[derive(Debug, Clone)]
pub struct IndexedChunk {
    pub id: Uuid,
    pub payload: ChunkPayload,
}

impl IndexedChunk {
    /// Convert to qdrant-client PointStruct
    pub fn to_point_struct(self, vector: Vec<f32>) -> PointStruct {
        let payload_map = self.payload.to_qdrant_payload();
        PointStruct::new(self.id.to_string(), vector, payload_map)
    }
}

/// Payload stored with each chunk in Qdrant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
    /// Content fingerprint of the owning document
    pub document_hash: String,

    /// Record-store id of the owning document
    pub document_id: i64,

    /// Original filename
    pub document_name: String,

    /// Page-order position of this chunk
    pub chunk_index: i64,

    /// Chunk text
    pub content: String,

    /// Classified source label
    pub source: String,

    /// Classified report date (ISO 8601)
    pub document_date: String,
}

impl ChunkPayload {
    /// Convert to Qdrant payload format
    pub fn to_qdrant_payload(self) -> HashMap<String, QdrantValue> {
        let mut map = HashMap::new();

        map.insert("document_hash".to_string(), string_to_qdrant(self.document_hash));
        map.insert("document_id".to_string(), int_to_qdrant(self.document_id));
        map.insert("document_name".to_string(), string_to_qdrant(self.document_name));
        map.insert("chunk_index".to_string(), int_to_qdrant(self.chunk_index));
        map.insert("content".to_string(), string_to_qdrant(self.content));
        map.insert("source".to_string(), string_to_qdrant(self.source));
        map.insert("document_date".to_string(), string_to_qdrant(self.document_date));

        map
    }
}

fn string_to_qdrant(s: String) -> QdrantValue {
    QdrantValue {
        kind: Some(qdrant_client::qdrant::value::Kind::StringValue(s)),
    }
}

fn int_to_qdrant(i: i64) -> QdrantValue {
    QdrantValue {
        kind: Some(qdrant_client::qdrant::value::Kind::IntegerValue(i)),
    }
}

impl TryFrom<Map<String, Value>> for ChunkPayload {
    type Error = Error;

    fn try_from(map: Map<String, Value>) -> Result<Self> {
        serde_json::from_value(Value::Object(map))
            .map_err(|e| Error::Qdrant(format!("Malformed chunk payload: {}", e)))
    }
}
