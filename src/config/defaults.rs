//! Default values for configuration

/// Default Qdrant gRPC URL for local development (port 6334, not 6333 REST)
pub fn default_qdrant_url() -> String {
    std::env::var("QDRANT_URL").unwrap_or_else(|_| "http://127.0.0.1:6334".to_string())
}

/// Default environment variable name for Qdrant API key
pub fn default_qdrant_api_key_env() -> String {
    "QDRANT_API_KEY".to_string()
}

/// Default embedding model
pub fn default_embedding_model() -> String {
    "sentence-transformers/all-MiniLM-L6-v2".to_string()
}

/// Default embedding dimension (all-MiniLM-L6-v2)
pub fn default_embedding_dimension() -> usize {
    384
}

/// Default embedding backend URL
pub fn default_embedding_backend_url() -> String {
    std::env::var("REPORT_INGEST_EMBEDDING_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:7997".to_string())
}

/// Default batch size for embedding
pub fn default_embedding_batch_size() -> usize {
    32
}

pub fn default_extraction_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

pub fn default_extraction_model() -> String {
    "gpt-4o-mini".to_string()
}

pub fn default_extraction_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

pub fn default_azure_api_version() -> String {
    "2024-05-01-preview".to_string()
}

/// Per-request timeout for the extraction service (seconds)
pub fn default_extraction_timeout() -> u64 {
    120
}

pub fn default_extraction_max_retries() -> usize {
    2
}

/// Database URL override for the record store
pub fn default_record_store_url() -> Option<String> {
    std::env::var("REPORT_INGEST_DATABASE_URL").ok()
}

pub fn default_content_store_enabled() -> bool {
    true
}

/// Bytes hashed for the fast content-store fingerprint
pub fn default_fast_prefix_bytes() -> usize {
    4096
}

/// Chunks returned per retrieval query
pub fn default_search_top_k() -> usize {
    5
}

/// Upper bound for a single external call made by the orchestrator (seconds)
pub fn default_capability_timeout() -> u64 {
    180
}

pub fn default_max_concurrent_documents() -> usize {
    4
}
