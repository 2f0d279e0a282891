//! Configuration management for report-ingest
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Qdrant connection URL
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,

    /// Environment variable name for Qdrant API key
    #[serde(default = "default_qdrant_api_key_env")]
    pub qdrant_api_key_env: String,

    /// Embedding backend configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Semantic extraction service configuration
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Relational record store configuration
    #[serde(default)]
    pub record_store: RecordStoreConfig,

    /// Original-document backup configuration
    #[serde(default)]
    pub content_store: ContentStoreConfig,

    /// Orchestration knobs
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Base URL of the HTTP embedding backend
    #[serde(default = "default_embedding_backend_url")]
    pub backend_url: String,

    /// Model name/identifier
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension (must match model)
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Batch size for embedding
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,
}

/// Which chat-completions dialect the extraction service speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionProvider {
    #[default]
    OpenAi,
    Azure,
}

impl FromStr for ExtractionProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "azure" => Ok(Self::Azure),
            _ => Err(Error::Config(format!(
                "Unknown extraction provider '{}': expected 'openai' or 'azure'",
                s
            ))),
        }
    }
}

/// Extraction service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default)]
    pub provider: ExtractionProvider,

    /// API base URL (OpenAI) or resource endpoint (Azure)
    #[serde(default = "default_extraction_endpoint")]
    pub endpoint: String,

    /// Model name (ignored by Azure, which routes by deployment)
    #[serde(default = "default_extraction_model")]
    pub model: String,

    /// Environment variable holding the API key
    #[serde(default = "default_extraction_api_key_env")]
    pub api_key_env: String,

    /// Azure deployment name
    #[serde(default)]
    pub azure_deployment: Option<String>,

    #[serde(default = "default_azure_api_version")]
    pub azure_api_version: String,

    /// Request timeout in seconds
    #[serde(default = "default_extraction_timeout")]
    pub timeout_secs: u64,

    /// Retries after the first failed attempt
    #[serde(default = "default_extraction_max_retries")]
    pub max_retries: usize,
}

/// Record store backend selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecordBackend {
    #[default]
    Sqlite,
    Postgres,
}

impl std::fmt::Display for RecordBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordBackend::Sqlite => write!(f, "sqlite"),
            RecordBackend::Postgres => write!(f, "postgres"),
        }
    }
}

/// Record store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordStoreConfig {
    #[serde(default)]
    pub backend: RecordBackend,

    /// Connection URL; SQLite falls back to `<base_dir>/records.db`
    #[serde(default = "default_record_store_url")]
    pub url: Option<String>,
}

/// Content store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentStoreConfig {
    #[serde(default = "default_content_store_enabled")]
    pub enabled: bool,

    /// Directory for stored originals; defaults to `<base_dir>/documents`
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Prefix length hashed for the fast fingerprint
    #[serde(default = "default_fast_prefix_bytes")]
    pub fast_prefix_bytes: usize,
}

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Chunks returned per retrieval query
    #[serde(default = "default_search_top_k")]
    pub search_top_k: usize,

    /// Timeout applied to every external call made by the orchestrator
    #[serde(default = "default_capability_timeout")]
    pub capability_timeout_secs: u64,

    /// Documents processed concurrently by the CLI
    #[serde(default = "default_max_concurrent_documents")]
    pub max_concurrent_documents: usize,

    /// Run the tasks of one document concurrently
    #[serde(default)]
    pub parallel_tasks: bool,
}

impl PipelineConfig {
    pub fn capability_timeout(&self) -> Duration {
        Duration::from_secs(self.capability_timeout_secs)
    }
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for report-ingest data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to the SQLite record database
    pub db_file: PathBuf,

    /// Default directory for stored originals
    pub documents_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            qdrant_url: default_qdrant_url(),
            qdrant_api_key_env: default_qdrant_api_key_env(),
            embedding: EmbeddingConfig::default(),
            extraction: ExtractionConfig::default(),
            record_store: RecordStoreConfig::default(),
            content_store: ContentStoreConfig::default(),
            pipeline: PipelineConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend_url: default_embedding_backend_url(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            batch_size: default_embedding_batch_size(),
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            provider: ExtractionProvider::default(),
            endpoint: default_extraction_endpoint(),
            model: default_extraction_model(),
            api_key_env: default_extraction_api_key_env(),
            azure_deployment: None,
            azure_api_version: default_azure_api_version(),
            timeout_secs: default_extraction_timeout(),
            max_retries: default_extraction_max_retries(),
        }
    }
}

impl Default for RecordStoreConfig {
    fn default() -> Self {
        Self {
            backend: RecordBackend::default(),
            url: default_record_store_url(),
        }
    }
}

impl Default for ContentStoreConfig {
    fn default() -> Self {
        Self {
            enabled: default_content_store_enabled(),
            dir: None,
            fast_prefix_bytes: default_fast_prefix_bytes(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            search_top_k: default_search_top_k(),
            capability_timeout_secs: default_capability_timeout(),
            max_concurrent_documents: default_max_concurrent_documents(),
            parallel_tasks: false,
        }
    }
}

impl Config {
    /// Get the default base directory (~/.report-ingest)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".report-ingest")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    fn paths_for(base: PathBuf, config_file: PathBuf) -> PathsConfig {
        PathsConfig {
            config_file,
            db_file: base.join("records.db"),
            documents_dir: base.join("documents"),
            base_dir: base,
        }
    }

    /// Initialize paths configuration
    pub fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = Self::paths_for(base.clone(), base.join("config.toml"));
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            debug!("Config file not found: {}", config_path.display());
            return Err(Error::NotInitialized);
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = Self::paths_for(base, config_path.to_path_buf());

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific base directory, falling back to defaults
    pub fn load_from(base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::default();
        config.init_paths(base_dir);

        if config.paths.config_file.exists() {
            debug!("Loading config from {:?}", config.paths.config_file);
            let content = std::fs::read_to_string(&config.paths.config_file)?;
            let mut loaded: Config = toml::from_str(&content)?;
            loaded.paths = config.paths;
            config = loaded;
        } else {
            debug!("No config file found, using defaults");
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Get the Qdrant API key from environment
    pub fn qdrant_api_key(&self) -> Option<String> {
        if self.qdrant_api_key_env.is_empty() {
            return None;
        }
        std::env::var(&self.qdrant_api_key_env).ok()
    }

    /// Get the extraction service API key from environment
    pub fn extraction_api_key(&self) -> Option<String> {
        std::env::var(&self.extraction.api_key_env).ok()
    }

    /// Resolved database URL for the configured record backend
    pub fn record_store_url(&self) -> Result<String> {
        match (&self.record_store.url, self.record_store.backend) {
            (Some(url), _) => Ok(url.clone()),
            (None, RecordBackend::Sqlite) => Ok(format!(
                "sqlite://{}?mode=rwc",
                self.paths.db_file.display()
            )),
            (None, RecordBackend::Postgres) => Err(Error::Config(
                "record_store.url is required for the postgres backend".to_string(),
            )),
        }
    }

    /// Directory holding backed-up originals
    pub fn documents_dir(&self) -> PathBuf {
        self.content_store
            .dir
            .clone()
            .unwrap_or_else(|| self.paths.documents_dir.clone())
    }

    /// Check if report-ingest is initialized (config file exists)
    pub fn is_initialized(&self) -> bool {
        self.paths.config_file.exists()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.embedding.dimension == 0 {
            return Err(Error::Config(
                "embedding.dimension must be positive".to_string(),
            ));
        }

        if self.embedding.batch_size == 0 {
            return Err(Error::Config(
                "embedding.batch_size must be positive".to_string(),
            ));
        }

        if self.extraction.provider == ExtractionProvider::Azure
            && self.extraction.azure_deployment.is_none()
        {
            return Err(Error::Config(
                "extraction.azure_deployment is required when provider = 'azure'".to_string(),
            ));
        }

        if self.content_store.fast_prefix_bytes == 0 {
            return Err(Error::Config(
                "content_store.fast_prefix_bytes must be positive".to_string(),
            ));
        }

        if self.pipeline.search_top_k == 0 {
            return Err(Error::Config(
                "pipeline.search_top_k must be positive".to_string(),
            ));
        }

        if self.pipeline.capability_timeout_secs == 0 {
            return Err(Error::Config(
                "pipeline.capability_timeout_secs must be positive".to_string(),
            ));
        }

        if self.pipeline.max_concurrent_documents == 0 {
            return Err(Error::Config(
                "pipeline.max_concurrent_documents must be positive".to_string(),
            ));
        }

        if self.record_store.backend == RecordBackend::Postgres && self.record_store.url.is_none()
        {
            return Err(Error::Config(
                "record_store.url is required for the postgres backend".to_string(),
            ));
        }

        Ok(())
    }
}
