//! Init command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use crate::meta::open_record_store;
use crate::models::Source;
use crate::store::{QdrantIndex, SemanticIndex};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct InitOptions {
    pub base_dir: PathBuf,
    pub config_path: PathBuf,
    pub force: bool,
    /// Also create the per-source Qdrant collections
    pub create_collections: bool,
}

/// Write the default configuration and create the record schema
pub async fn cmd_init(options: InitOptions) -> Result<Config> {
    let InitOptions {
        base_dir,
        config_path,
        force,
        create_collections,
    } = options;

    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Config already exists at {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    let mut config = Config::default();
    config.init_paths(Some(base_dir.clone()));
    config.paths.config_file = config_path.clone();
    config.validate()?;

    std::fs::create_dir_all(&base_dir)?;
    if config.content_store.enabled {
        std::fs::create_dir_all(config.documents_dir())?;
    }
    config.save()?;
    info!("Created config at {:?}", config_path);

    let records = open_record_store(&config).await?;
    records.init_schema().await?;
    info!("Initialized {} record store", config.record_store.backend);

    if create_collections {
        ensure_collections(&config).await;
    }

    Ok(config)
}

async fn ensure_collections(config: &Config) {
    let index = match QdrantIndex::connect(config) {
        Ok(index) => index,
        Err(e) => {
            warn!("Could not connect to Qdrant: {}. Collections are created on first use.", e);
            return;
        }
    };

    for source in Source::ALL {
        let collection = source.collection_name();
        match index.ensure_collection(&collection).await {
            Ok(()) => info!("Qdrant collection '{}' ready", collection),
            Err(e) => {
                warn!(
                    "Could not create Qdrant collection '{}': {}. It is created on first use.",
                    collection, e
                );
                return;
            }
        }
    }
}
