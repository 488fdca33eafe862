//! Command implementations for the silt CLI

pub mod fields;
pub mod ingest;
pub mod parse;
pub mod promote;
pub mod purge;
pub mod serve;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use silt_config::Config;
use silt_schema::SchemaRegistry;
use silt_store::Store;

/// Paths tried when `--config` is not given
const DEFAULT_CONFIG_PATHS: &[&str] = &["configs/silt.toml", "silt.toml"];

/// Load configuration: explicit path must exist, otherwise defaults apply
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    if let Some(path) = path {
        if !path.exists() {
            anyhow::bail!("config file not found: {}", path.display());
        }
        return Config::from_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()));
    }

    for candidate in DEFAULT_CONFIG_PATHS.iter().map(PathBuf::from) {
        if candidate.exists() {
            return Config::from_file(&candidate).with_context(|| {
                format!("failed to load configuration from {}", candidate.display())
            });
        }
    }

    Ok(Config::default())
}

/// Store plus registry, shared by most commands
pub struct Components {
    pub store: Arc<dyn Store>,
    pub registry: Arc<SchemaRegistry>,
}

impl Components {
    pub async fn open(config: &Config) -> Result<Self> {
        let store = silt_store::open(&config.store)
            .await
            .with_context(|| format!("failed to open store at {}", config.store.url))?;
        let registry = Arc::new(SchemaRegistry::new(Arc::clone(&store), config.schema.clone()));
        Ok(Self { store, registry })
    }
}
