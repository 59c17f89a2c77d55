use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::{
    catalog,
    config::Config,
    events::EventLog,
    semantic::{ClipEmbedder, Embedder, IndexError, MatchService},
};

/// Builds the process-wide match service from configuration.
pub struct AppFactory;

impl AppFactory {
    /// Load the catalog, the embedding model and the event log, then embed
    /// the catalog. Returns only once the service can answer queries.
    pub fn create_service(config: &Config) -> Result<MatchService> {
        let embedder = Self::create_embedder(config)?;
        Self::create_service_with(config, embedder)
    }

    /// Same as [`AppFactory::create_service`] with a caller supplied embedder.
    pub fn create_service_with(
        config: &Config,
        embedder: Arc<dyn Embedder>,
    ) -> Result<MatchService> {
        let products_file = config.products_file();
        let products = catalog::load_products(&products_file, config.base_path())
            .with_context(|| format!("failed to load catalog {}", products_file.display()))?;

        if products.is_empty() {
            return Err(IndexError::EmptyCatalog)
                .with_context(|| format!("no products found in {}", products_file.display()));
        }
        log::info!(
            "Loaded {} products from {}",
            products.len(),
            products_file.display()
        );

        let log_file = config.log_file();
        let events = EventLog::open(&log_file)
            .with_context(|| format!("failed to open event log {}", log_file.display()))?;

        MatchService::build(products, embedder, Some(events), config.top_k)
            .context("failed to build catalog index")
    }

    fn create_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
        let cache_dir = PathBuf::from(config.base_path());
        let embedder = ClipEmbedder::new(
            &config.embedding.model,
            cache_dir,
            config.embedding.batch_size,
        )
        .context("failed to initialize embedding model")?;

        Ok(Arc::new(embedder))
    }
}
