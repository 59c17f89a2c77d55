use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::semantic::ClipEmbedder;

const CONFIG_FILE: &str = "config.yaml";

const DEFAULT_PRODUCTS_PATH: &str = "data/products.jsonl";
const DEFAULT_LOG_PATH: &str = "logs.jsonl";
const DEFAULT_TOP_K: usize = 3;
const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
/// Default upload limit for query images (20 MiB)
const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;
/// Default embedding model (CLIP ViT-B/32, 512 dims)
const DEFAULT_MODEL: &str = "clip-vit-b-32";

/// Configuration for the embedding backend
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model pair name (e.g., "clip-vit-b-32")
    #[serde(default = "default_model")]
    pub model: String,

    /// Inference batch size, backend default when unset
    #[serde(default)]
    pub batch_size: Option<usize>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            batch_size: None,
        }
    }
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Product catalog, one JSON object per line (relative to base dir)
    #[serde(default = "default_products_path")]
    pub products_path: String,

    /// Query event log (relative to base dir)
    #[serde(default = "default_log_path")]
    pub log_path: String,

    /// Number of matches returned when a request doesn't ask for a count
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            products_path: default_products_path(),
            log_path: default_log_path(),
            top_k: DEFAULT_TOP_K,
            listen_addr: default_listen_addr(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            embedding: EmbeddingConfig::default(),
            base_path: PathBuf::new(),
        }
    }
}

fn default_products_path() -> String {
    DEFAULT_PRODUCTS_PATH.to_string()
}

fn default_log_path() -> String {
    DEFAULT_LOG_PATH.to_string()
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

fn default_max_upload_bytes() -> usize {
    DEFAULT_MAX_UPLOAD_BYTES
}

impl Config {
    fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            bail!("top_k must be greater than 0");
        }

        if self.max_upload_bytes == 0 {
            bail!("max_upload_bytes must be greater than 0");
        }

        self.listen_addr
            .parse::<SocketAddr>()
            .with_context(|| format!("listen_addr '{}' is not a socket address", self.listen_addr))?;

        ClipEmbedder::parse_model_name(&self.embedding.model)?;

        if self.embedding.batch_size == Some(0) {
            bail!("embedding.batch_size must be greater than 0");
        }

        Ok(())
    }

    /// Load `config.yaml` from `base_path`, creating it with defaults if
    /// it does not exist.
    pub fn load_with(base_path: &Path) -> Result<Self> {
        let config_path = base_path.join(CONFIG_FILE);

        // create new if does not exist
        if !config_path.exists() {
            std::fs::create_dir_all(base_path)
                .with_context(|| format!("failed to create {}", base_path.display()))?;
            std::fs::write(&config_path, serde_yml::to_string(&Self::default())?)
                .with_context(|| format!("failed to write {}", config_path.display()))?;
        }

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        let mut config: Self = serde_yml::from_str(&config_str)
            .with_context(|| format!("{} is malformed", config_path.display()))?;

        config.base_path = base_path.to_path_buf();

        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = self.base_path.join(CONFIG_FILE);
        let config_str = serde_yml::to_string(&self)?;
        std::fs::write(&config_path, config_str)
            .with_context(|| format!("failed to write {}", config_path.display()))
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn products_file(&self) -> PathBuf {
        self.base_path.join(&self.products_path)
    }

    pub fn log_file(&self) -> PathBuf {
        self.base_path.join(&self.log_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_creates_default_config() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::load_with(tmp.path()).unwrap();

        assert!(tmp.path().join(CONFIG_FILE).exists());
        assert_eq!(config.top_k, 3);
        assert_eq!(config.embedding.model, "clip-vit-b-32");
        assert_eq!(config.products_file(), tmp.path().join("data/products.jsonl"));
        assert_eq!(config.log_file(), tmp.path().join("logs.jsonl"));
    }

    #[test]
    fn test_partial_config_gets_defaults_and_is_resaved() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILE), "top_k: 5\n").unwrap();

        let config = Config::load_with(tmp.path()).unwrap();
        assert_eq!(config.top_k, 5);
        assert_eq!(config.listen_addr, "0.0.0.0:8080");

        let saved = std::fs::read_to_string(tmp.path().join(CONFIG_FILE)).unwrap();
        assert!(saved.contains("listen_addr"));
    }

    #[test]
    fn test_zero_top_k_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILE), "top_k: 0\n").unwrap();

        let err = Config::load_with(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("top_k"));
    }

    #[test]
    fn test_unknown_model_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join(CONFIG_FILE),
            "embedding:\n  model: word2vec\n",
        )
        .unwrap();

        assert!(Config::load_with(tmp.path()).is_err());
    }

    #[test]
    fn test_bad_listen_addr_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILE), "listen_addr: localhost\n").unwrap();

        assert!(Config::load_with(tmp.path()).is_err());
    }

    #[test]
    fn test_malformed_config() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILE), "top_k: [1, 2\n").unwrap();

        let err = Config::load_with(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("malformed"));
    }
}
