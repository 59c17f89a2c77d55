//! Product catalog model and line-delimited JSON loader.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A catalog product.
///
/// Fields other than `product_id`, `name` and `image_path` are kept in
/// `metadata` and serialized back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub product_id: Value,
    pub name: String,
    pub image_path: String,

    #[serde(flatten)]
    pub metadata: Map<String, Value>,

    /// `image_path` resolved against the catalog's image root
    #[serde(skip)]
    pub image_file: PathBuf,
}

impl Product {
    /// Product id rendered for logs and error messages.
    pub fn id_string(&self) -> String {
        match &self.product_id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("line {line}: product_id must be a string, number or boolean")]
    InvalidId { line: usize },

    #[error("line {line}: duplicate product_id {id}")]
    DuplicateId { line: usize, id: String },
}

/// Load products from a JSONL file, one object per line.
///
/// Blank lines are skipped. Relative image paths are resolved against
/// `image_root`. Product order follows line order.
pub fn load_products(path: &Path, image_root: &Path) -> Result<Vec<Product>, CatalogError> {
    let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    parse_products(&content, image_root)
}

/// Parse JSONL catalog content.
pub fn parse_products(content: &str, image_root: &Path) -> Result<Vec<Product>, CatalogError> {
    let mut products = Vec::new();
    let mut seen = HashSet::new();

    for (idx, line) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut product: Product = serde_json::from_str(line).map_err(|source| {
            CatalogError::Parse {
                line: line_no,
                source,
            }
        })?;

        match product.product_id {
            Value::String(_) | Value::Number(_) | Value::Bool(_) => {}
            _ => return Err(CatalogError::InvalidId { line: line_no }),
        }

        // ids compare by their JSON form, so "1" and 1 stay distinct
        if !seen.insert(product.product_id.to_string()) {
            return Err(CatalogError::DuplicateId {
                line: line_no,
                id: product.id_string(),
            });
        }

        product.image_file = resolve_image_path(&product.image_path, image_root);
        products.push(product);
    }

    Ok(products)
}

fn resolve_image_path(image_path: &str, image_root: &Path) -> PathBuf {
    let path = PathBuf::from(image_path);
    if path.is_absolute() {
        path
    } else {
        image_root.join(path)
    }
}
