//! Dense catalog matrix and the builder that fills it from product images.
//!
//! Row `i` of the matrix always belongs to product `i` of the list it was
//! built from. The matrix is never mutated after construction.

use rayon::prelude::*;

use crate::catalog::Product;
use crate::images;
use crate::semantic::embeddings::{Embedder, EmbeddingError};
use crate::semantic::vector::{self, VectorError};

/// Read-only N x D matrix of unit-length catalog embeddings.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogMatrix {
    /// Row-major storage, `len() * dimensions` values
    data: Vec<f32>,
    dimensions: usize,
}

/// Errors that can occur while building the catalog matrix.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Catalog is empty")]
    EmptyCatalog,

    #[error("Catalog inconsistency at row {row}: {reason}")]
    CatalogInconsistency { row: usize, reason: String },

    #[error("Product {product_id}: {reason}")]
    ProductImage { product_id: String, reason: String },

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),
}

impl CatalogMatrix {
    /// Assemble a matrix from per-product rows.
    ///
    /// Every row must have the dimension of the first row and unit norm.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self, IndexError> {
        let dimensions = rows.first().map(|r| r.len()).ok_or(IndexError::EmptyCatalog)?;
        if dimensions == 0 {
            return Err(IndexError::CatalogInconsistency {
                row: 0,
                reason: "zero-dimensional embedding".to_string(),
            });
        }

        let mut data = Vec::with_capacity(rows.len() * dimensions);
        for (row, embedding) in rows.into_iter().enumerate() {
            vector::check_unit(&embedding, dimensions).map_err(|e| {
                let reason = match e {
                    VectorError::DimensionMismatch { expected, got } => {
                        format!("expected {expected} dimensions, got {got}")
                    }
                    other => other.to_string(),
                };
                IndexError::CatalogInconsistency { row, reason }
            })?;
            data.extend_from_slice(&embedding);
        }

        Ok(Self { data, dimensions })
    }

    #[cfg(test)]
    pub(crate) fn empty(dimensions: usize) -> Self {
        Self {
            data: Vec::new(),
            dimensions,
        }
    }

    /// Get the embedding dimensions.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Number of rows (products).
    pub fn len(&self) -> usize {
        self.data.len() / self.dimensions
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get row `index`, if it exists.
    pub fn row(&self, index: usize) -> Option<&[f32]> {
        let start = index.checked_mul(self.dimensions)?;
        let end = start.checked_add(self.dimensions)?;
        self.data.get(start..end)
    }

    /// Iterate over rows in catalog order.
    pub fn rows(&self) -> impl ExactSizeIterator<Item = &[f32]> + '_ {
        self.data.chunks_exact(self.dimensions)
    }
}

/// Embed every product image, in list order, into a catalog matrix.
///
/// Fails as a whole if any image cannot be read or embedded, so the
/// index-to-product mapping can never be partial.
pub fn build_catalog_index(
    products: &[Product],
    embedder: &dyn Embedder,
) -> Result<CatalogMatrix, IndexError> {
    if products.is_empty() {
        return Err(IndexError::EmptyCatalog);
    }

    let started = std::time::Instant::now();
    log::info!(
        "Building catalog index for {} products with '{}'",
        products.len(),
        embedder.name()
    );

    // collect() on an indexed parallel iterator keeps product order
    let encoded = products
        .par_iter()
        .map(|product| {
            images::load_file(&product.image_file).map_err(|e| IndexError::ProductImage {
                product_id: product.id_string(),
                reason: format!("{e:#}"),
            })
        })
        .collect::<Result<Vec<Vec<u8>>, IndexError>>()?;

    let batch: Vec<&[u8]> = encoded.iter().map(Vec::as_slice).collect();
    let rows = embedder.embed_images(&batch)?;

    if rows.len() != products.len() {
        return Err(IndexError::CatalogInconsistency {
            row: rows.len().min(products.len()),
            reason: format!(
                "embedder returned {} rows for {} products",
                rows.len(),
                products.len()
            ),
        });
    }

    let matrix = CatalogMatrix::from_rows(rows)?;

    log::info!(
        "Catalog index ready: {} x {} in {:.2?}",
        matrix.len(),
        matrix.dimensions(),
        started.elapsed()
    );

    Ok(matrix)
}
