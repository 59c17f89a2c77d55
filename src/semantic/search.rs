//! Brute-force top-k similarity search over the catalog matrix.

use std::cmp::Ordering;

use serde::Serialize;

use crate::semantic::index::CatalogMatrix;
use crate::semantic::vector::{self, VectorError};

/// One ranked search hit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SearchResult {
    /// 1-based rank
    pub rank: usize,
    /// Row in the catalog matrix (== position in the product list)
    pub index: usize,
    /// Cosine similarity score (-1.0 to 1.0)
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SearchError {
    #[error("Catalog is empty")]
    EmptyCatalog,

    #[error("Result count must be at least 1")]
    ZeroLimit,

    #[error("Invalid query vector: {0}")]
    InvalidQuery(#[from] VectorError),
}

/// Return the `k` catalog rows most similar to `query`.
///
/// `query` must already be unit length; scores are plain dot products.
/// Results are ordered by score descending, equal scores by ascending row.
/// `k` larger than the catalog is clamped to the catalog size.
pub fn search(
    matrix: &CatalogMatrix,
    query: &[f32],
    k: usize,
) -> Result<Vec<SearchResult>, SearchError> {
    if matrix.is_empty() {
        return Err(SearchError::EmptyCatalog);
    }
    if k == 0 {
        return Err(SearchError::ZeroLimit);
    }
    vector::check_shape(query, matrix.dimensions())?;

    let mut scored: Vec<(usize, f32)> = matrix
        .rows()
        .enumerate()
        .map(|(index, row)| (index, vector::dot(query, row)))
        .collect();

    let k = k.min(scored.len());
    if k < scored.len() {
        scored.select_nth_unstable_by(k - 1, rank_order);
        scored.truncate(k);
    }
    scored.sort_unstable_by(rank_order);

    Ok(scored
        .into_iter()
        .enumerate()
        .map(|(i, (index, score))| SearchResult {
            rank: i + 1,
            index,
            score,
        })
        .collect())
}

/// Total order: higher score first, then lower index.
fn rank_order(a: &(usize, f32), b: &(usize, f32)) -> Ordering {
    b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0))
}
