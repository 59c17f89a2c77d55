//! Product matching service.
//!
//! Owns everything a query needs for the lifetime of the process:
//! - the product list and its catalog matrix (built once, read-only)
//! - the embedding backend
//! - the optional query event log
//!
//! `MatchService` is `Sync`; handlers share it behind an `Arc` without locks.

use std::sync::Arc;

use serde::Serialize;

use crate::catalog::Product;
use crate::events::{EventLog, QueryEvent, QueryKind};
use crate::semantic::embeddings::{Embedder, EmbeddingError};
use crate::semantic::index::{build_catalog_index, CatalogMatrix, IndexError};
use crate::semantic::search::{search, SearchError, SearchResult};
use crate::semantic::vector;

/// Errors that can occur while answering a match query.
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    /// Rejected request; the reason is meant for the caller
    #[error("{0}")]
    InvalidInput(String),

    #[error("Embedding error: {0}")]
    Embedding(EmbeddingError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),
}

impl From<EmbeddingError> for MatchError {
    fn from(err: EmbeddingError) -> Self {
        match err {
            EmbeddingError::InvalidInput(reason) => MatchError::InvalidInput(reason),
            other => MatchError::Embedding(other),
        }
    }
}

/// What the caller asked for, echoed back in the response.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopMatch {
    pub score: f32,
    pub product: Product,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedProduct {
    pub rank: usize,
    pub score: f32,
    pub product: Product,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResponse {
    pub query: QueryInfo,
    pub top1: TopMatch,
    pub topk: Vec<RankedProduct>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub num_products: usize,
    pub embedding_dim: usize,
    pub model: String,
}

pub struct MatchService {
    products: Vec<Product>,
    matrix: CatalogMatrix,
    embedder: Arc<dyn Embedder>,
    events: Option<EventLog>,
    default_k: usize,
}

impl MatchService {
    /// Embed the whole catalog and return a ready service.
    ///
    /// Blocks until the catalog matrix is complete; any failure is fatal and
    /// no service is returned.
    pub fn build(
        products: Vec<Product>,
        embedder: Arc<dyn Embedder>,
        events: Option<EventLog>,
        default_k: usize,
    ) -> Result<Self, IndexError> {
        let matrix = build_catalog_index(&products, embedder.as_ref())?;

        if matrix.dimensions() != embedder.dimensions() {
            return Err(IndexError::CatalogInconsistency {
                row: 0,
                reason: format!(
                    "embedder reports {} dimensions but produced {}",
                    embedder.dimensions(),
                    matrix.dimensions()
                ),
            });
        }

        Ok(Self {
            products,
            matrix,
            embedder,
            events,
            default_k: default_k.max(1),
        })
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn matrix(&self) -> &CatalogMatrix {
        &self.matrix
    }

    pub fn default_k(&self) -> usize {
        self.default_k
    }

    pub fn health(&self) -> HealthResponse {
        HealthResponse {
            status: "ok",
            num_products: self.products.len(),
            embedding_dim: self.matrix.dimensions(),
            model: self.embedder.name().to_string(),
        }
    }

    /// Match an encoded image against the catalog.
    pub fn match_image(
        &self,
        image: &[u8],
        filename: Option<&str>,
        k: Option<usize>,
    ) -> Result<MatchResponse, MatchError> {
        let k = self.resolve_k(k)?;
        if image.is_empty() {
            return Err(MatchError::InvalidInput("Invalid image: empty upload".to_string()));
        }

        let embedding = self.embedder.embed_image(image).map_err(|e| match e {
            EmbeddingError::InvalidInput(reason) => {
                MatchError::InvalidInput(format!("Invalid image: {reason}"))
            }
            other => other.into(),
        })?;

        let query = QueryInfo {
            filename: filename.map(str::to_string),
            text: None,
        };
        let response = self.rank(&embedding, k, query)?;

        let mut event = QueryEvent::new(
            QueryKind::Image,
            response.top1.product.product_id.clone(),
            response.top1.score,
        );
        event.filename = response.query.filename.clone();
        self.record(&event);

        Ok(response)
    }

    /// Match a text description against the catalog.
    ///
    /// Blank text is rejected before the embedder or catalog is touched.
    pub fn match_text(&self, text: &str, k: Option<usize>) -> Result<MatchResponse, MatchError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(MatchError::InvalidInput("Empty text".to_string()));
        }
        let k = self.resolve_k(k)?;

        let embedding = self.embedder.embed_text(text)?;

        let query = QueryInfo {
            filename: None,
            text: Some(text.to_string()),
        };
        let response = self.rank(&embedding, k, query)?;

        let mut event = QueryEvent::new(
            QueryKind::Text,
            response.top1.product.product_id.clone(),
            response.top1.score,
        );
        event.text = Some(text.to_string());
        self.record(&event);

        Ok(response)
    }

    fn resolve_k(&self, k: Option<usize>) -> Result<usize, MatchError> {
        match k {
            Some(0) => Err(MatchError::InvalidInput(
                "k must be at least 1".to_string(),
            )),
            Some(k) => Ok(k),
            None => Ok(self.default_k),
        }
    }

    fn rank(&self, embedding: &[f32], k: usize, query: QueryInfo) -> Result<MatchResponse, MatchError> {
        // the embedder promises unit vectors; search relies on it
        vector::check_unit(embedding, self.matrix.dimensions())
            .map_err(|e| EmbeddingError::EmbeddingFailed(format!("query embedding: {e}")))?;

        let results = search(&self.matrix, embedding, k)?;

        let topk: Vec<RankedProduct> = results
            .iter()
            .map(|r: &SearchResult| RankedProduct {
                rank: r.rank,
                score: r.score,
                product: self.products[r.index].clone(),
            })
            .collect();

        // search never returns an empty list for a non-empty catalog
        let top1 = topk
            .first()
            .map(|best| TopMatch {
                score: best.score,
                product: best.product.clone(),
            })
            .ok_or(SearchError::EmptyCatalog)?;

        Ok(MatchResponse { query, top1, topk })
    }

    fn record(&self, event: &QueryEvent) {
        let Some(events) = &self.events else {
            return;
        };

        if let Err(e) = events.append(event) {
            log::warn!(
                "failed to append query event to {}: {}",
                events.path().display(),
                e
            );
        }
    }
}
