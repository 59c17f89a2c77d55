//! Embedding and retrieval for product matching.
//!
//! Images and text are embedded into one vector space and matched against
//! an in-memory catalog matrix by cosine similarity.
//!
//! # Architecture
//!
//! - `vector`: unit-vector contract shared by every stage
//! - `embeddings`: `Embedder` trait and the fastembed CLIP backend
//! - `index`: dense catalog matrix, built once from product images
//! - `search`: brute-force top-k search with deterministic ranking
//! - `service`: query service tying catalog, embedder and event log together

pub mod embeddings;
mod index;
mod search;
mod service;
pub mod vector;

pub use embeddings::{ClipEmbedder, Embedder, EmbeddingError};
pub use index::{build_catalog_index, CatalogMatrix, IndexError};
pub use search::{search, SearchError, SearchResult};
pub use service::{
    HealthResponse, MatchError, MatchResponse, MatchService, QueryInfo, RankedProduct, TopMatch,
};
