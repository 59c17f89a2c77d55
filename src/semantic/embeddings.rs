//! Embedding backends.
//!
//! The [`Embedder`] trait is the only thing the catalog builder and the
//! query service know about. [`ClipEmbedder`] implements it with fastembed's
//! paired vision/text models, which project images and text into one space.

use fastembed::{ImageEmbedding, ImageInitOptions, InitOptions, TextEmbedding};
use std::path::PathBuf;
use std::sync::Mutex;

use crate::images;
use crate::semantic::vector;

/// Error type for embedding operations
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Model initialization failed: {0}")]
    InitFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Invalid model name: {0}")]
    InvalidModel(String),
}

/// Produces unit-length vectors for images and text in a shared space.
///
/// Implementations must be deterministic for identical input and must
/// return one row per input, in input order. Images are passed as encoded
/// bytes; decoding is part of the embedder's preprocessing.
pub trait Embedder: Send + Sync {
    /// Human readable model identifier
    fn name(&self) -> &str;

    /// Dimension of every vector this embedder returns
    fn dimensions(&self) -> usize;

    fn embed_images(&self, images: &[&[u8]]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embed a single image as a one-element batch.
    fn embed_image(&self, image: &[u8]) -> Result<Vec<f32>, EmbeddingError> {
        single(self.embed_images(&[image])?)
    }

    /// Embed a single text as a one-element batch.
    ///
    /// Whitespace-only text is rejected before the backend is touched.
    fn embed_text(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }
        single(self.embed_texts(&[text.to_string()])?)
    }
}

fn single(rows: Vec<Vec<f32>>) -> Result<Vec<f32>, EmbeddingError> {
    rows.into_iter()
        .next()
        .ok_or_else(|| EmbeddingError::EmbeddingFailed("No embedding returned".to_string()))
}

/// Normalize raw backend output so every row satisfies the vector contract.
fn finalize_rows(
    mut rows: Vec<Vec<f32>>,
    expected_rows: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if rows.len() != expected_rows {
        return Err(EmbeddingError::EmbeddingFailed(format!(
            "Backend returned {} embeddings for {} inputs",
            rows.len(),
            expected_rows
        )));
    }

    for (i, row) in rows.iter_mut().enumerate() {
        vector::normalize(row)
            .map_err(|e| EmbeddingError::EmbeddingFailed(format!("Embedding #{i}: {e}")))?;
    }

    Ok(rows)
}

fn prefixed(texts: &[String], prefix: Option<&str>) -> Vec<String> {
    match prefix {
        Some(prefix) => texts.iter().map(|t| format!("{prefix}{t}")).collect(),
        None => texts.to_vec(),
    }
}

/// Pair of fastembed models sharing one embedding space.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelPair {
    pub image: fastembed::ImageEmbeddingModel,
    pub text: fastembed::EmbeddingModel,
    /// Task prefix the text half expects before it lines up with the vision half
    pub text_prefix: Option<&'static str>,
}

/// fastembed-backed CLIP style embedder.
///
/// fastembed's embed() requires &mut self, so each model sits behind a
/// Mutex. Concurrent queries are serialized per modality.
pub struct ClipEmbedder {
    image_model: Mutex<ImageEmbedding>,
    text_model: Mutex<TextEmbedding>,
    model_name: String,
    text_prefix: Option<&'static str>,
    dimensions: usize,
    batch_size: Option<usize>,
}

impl ClipEmbedder {
    /// Load the image and text halves of the named model.
    ///
    /// Models are downloaded on first use and cached in `cache_dir/models`.
    pub fn new(
        model_name: &str,
        cache_dir: PathBuf,
        batch_size: Option<usize>,
    ) -> Result<Self, EmbeddingError> {
        let pair = Self::parse_model_name(model_name)?;

        let models_dir = cache_dir.join("models");
        std::fs::create_dir_all(&models_dir).map_err(|e| {
            EmbeddingError::InitFailed(format!("Failed to create models directory: {}", e))
        })?;

        log::info!("Loading embedding model '{}'", model_name);

        let text_options = InitOptions::new(pair.text)
            .with_cache_dir(models_dir.clone())
            .with_show_download_progress(true);
        let mut text_model = TextEmbedding::try_new(text_options)
            .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;

        let image_options = ImageInitOptions::new(pair.image)
            .with_cache_dir(models_dir)
            .with_show_download_progress(true);
        let mut image_model = ImageEmbedding::try_new(image_options)
            .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;

        let dimensions = Self::probe_dimensions(&mut text_model, &mut image_model)?;
        log::info!("Embedding model '{}' ready ({} dims)", model_name, dimensions);

        Ok(Self {
            image_model: Mutex::new(image_model),
            text_model: Mutex::new(text_model),
            model_name: model_name.to_string(),
            text_prefix: pair.text_prefix,
            dimensions,
            batch_size,
        })
    }

    /// Parse model name string to a pair of fastembed models.
    pub fn parse_model_name(name: &str) -> Result<ModelPair, EmbeddingError> {
        match name.to_lowercase().as_str() {
            "clip-vit-b-32" | "clipvitb32" => Ok(ModelPair {
                image: fastembed::ImageEmbeddingModel::ClipVitB32,
                text: fastembed::EmbeddingModel::ClipVitB32,
                text_prefix: None,
            }),
            "nomic-embed-v1.5" | "nomicembedv15" => Ok(ModelPair {
                image: fastembed::ImageEmbeddingModel::NomicEmbedVisionV15,
                text: fastembed::EmbeddingModel::NomicEmbedTextV15,
                text_prefix: Some("search_query: "),
            }),
            _ => Err(EmbeddingError::InvalidModel(format!(
                "Unknown model: {}. Supported models: clip-vit-b-32, nomic-embed-v1.5",
                name
            ))),
        }
    }

    /// Embed a probe text and a probe image; both halves must agree on the
    /// output dimension or they cannot share a space.
    fn probe_dimensions(
        text_model: &mut TextEmbedding,
        image_model: &mut ImageEmbedding,
    ) -> Result<usize, EmbeddingError> {
        let text_dims = text_model
            .embed(vec!["test"], None)
            .map_err(|e| EmbeddingError::InitFailed(format!("Failed to probe dimensions: {}", e)))?
            .first()
            .map(|v| v.len())
            .ok_or_else(|| EmbeddingError::InitFailed("Model returned no embedding".to_string()))?;

        let probe = images::encode_png(&image::RgbImage::from_pixel(
            8,
            8,
            image::Rgb([127, 127, 127]),
        ))
        .map_err(|e| EmbeddingError::InitFailed(format!("{e:#}")))?;

        let image_dims = image_model
            .embed_bytes(&[probe.as_slice()], None)
            .map_err(|e| EmbeddingError::InitFailed(format!("Failed to probe dimensions: {}", e)))?
            .first()
            .map(|v| v.len())
            .ok_or_else(|| EmbeddingError::InitFailed("Model returned no embedding".to_string()))?;

        if text_dims != image_dims {
            return Err(EmbeddingError::InitFailed(format!(
                "Text model produces {} dims but image model produces {}",
                text_dims, image_dims
            )));
        }

        Ok(text_dims)
    }
}

impl Embedder for ClipEmbedder {
    fn name(&self) -> &str {
        &self.model_name
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_images(&self, batch: &[&[u8]]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if batch.is_empty() {
            return Ok(vec![]);
        }

        for (i, data) in batch.iter().enumerate() {
            images::decode(data)
                .map_err(|e| EmbeddingError::InvalidInput(format!("Image #{i}: {e:#}")))?;
        }

        let mut model = self.image_model.lock().map_err(|e| {
            EmbeddingError::EmbeddingFailed(format!("Failed to acquire model lock: {}", e))
        })?;

        let rows = model
            .embed_bytes(batch, self.batch_size)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;

        finalize_rows(rows, batch.len())
    }

    fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        if let Some(i) = texts.iter().position(|t| t.trim().is_empty()) {
            return Err(EmbeddingError::InvalidInput(format!("Text #{i} is empty")));
        }

        let mut model = self.text_model.lock().map_err(|e| {
            EmbeddingError::EmbeddingFailed(format!("Failed to acquire model lock: {}", e))
        })?;

        let inputs = prefixed(texts, self.text_prefix);
        let rows = model
            .embed(inputs, self.batch_size)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;

        finalize_rows(rows, texts.len())
    }
}
