//! Shared fixtures: a deterministic embedder and on-disk test catalogs.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::catalog::{self, Product};
use crate::events::EventLog;
use crate::images;
use crate::semantic::{vector, Embedder, EmbeddingError, MatchService};

/// Embeds images by their mean color and text by the color words it
/// mentions, so both land in the same 3-dimensional RGB space.
#[derive(Default)]
pub struct ColorEmbedder {
    pub image_calls: AtomicUsize,
    pub text_calls: AtomicUsize,
}

impl ColorEmbedder {
    fn image_vector(data: &[u8]) -> Result<Vec<f32>, EmbeddingError> {
        let img = images::decode(data)
            .map_err(|e| EmbeddingError::InvalidInput(format!("{e:#}")))?
            .to_rgb8();

        let mut sum = [0f32; 3];
        for pixel in img.pixels() {
            for (acc, channel) in sum.iter_mut().zip(pixel.0) {
                *acc += channel as f32;
            }
        }

        let mut v = sum.to_vec();
        vector::normalize(&mut v).map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;
        Ok(v)
    }

    fn text_vector(text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }

        let mut v = vec![0f32; 3];
        for word in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
        {
            match word {
                "red" => v[0] += 1.0,
                "green" => v[1] += 1.0,
                "blue" => v[2] += 1.0,
                _ => {}
            }
        }
        if v.iter().all(|x| *x == 0.0) {
            v = vec![1.0; 3];
        }

        vector::normalize(&mut v).map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;
        Ok(v)
    }
}

impl Embedder for ColorEmbedder {
    fn name(&self) -> &str {
        "color-stub"
    }

    fn dimensions(&self) -> usize {
        3
    }

    fn embed_images(&self, batch: &[&[u8]]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        batch.iter().map(|data| Self::image_vector(data)).collect()
    }

    fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.text_calls.fetch_add(1, Ordering::SeqCst);
        texts.iter().map(|t| Self::text_vector(t)).collect()
    }
}

/// Returns a vector one dimension longer for every image after the first.
pub struct RaggedEmbedder;

impl Embedder for RaggedEmbedder {
    fn name(&self) -> &str {
        "ragged-stub"
    }

    fn dimensions(&self) -> usize {
        2
    }

    fn embed_images(&self, batch: &[&[u8]]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok((0..batch.len())
            .map(|i| {
                let mut v = vec![0.0; 2 + i];
                v[0] = 1.0;
                v
            })
            .collect())
    }

    fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
    }
}

/// Embeds images like [`ColorEmbedder`] but returns a fixed, possibly
/// malformed, vector for every text.
pub struct FixedTextEmbedder {
    pub text_vector: Vec<f32>,
}

impl Embedder for FixedTextEmbedder {
    fn name(&self) -> &str {
        "fixed-text-stub"
    }

    fn dimensions(&self) -> usize {
        3
    }

    fn embed_images(&self, batch: &[&[u8]]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        batch.iter().map(|data| ColorEmbedder::image_vector(data)).collect()
    }

    fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|_| self.text_vector.clone()).collect())
    }
}

/// Red mug, green lamp, blue vase.
pub const PRODUCTS: [(&str, &str, [u8; 3]); 3] = [
    ("mug", "Red ceramic mug", [220, 30, 30]),
    ("lamp", "Green desk lamp", [30, 200, 40]),
    ("vase", "Blue glass vase", [20, 40, 210]),
];

pub fn solid_png(color: [u8; 3]) -> Vec<u8> {
    images::encode_png(&image::RgbImage::from_pixel(8, 8, image::Rgb(color))).unwrap()
}

/// Write `images/<id>.png` files and `data/products.jsonl` under `base`.
pub fn write_catalog(base: &Path, products: &[(&str, &str, [u8; 3])]) {
    std::fs::create_dir_all(base.join("images")).unwrap();
    std::fs::create_dir_all(base.join("data")).unwrap();

    let mut lines = Vec::new();
    for (id, name, color) in products {
        let image_path = format!("images/{id}.png");
        std::fs::write(base.join(&image_path), solid_png(*color)).unwrap();
        lines.push(
            serde_json::json!({
                "product_id": id,
                "name": name,
                "image_path": image_path,
                "category": "home",
            })
            .to_string(),
        );
    }

    std::fs::write(base.join("data/products.jsonl"), lines.join("\n")).unwrap();
}

pub fn load_catalog(base: &Path) -> Vec<Product> {
    catalog::load_products(&base.join("data/products.jsonl"), base).unwrap()
}

/// Build a service over the standard three-product catalog.
pub fn create_service() -> (MatchService, Arc<ColorEmbedder>, tempfile::TempDir) {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");
    write_catalog(tmp.path(), &PRODUCTS);

    let embedder = Arc::new(ColorEmbedder::default());
    let events = EventLog::open(&tmp.path().join("logs.jsonl")).unwrap();
    let service =
        MatchService::build(load_catalog(tmp.path()), embedder.clone(), Some(events), 3).unwrap();

    (service, embedder, tmp)
}
