//! Model-free embedder based on feature hashing.
//!
//! Each whitespace token contributes its lowercase form and its character
//! trigrams (with `<`/`>` boundary markers). Features are hashed with xxh3
//! into `dimension` buckets; one hash bit picks the sign so collisions tend to
//! cancel. The result is L2-normalised, so cosine similarity reflects shared
//! spelling. Useful for development and tests where no ONNX model is present.

use async_trait::async_trait;
use xxhash_rust::xxh3::xxh3_64;

use crate::embeddings::Embedder;
use crate::error::AppResult;
use crate::utils::l2_normalize;

const TRIGRAM: usize = 3;

#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    /// Synchronous embedding; never fails.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimension];
        if self.dimension == 0 {
            return vector;
        }

        for token in text.split_whitespace() {
            let lower = token.to_lowercase();
            self.add_feature(&mut vector, &format!("w:{lower}"));

            let marked: Vec<char> = format!("<{lower}>").chars().collect();
            for window in marked.windows(TRIGRAM) {
                let gram: String = window.iter().collect();
                self.add_feature(&mut vector, &format!("g:{gram}"));
            }
        }

        l2_normalize(&mut vector);
        vector
    }

    #[allow(clippy::cast_possible_truncation)]
    fn add_feature(&self, vector: &mut [f32], feature: &str) {
        let hash = xxh3_64(feature.as_bytes());
        let index = (hash % self.dimension as u64) as usize;
        let sign = if hash >> 63 == 1 { -1.0 } else { 1.0 };
        vector[index] += sign;
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing-trigram"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        Ok(self.embed_text(text))
    }
}
