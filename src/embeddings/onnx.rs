//! ONNX sentence embedding backend.
//!
//! Runs a BERT-style sentence model (BAAI/bge-small-en-v1.5 by default)
//! through ONNX Runtime:
//! - tokenization with truncation to `max_length` and batch padding
//! - CLS pooling over the last hidden state
//! - L2 normalisation
//!
//! Inference is CPU-bound and runs on the blocking thread pool.

use std::error::Error as StdError;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ndarray::{Array2, Axis};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use tokenizers::{PaddingParams, Tokenizer, TruncationParams};

use crate::embeddings::Embedder;
use crate::error::{AppError, AppResult};
use crate::utils::l2_normalize;

type BoxError = Box<dyn StdError + Send + Sync>;

#[derive(Clone)]
pub struct OnnxEmbedder {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
    model_name: String,
    dimension: usize,
}

impl std::fmt::Debug for OnnxEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxEmbedder")
            .field("model_name", &self.model_name)
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

impl OnnxEmbedder {
    /// Loads the model and tokenizer, then probes the output dimension.
    pub async fn load(
        model_name: String,
        model_path: String,
        tokenizer_path: String,
        max_length: usize,
    ) -> AppResult<Self> {
        tokio::task::spawn_blocking(move || {
            Self::load_blocking(model_name, &model_path, &tokenizer_path, max_length)
                .map_err(|e| AppError::Embedding(e.to_string()))
        })
        .await
        .map_err(|e| AppError::Internal(format!("Model loading task failed: {e}")))?
    }

    fn load_blocking(
        model_name: String,
        model_path: &str,
        tokenizer_path: &str,
        max_length: usize,
    ) -> Result<Self, BoxError> {
        if !Path::new(model_path).exists() {
            return Err(format!("ONNX model file not found: {model_path}").into());
        }
        if !Path::new(tokenizer_path).exists() {
            return Err(format!("Tokenizer file not found: {tokenizer_path}").into());
        }

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(model_path)?;

        let mut tokenizer = Tokenizer::from_file(tokenizer_path)?;
        tokenizer.with_truncation(Some(TruncationParams {
            max_length,
            ..TruncationParams::default()
        }))?;
        tokenizer.with_padding(Some(PaddingParams::default()));

        let mut embedder = Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            model_name,
            dimension: 0,
        };

        let probe = embedder.infer(&["dimension probe".to_string()])?;
        embedder.dimension = probe.first().map_or(0, Vec::len);
        if embedder.dimension == 0 {
            return Err("Model produced an empty embedding".into());
        }

        tracing::info!(
            model = %embedder.model_name,
            dimension = embedder.dimension,
            max_length,
            "ONNX embedding model loaded"
        );

        Ok(embedder)
    }

    #[allow(clippy::cast_possible_wrap)]
    fn infer(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BoxError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = self.tokenizer.encode_batch(texts.to_vec(), true)?;
        let batch = encodings.len();
        let seq_len = encodings.iter().map(|e| e.get_ids().len()).max().unwrap_or(0);

        let mut input_ids = Vec::with_capacity(batch * seq_len);
        let mut attention_mask = Vec::with_capacity(batch * seq_len);
        for encoding in &encodings {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            for i in 0..seq_len {
                input_ids.push(ids.get(i).map_or(0, |&id| i64::from(id)));
                attention_mask.push(mask.get(i).map_or(0, |&m| i64::from(m)));
            }
        }

        let input_ids = Array2::from_shape_vec((batch, seq_len), input_ids)?;
        let attention_mask = Array2::from_shape_vec((batch, seq_len), attention_mask)?;
        let token_type_ids = Array2::<i64>::zeros((batch, seq_len));

        let mut session = self
            .session
            .lock()
            .map_err(|_| "ONNX session lock poisoned")?;
        let outputs = session.run(ort::inputs![
            "input_ids" => Value::from_array(input_ids)?,
            "attention_mask" => Value::from_array(attention_mask)?,
            "token_type_ids" => Value::from_array(token_type_ids)?
        ])?;

        // [batch, seq_len, hidden]
        let hidden = outputs[0].try_extract_array::<f32>()?;
        if hidden.ndim() != 3 {
            return Err(format!("Unexpected output shape {:?}", hidden.shape()).into());
        }

        let mut vectors = Vec::with_capacity(batch);
        for row in hidden.axis_iter(Axis(0)) {
            let mut cls: Vec<f32> = row.index_axis(Axis(0), 0).iter().copied().collect();
            l2_normalize(&mut cls);
            vectors.push(cls);
        }

        Ok(vectors)
    }

    async fn infer_async(&self, texts: Vec<String>) -> AppResult<Vec<Vec<f32>>> {
        let model = self.clone();
        tokio::task::spawn_blocking(move || {
            model
                .infer(&texts)
                .map_err(|e| AppError::Embedding(e.to_string()))
        })
        .await
        .map_err(|e| AppError::Internal(format!("Embedding task failed: {e}")))?
    }
}

#[async_trait]
impl Embedder for OnnxEmbedder {
    fn name(&self) -> &str {
        &self.model_name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        self.infer_async(vec![text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| AppError::Embedding("Model returned no embedding".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        self.infer_async(texts.to_vec()).await
    }
}
