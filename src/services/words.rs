//! Word indexing and search.
//!
//! Shared by the HTTP handlers and the word-list loader.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use validator::Validate;

use crate::api::schemas::{SearchHit, SearchQuery, WordItem};
use crate::embeddings::Embedder;
use crate::error::{AppError, AppResult, ValidationErrorExt};
use crate::models::{WordPayload, WordPoint};
use crate::store::VectorStore;

#[derive(Clone)]
pub struct WordService {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
}

/// Parsed contents of a newline-delimited word list.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct WordList {
    /// Non-blank, non-comment lines seen.
    pub read: usize,
    /// Distinct words in first-seen order.
    pub words: Vec<String>,
}

/// Counts reported by [`WordService::load_words`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub read: usize,
    pub unique: usize,
    pub inserted: usize,
}

/// Parses a word list: one word per line, `#` starts a comment line.
/// Duplicates are dropped case-sensitively, keeping the first occurrence.
pub fn parse_word_list(content: &str) -> WordList {
    let mut seen = HashSet::new();
    let mut list = WordList::default();

    for line in content.lines() {
        let word = line.trim();
        if word.is_empty() || word.starts_with('#') {
            continue;
        }
        list.read += 1;
        if seen.insert(word) {
            list.words.push(word.to_string());
        }
    }

    list
}

impl WordService {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// Embeds the word and stores it with its details. Returns the point id.
    pub async fn add_word(&self, item: &WordItem) -> AppResult<String> {
        item.validate().map_err(|e| e.to_validation_error())?;

        let word = item.word.trim();
        let vector = self.embedder.embed(word).await?;
        let payload = WordPayload {
            word: word.to_string(),
            meaning: item.meaning.clone(),
            synonyms: item.synonyms.clone(),
            antonyms: item.antonyms.clone(),
            examples: item.examples.clone(),
            added_at: Some(Utc::now()),
            category: None,
            category_id: None,
        };

        let point = WordPoint::new(vector, payload);
        let id = point.id.clone();
        self.store.upsert(vec![point]).await?;

        tracing::info!(word = %word, point_id = %id, "Word added");
        Ok(id)
    }

    /// Finds the words closest in meaning to `query.word`.
    pub async fn search_words(&self, query: &SearchQuery) -> AppResult<Vec<SearchHit>> {
        query.validate().map_err(|e| e.to_validation_error())?;

        let word = query.word.trim();
        let vector = self.embedder.embed(word).await?;
        let hits = self.store.search(&vector, query.limit).await?;

        tracing::debug!(word = %word, limit = query.limit, hits = hits.len(), "Search completed");
        Ok(hits.into_iter().map(SearchHit::from).collect())
    }

    /// Embeds and stores a batch of bare words. Returns how many were written.
    pub async fn insert_bare_words(&self, words: &[String]) -> AppResult<usize> {
        if words.is_empty() {
            return Ok(0);
        }

        let vectors = self.embedder.embed_batch(words).await?;
        if vectors.len() != words.len() {
            return Err(AppError::Embedding(format!(
                "Expected {} embeddings, got {}",
                words.len(),
                vectors.len()
            )));
        }

        let points: Vec<WordPoint> = words
            .iter()
            .zip(vectors)
            .map(|(word, vector)| WordPoint::new(vector, WordPayload::bare(word.clone())))
            .collect();
        let count = points.len();

        self.store.upsert(points).await?;
        Ok(count)
    }

    /// Loads a newline-delimited word list in batches of `batch_size`.
    ///
    /// `on_batch` receives the number of words written by each batch.
    pub async fn load_words<F>(
        &self,
        content: &str,
        batch_size: usize,
        mut on_batch: F,
    ) -> AppResult<LoadStats>
    where
        F: FnMut(usize),
    {
        let list = parse_word_list(content);
        let mut stats = LoadStats {
            read: list.read,
            unique: list.words.len(),
            inserted: 0,
        };

        for batch in list.words.chunks(batch_size.max(1)) {
            let written = self.insert_bare_words(batch).await?;
            stats.inserted += written;
            on_batch(written);
        }

        tracing::info!(
            read = stats.read,
            unique = stats.unique,
            inserted = stats.inserted,
            "Word list loaded"
        );
        Ok(stats)
    }
}
