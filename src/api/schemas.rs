//! Request/response schema module.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::models::ScoredWord;

/// Number of hits returned when a search does not specify `limit`.
pub const DEFAULT_SEARCH_LIMIT: usize = 3;

/// Upper bound on `limit` for a single search.
pub const MAX_SEARCH_LIMIT: usize = 100;

/// Longest accepted word, counted in characters after trimming.
pub const MAX_WORD_CHARS: usize = 100;

const fn default_limit() -> usize {
    DEFAULT_SEARCH_LIMIT
}

/// Length check on the trimmed word, so surrounding whitespace neither
/// counts against the limit nor makes a blank word acceptable.
fn validate_word(word: &str) -> Result<(), ValidationError> {
    let len = word.trim().chars().count();
    if (1..=MAX_WORD_CHARS).contains(&len) {
        Ok(())
    } else {
        Err(ValidationError::new("word_length"))
    }
}

/// Word creation request.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct WordItem {
    /// The word to embed and index (required)
    #[validate(custom(
        function = "validate_word",
        message = "Word must be between 1 and 100 characters"
    ))]
    pub word: String,

    /// Definition text (required, may be empty)
    #[validate(length(max = 2000, message = "Meaning must be at most 2000 characters"))]
    pub meaning: String,

    #[validate(length(max = 100, message = "At most 100 synonyms are allowed"))]
    #[serde(default)]
    pub synonyms: Vec<String>,

    #[validate(length(max = 100, message = "At most 100 antonyms are allowed"))]
    #[serde(default)]
    pub antonyms: Vec<String>,

    #[validate(length(max = 50, message = "At most 50 examples are allowed"))]
    #[serde(default)]
    pub examples: Vec<String>,
}

/// Nearest-neighbour search request.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SearchQuery {
    #[validate(custom(
        function = "validate_word",
        message = "Word must be between 1 and 100 characters"
    ))]
    pub word: String,

    #[validate(range(min = 1, max = 100, message = "Limit must be between 1 and 100"))]
    #[serde(default = "default_limit")]
    pub limit: usize,
}

/// Response for word creation.
#[derive(Debug, Serialize, Deserialize)]
pub struct AddWordResponse {
    pub message: String,
}

impl AddWordResponse {
    pub fn added(word: &str) -> Self {
        Self {
            message: format!("Word '{word}' added successfully."),
        }
    }
}

/// One search result.
#[derive(Debug, Serialize, Deserialize)]
pub struct SearchHit {
    pub word: String,
    pub score: f32,
    pub meaning: String,
    pub synonyms: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub category: Option<String>,
}

impl From<ScoredWord> for SearchHit {
    fn from(hit: ScoredWord) -> Self {
        Self {
            word: hit.payload.word,
            score: hit.score,
            meaning: hit.payload.meaning,
            synonyms: hit.payload.synonyms,
            category: hit.payload.category,
        }
    }
}
