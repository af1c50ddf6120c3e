//! Word model module.
//!
//! Contains the payload stored with every vector point and the shapes the
//! vector store hands back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Data stored next to each word vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordPayload {
    pub word: String,
    #[serde(default)]
    pub meaning: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub antonyms: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<DateTime<Utc>>,
    /// Theme title assigned by the categorization pipeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<u32>,
}

impl WordPayload {
    /// Payload for a bare word, as loaded from a word list.
    pub fn bare(word: impl Into<String>) -> Self {
        Self {
            word: word.into(),
            meaning: String::new(),
            synonyms: Vec::new(),
            antonyms: Vec::new(),
            examples: Vec::new(),
            added_at: Some(Utc::now()),
            category: None,
            category_id: None,
        }
    }
}

/// A vector point ready to be written to the store.
#[derive(Debug, Clone, Serialize)]
pub struct WordPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: WordPayload,
}

impl WordPoint {
    /// Creates a point with a fresh UUID v4 identifier.
    pub fn new(vector: Vec<f32>, payload: WordPayload) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            vector,
            payload,
        }
    }
}

/// A search hit returned by the vector store.
#[derive(Debug, Clone)]
pub struct ScoredWord {
    pub id: String,
    pub score: f32,
    pub payload: WordPayload,
}

/// A point read back while scrolling the collection.
#[derive(Debug, Clone)]
pub struct StoredWord {
    pub id: String,
    pub payload: WordPayload,
    pub vector: Option<Vec<f32>>,
}

/// One page of a collection scroll.
#[derive(Debug, Clone, Default)]
pub struct ScrollPage {
    pub points: Vec<StoredWord>,
    pub next_offset: Option<String>,
}

/// Category label written back onto word points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTag {
    pub category: String,
    pub category_id: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_point_ids_are_unique_uuids() {
        let a = WordPoint::new(vec![0.0; 4], WordPayload::bare("power"));
        let b = WordPoint::new(vec![0.0; 4], WordPayload::bare("power"));

        assert_ne!(a.id, b.id);
        assert!(Uuid::parse_str(&a.id).is_ok());
    }

    #[test]
    fn test_payload_deserializes_with_missing_fields() {
        let payload: WordPayload = serde_json::from_str(r#"{"word": "grace"}"#).unwrap();
        assert_eq!(payload.word, "grace");
        assert!(payload.meaning.is_empty());
        assert!(payload.synonyms.is_empty());
        assert!(payload.category.is_none());
    }

    #[test]
    fn test_payload_skips_absent_category() {
        let payload = WordPayload {
            added_at: None,
            ..WordPayload::bare("river")
        };
        let json = serde_json::to_value(&payload).unwrap();

        assert!(json.get("category").is_none());
        assert!(json.get("added_at").is_none());
        assert_eq!(json["synonyms"], serde_json::json!([]));
    }

    #[test]
    fn test_payload_keeps_category_fields() {
        let json = r#"{
            "word": "doctor",
            "meaning": "a medical practitioner",
            "category": "Medical_Health_Care",
            "category_id": 7
        }"#;
        let payload: WordPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.category.as_deref(), Some("Medical_Health_Care"));
        assert_eq!(payload.category_id, Some(7));
    }
}
