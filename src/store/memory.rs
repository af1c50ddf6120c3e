//! In-process vector store.
//!
//! Points are kept in a `BTreeMap` keyed by id so scrolling is ordered and
//! resumable, like Qdrant's. Search is a brute-force cosine scan.

use std::collections::BTreeMap;
use std::ops::Bound;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{AppError, AppResult};
use crate::models::{CategoryTag, ScoredWord, ScrollPage, StoredWord, WordPayload, WordPoint};
use crate::store::{check_dimension, VectorStore};
use crate::utils::cosine_similarity;

#[derive(Debug, Default)]
struct Collection {
    dimension: Option<usize>,
    points: BTreeMap<String, (Vec<f32>, WordPayload)>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Collection>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn ensure_collection(&self, dimension: usize, recreate: bool) -> AppResult<()> {
        let mut collection = self.inner.write().await;

        if recreate {
            collection.points.clear();
            collection.dimension = Some(dimension);
            return Ok(());
        }

        match collection.dimension {
            Some(existing) if existing != dimension => Err(AppError::VectorStore(format!(
                "Collection has vector size {existing}, embedder produces {dimension}"
            ))),
            _ => {
                collection.dimension = Some(dimension);
                Ok(())
            }
        }
    }

    async fn upsert(&self, points: Vec<WordPoint>) -> AppResult<()> {
        let mut collection = self.inner.write().await;
        for point in &points {
            check_dimension(collection.dimension, point.vector.len())?;
        }
        for point in points {
            collection
                .points
                .insert(point.id, (point.vector, point.payload));
        }
        Ok(())
    }

    async fn search(&self, vector: &[f32], limit: usize) -> AppResult<Vec<ScoredWord>> {
        let collection = self.inner.read().await;
        check_dimension(collection.dimension, vector.len())?;

        let mut hits: Vec<ScoredWord> = collection
            .points
            .iter()
            .map(|(id, (stored, payload))| ScoredWord {
                id: id.clone(),
                score: cosine_similarity(vector, stored),
                payload: payload.clone(),
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn scroll(
        &self,
        offset: Option<String>,
        limit: usize,
        with_vectors: bool,
    ) -> AppResult<ScrollPage> {
        let collection = self.inner.read().await;
        let start = offset.map_or(Bound::Unbounded, Bound::Included);

        let mut iter = collection.points.range((start, Bound::Unbounded));
        let points: Vec<StoredWord> = iter
            .by_ref()
            .take(limit)
            .map(|(id, (vector, payload))| StoredWord {
                id: id.clone(),
                payload: payload.clone(),
                vector: with_vectors.then(|| vector.clone()),
            })
            .collect();
        let next_offset = iter.next().map(|(id, _)| id.clone());

        Ok(ScrollPage {
            points,
            next_offset,
        })
    }

    async fn set_category(&self, ids: &[String], tag: &CategoryTag) -> AppResult<()> {
        let mut collection = self.inner.write().await;
        if let Some(missing) = ids.iter().find(|id| !collection.points.contains_key(*id)) {
            return Err(AppError::NotFound(format!("Point {missing} not found")));
        }
        for id in ids {
            if let Some((_, payload)) = collection.points.get_mut(id) {
                payload.category = Some(tag.category.clone());
                payload.category_id = Some(tag.category_id);
            }
        }
        Ok(())
    }

    async fn count(&self) -> AppResult<u64> {
        Ok(self.inner.read().await.points.len() as u64)
    }

    async fn ping(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(word: &str, vector: Vec<f32>) -> WordPoint {
        WordPoint::new(vector, WordPayload::bare(word))
    }

    #[tokio::test]
    async fn test_search_orders_by_similarity() {
        let store = MemoryStore::new();
        store.ensure_collection(2, false).await.unwrap();
        store
            .upsert(vec![
                point("east", vec![1.0, 0.0]),
                point("north", vec![0.0, 1.0]),
                point("northeast", vec![1.0, 1.0]),
            ])
            .await
            .unwrap();

        let hits = store.search(&[1.0, 0.1], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].payload.word, "east");
        assert_eq!(hits[1].payload.word, "northeast");
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_search_empty_collection() {
        let store = MemoryStore::new();
        store.ensure_collection(3, false).await.unwrap();
        assert!(store.search(&[1.0, 0.0, 0.0], 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_rejects_wrong_dimension() {
        let store = MemoryStore::new();
        store.ensure_collection(3, false).await.unwrap();
        let result = store.upsert(vec![point("short", vec![1.0])]).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ensure_collection_dimension_mismatch() {
        let store = MemoryStore::new();
        store.ensure_collection(3, false).await.unwrap();
        assert!(store.ensure_collection(4, false).await.is_err());
        assert!(store.ensure_collection(4, true).await.is_ok());
    }

    #[tokio::test]
    async fn test_recreate_drops_points() {
        let store = MemoryStore::new();
        store.ensure_collection(2, false).await.unwrap();
        store.upsert(vec![point("a", vec![1.0, 0.0])]).await.unwrap();
        store.ensure_collection(2, true).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_scroll_pages_through_everything() {
        let store = MemoryStore::new();
        store.ensure_collection(1, false).await.unwrap();
        let points: Vec<WordPoint> = (0..5).map(|i| point(&format!("w{i}"), vec![1.0])).collect();
        store.upsert(points).await.unwrap();

        let mut seen = Vec::new();
        let mut offset = None;
        loop {
            let page = store.scroll(offset, 2, true).await.unwrap();
            assert!(page.points.iter().all(|p| p.vector.is_some()));
            seen.extend(page.points.into_iter().map(|p| p.payload.word));
            offset = page.next_offset;
            if offset.is_none() {
                break;
            }
        }

        seen.sort();
        assert_eq!(seen, vec!["w0", "w1", "w2", "w3", "w4"]);
    }

    #[tokio::test]
    async fn test_set_category() {
        let store = MemoryStore::new();
        store.ensure_collection(1, false).await.unwrap();
        let p = point("doctor", vec![1.0]);
        let id = p.id.clone();
        store.upsert(vec![p]).await.unwrap();

        let tag = CategoryTag {
            category: "Medical_Health_Care".to_string(),
            category_id: 3,
        };
        store.set_category(&[id.clone()], &tag).await.unwrap();

        let page = store.scroll(None, 10, false).await.unwrap();
        assert_eq!(page.points[0].payload.category.as_deref(), Some("Medical_Health_Care"));
        assert_eq!(page.points[0].payload.category_id, Some(3));
        assert!(page.points[0].vector.is_none());

        let missing = store.set_category(&["nope".to_string()], &tag).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }
}
