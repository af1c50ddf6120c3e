//! Qdrant REST client.
//!
//! Talks to the Qdrant HTTP API (default port 6333). Every response is wrapped
//! as `{"result": ..., "status": "ok", "time": ...}`; failures carry
//! `{"status": {"error": "..."}}` and a non-2xx status code.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::models::{CategoryTag, ScoredWord, ScrollPage, StoredWord, WordPayload, WordPoint};
use crate::store::{check_dimension, VectorStore};

pub struct QdrantStore {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    /// Vector size confirmed by `ensure_collection`; 0 until then.
    dimension: AtomicUsize,
}

#[derive(Debug, Deserialize)]
struct QdrantResponse<T> {
    result: Option<T>,
}

/// Point ids are either unsigned integers or UUID strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PointId {
    Num(u64),
    Uuid(String),
}

impl std::fmt::Display for PointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Num(n) => write!(f, "{n}"),
            Self::Uuid(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawPoint {
    id: PointId,
    #[serde(default)]
    payload: Option<Value>,
    #[serde(default)]
    vector: Option<Vec<f32>>,
    #[serde(default)]
    score: f32,
}

impl RawPoint {
    /// Decodes the payload; points without a `word` field yield `None`.
    fn into_parts(self) -> Option<(String, WordPayload, Option<Vec<f32>>, f32)> {
        let id = self.id.to_string();
        let payload = self.payload.unwrap_or(Value::Null);
        match serde_json::from_value::<WordPayload>(payload) {
            Ok(payload) => Some((id, payload, self.vector, self.score)),
            Err(e) => {
                tracing::warn!(point_id = %id, error = %e, "Skipping point with unreadable payload");
                None
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ScrollResult {
    points: Vec<RawPoint>,
    #[serde(default)]
    next_page_offset: Option<PointId>,
}

#[derive(Debug, Deserialize)]
struct CountResult {
    count: u64,
}

#[derive(Debug, Deserialize)]
struct CollectionInfo {
    config: CollectionConfig,
}

#[derive(Debug, Deserialize)]
struct CollectionConfig {
    params: CollectionParams,
}

#[derive(Debug, Deserialize)]
struct CollectionParams {
    vectors: Value,
}

impl CollectionInfo {
    /// Vector size of the unnamed vector config, if that is what the collection uses.
    #[allow(clippy::cast_possible_truncation)]
    fn vector_size(&self) -> Option<usize> {
        self.config
            .params
            .vectors
            .get("size")
            .and_then(Value::as_u64)
            .map(|size| size as usize)
    }
}

/// Encodes a point id the way Qdrant expects it back: integers as numbers.
fn point_id_json(id: &str) -> Value {
    id.parse::<u64>().map_or_else(|_| json!(id), |n| json!(n))
}

impl QdrantStore {
    /// Creates a client for `collection` on the Qdrant instance at `base_url`.
    pub fn new(
        base_url: &str,
        collection: &str,
        api_key: &str,
        timeout_secs: u64,
    ) -> AppResult<Self> {
        reqwest::Url::parse(base_url)
            .map_err(|e| AppError::Internal(format!("Invalid QDRANT_URL '{base_url}': {e}")))?;

        let mut default_headers = HeaderMap::new();
        default_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if !api_key.is_empty() {
            let value = HeaderValue::from_str(api_key)
                .map_err(|e| AppError::Internal(format!("Invalid QDRANT_API_KEY: {e}")))?;
            default_headers.insert("api-key", value);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(5))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(60))
            .default_headers(default_headers)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            collection: collection.to_string(),
            dimension: AtomicUsize::new(0),
        })
    }

    fn known_dimension(&self) -> Option<usize> {
        match self.dimension.load(Ordering::Relaxed) {
            0 => None,
            dim => Some(dim),
        }
    }

    fn collection_url(&self, suffix: &str) -> String {
        format!("{}/collections/{}{suffix}", self.base_url, self.collection)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, action: &str) -> AppResult<T> {
        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::VectorStore(format!(
                "{action} failed with status {status}: {body}"
            )));
        }

        response
            .json::<QdrantResponse<T>>()
            .await?
            .result
            .ok_or_else(|| AppError::VectorStore(format!("{action} returned no result")))
    }

    /// Reads the collection's vector size; `None` when the collection is missing.
    async fn collection_vector_size(&self) -> AppResult<Option<Option<usize>>> {
        let response = self.client.get(self.collection_url("")).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::VectorStore(format!(
                "Collection lookup failed with status {status}: {body}"
            )));
        }

        let info = response
            .json::<QdrantResponse<CollectionInfo>>()
            .await?
            .result
            .ok_or_else(|| AppError::VectorStore("Collection lookup returned no result".into()))?;
        Ok(Some(info.vector_size()))
    }

    async fn create_collection(&self, dimension: usize) -> AppResult<()> {
        let body = json!({
            "vectors": { "size": dimension, "distance": "Cosine" }
        });
        let _: bool = self
            .send(
                self.client.put(self.collection_url("")).json(&body),
                "Create collection",
            )
            .await?;
        Ok(())
    }

    async fn delete_collection(&self) -> AppResult<()> {
        let response = self.client.delete(self.collection_url("")).send().await?;
        if !response.status().is_success() && response.status() != StatusCode::NOT_FOUND {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::VectorStore(format!(
                "Delete collection failed with status {status}: {body}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn ensure_collection(&self, dimension: usize, recreate: bool) -> AppResult<()> {
        if recreate {
            self.delete_collection().await?;
            self.create_collection(dimension).await?;
            self.dimension.store(dimension, Ordering::Relaxed);
            tracing::info!(
                collection = %self.collection,
                dimension,
                "Collection recreated"
            );
            return Ok(());
        }

        match self.collection_vector_size().await? {
            None => {
                self.create_collection(dimension).await?;
                self.dimension.store(dimension, Ordering::Relaxed);
                tracing::info!(collection = %self.collection, dimension, "Collection created");
                Ok(())
            }
            Some(Some(size)) if size == dimension => {
                self.dimension.store(dimension, Ordering::Relaxed);
                tracing::info!(collection = %self.collection, dimension, "Collection ready");
                Ok(())
            }
            Some(Some(size)) => Err(AppError::VectorStore(format!(
                "Collection '{}' has vector size {size}, embedder produces {dimension}; \
                 set RECREATE_COLLECTION=true to rebuild it",
                self.collection
            ))),
            Some(None) => Err(AppError::VectorStore(format!(
                "Collection '{}' uses named vectors, which are not supported",
                self.collection
            ))),
        }
    }

    async fn upsert(&self, points: Vec<WordPoint>) -> AppResult<()> {
        if points.is_empty() {
            return Ok(());
        }
        let expected = self.known_dimension();
        for point in &points {
            check_dimension(expected, point.vector.len())?;
        }

        let count = points.len();
        let body = json!({ "points": points });
        let _: Value = self
            .send(
                self.client
                    .put(self.collection_url("/points?wait=true"))
                    .json(&body),
                "Upsert points",
            )
            .await?;

        tracing::debug!(collection = %self.collection, count, "Points upserted");
        Ok(())
    }

    async fn search(&self, vector: &[f32], limit: usize) -> AppResult<Vec<ScoredWord>> {
        check_dimension(self.known_dimension(), vector.len())?;

        let body = json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
        });
        let raw: Vec<RawPoint> = self
            .send(
                self.client
                    .post(self.collection_url("/points/search"))
                    .json(&body),
                "Search",
            )
            .await?;

        Ok(raw
            .into_iter()
            .filter_map(RawPoint::into_parts)
            .map(|(id, payload, _, score)| ScoredWord { id, score, payload })
            .collect())
    }

    async fn scroll(
        &self,
        offset: Option<String>,
        limit: usize,
        with_vectors: bool,
    ) -> AppResult<ScrollPage> {
        let body = json!({
            "limit": limit,
            "offset": offset.as_deref().map(point_id_json),
            "with_payload": true,
            "with_vector": with_vectors,
        });
        let result: ScrollResult = self
            .send(
                self.client
                    .post(self.collection_url("/points/scroll"))
                    .json(&body),
                "Scroll",
            )
            .await?;

        let points = result
            .points
            .into_iter()
            .filter_map(RawPoint::into_parts)
            .map(|(id, payload, vector, _)| StoredWord {
                id,
                payload,
                vector,
            })
            .collect();

        Ok(ScrollPage {
            points,
            next_offset: result.next_page_offset.map(|id| id.to_string()),
        })
    }

    async fn set_category(&self, ids: &[String], tag: &CategoryTag) -> AppResult<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let body = json!({
            "payload": tag,
            "points": ids.iter().map(|id| point_id_json(id)).collect::<Vec<_>>(),
        });
        let _: Value = self
            .send(
                self.client
                    .post(self.collection_url("/points/payload?wait=true"))
                    .json(&body),
                "Set payload",
            )
            .await?;
        Ok(())
    }

    async fn count(&self) -> AppResult<u64> {
        let result: CountResult = self
            .send(
                self.client
                    .post(self.collection_url("/points/count"))
                    .json(&json!({ "exact": true })),
                "Count",
            )
            .await?;
        Ok(result.count)
    }

    async fn ping(&self) -> bool {
        match self
            .client
            .get(format!("{}/healthz", self.base_url))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "Qdrant health check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> QdrantStore {
        QdrantStore::new("http://localhost:6333/", "words", "", 5).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_url() {
        assert!(QdrantStore::new("not a url", "words", "", 5).is_err());
    }

    #[test]
    fn test_new_accepts_api_key() {
        assert!(QdrantStore::new("http://qdrant:6333", "words", "secret-key", 5).is_ok());
    }

    #[test]
    fn test_collection_url_trims_trailing_slash() {
        assert_eq!(
            store().collection_url("/points/search"),
            "http://localhost:6333/collections/words/points/search"
        );
    }

    #[test]
    fn test_point_id_json() {
        assert_eq!(point_id_json("42"), json!(42));
        assert_eq!(
            point_id_json("5c56c793-69f3-4fbf-87e6-c4bf54c28c26"),
            json!("5c56c793-69f3-4fbf-87e6-c4bf54c28c26")
        );
    }

    #[test]
    fn test_parse_search_response() {
        let body = r#"{
            "result": [
                {"id": "5c56c793-69f3-4fbf-87e6-c4bf54c28c26", "version": 3, "score": 0.91,
                 "payload": {"word": "strength", "meaning": "power", "synonyms": ["might"]}},
                {"id": 7, "version": 1, "score": 0.5, "payload": {"meaning": "no word"}}
            ],
            "status": "ok",
            "time": 0.001
        }"#;
        let parsed: QdrantResponse<Vec<RawPoint>> = serde_json::from_str(body).unwrap();
        let parts: Vec<_> = parsed
            .result
            .unwrap()
            .into_iter()
            .filter_map(RawPoint::into_parts)
            .collect();

        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].1.word, "strength");
        assert_eq!(parts[0].1.synonyms, vec!["might".to_string()]);
        assert!((parts[0].3 - 0.91).abs() < 1e-6);
    }

    #[test]
    fn test_parse_scroll_response() {
        let body = r#"{
            "result": {
                "points": [{"id": 1, "payload": {"word": "apple"}, "vector": [0.1, 0.2]}],
                "next_page_offset": 2
            },
            "status": "ok",
            "time": 0.002
        }"#;
        let parsed: QdrantResponse<ScrollResult> = serde_json::from_str(body).unwrap();
        let result = parsed.result.unwrap();

        assert_eq!(result.next_page_offset.unwrap().to_string(), "2");
        assert_eq!(result.points[0].vector.as_deref(), Some(&[0.1_f32, 0.2][..]));
    }

    #[test]
    fn test_parse_collection_info() {
        let body = r#"{
            "result": {
                "status": "green",
                "config": {"params": {"vectors": {"size": 384, "distance": "Cosine"}}}
            },
            "status": "ok",
            "time": 0.0
        }"#;
        let parsed: QdrantResponse<CollectionInfo> = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.result.unwrap().vector_size(), Some(384));
    }

    #[test]
    fn test_parse_named_vectors_collection_info() {
        let body = r#"{"result": {"config": {"params": {"vectors": {"text": {"size": 384}}}}}}"#;
        let parsed: QdrantResponse<CollectionInfo> = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.result.unwrap().vector_size(), None);
    }

    #[test]
    fn test_word_point_serializes_in_qdrant_shape() {
        let point = WordPoint::new(vec![0.5, 0.5], WordPayload::bare("tide"));
        let json = serde_json::to_value(&point).unwrap();

        assert!(json["id"].is_string());
        assert_eq!(json["vector"], json!([0.5, 0.5]));
        assert_eq!(json["payload"]["word"], "tide");
    }

    #[tokio::test]
    async fn test_wrong_dimension_rejected_before_request() {
        let store = QdrantStore::new("http://127.0.0.1:9", "words", "", 1).unwrap();
        store.dimension.store(3, Ordering::Relaxed);

        let upsert = store
            .upsert(vec![WordPoint::new(vec![1.0], WordPayload::bare("short"))])
            .await;
        assert!(matches!(upsert, Err(AppError::BadRequest(_))));

        let search = store.search(&[1.0, 0.0], 3).await;
        assert!(matches!(search, Err(AppError::BadRequest(_))));

        // Right size passes the check and only then fails on the connection.
        let search = store.search(&[1.0, 0.0, 0.0], 3).await;
        assert!(!matches!(search, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_ping_unreachable_host_is_false() {
        let store = QdrantStore::new("http://127.0.0.1:9", "words", "", 1).unwrap();
        assert!(!store.ping().await);
    }
}
