//! Categorisation pipeline.
//!
//! Pulls every word vector out of the store, clusters them, names each
//! cluster and writes the result back as a JSON report and as per-point
//! `category` payload fields.

use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::clustering::kmeans::{KMeansModel, MiniBatchKMeans};
use crate::clustering::naming::{fallback_title, TitleGenerator};
use crate::error::{AppError, AppResult};
use crate::models::CategoryTag;
use crate::store::VectorStore;
use crate::utils::squared_distance;

pub const SCROLL_BATCH_SIZE: usize = 1000;
pub const UPDATE_BATCH_SIZE: usize = 256;

const REPRESENTATIVE_WORDS: usize = 15;
const SAMPLE_WORDS: usize = 30;

/// Every word in the collection, column-wise.
#[derive(Debug, Default)]
pub struct WordVectors {
    pub ids: Vec<String>,
    pub words: Vec<String>,
    pub vectors: Vec<Vec<f32>>,
}

impl WordVectors {
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Scrolls the whole collection with vectors.
pub async fn fetch_all_words(store: &dyn VectorStore, batch_size: usize) -> AppResult<WordVectors> {
    let mut fetched = WordVectors::default();
    let mut offset = None;

    loop {
        let page = store.scroll(offset, batch_size.max(1), true).await?;
        if page.points.is_empty() {
            break;
        }

        for point in page.points {
            let Some(vector) = point.vector else {
                tracing::warn!(point_id = %point.id, "Point returned without a vector, skipping");
                continue;
            };
            if point.payload.word.is_empty() {
                tracing::warn!(point_id = %point.id, "Point has no word, skipping");
                continue;
            }
            fetched.ids.push(point.id);
            fetched.words.push(point.payload.word);
            fetched.vectors.push(vector);
        }

        tracing::debug!(fetched = fetched.len(), "Fetched page of words");

        offset = page.next_offset;
        if offset.is_none() {
            break;
        }
    }

    tracing::info!(total = fetched.len(), "Fetched words from vector store");
    Ok(fetched)
}

#[derive(Debug, Clone)]
pub struct ClusterMember {
    pub id: String,
    pub word: String,
    /// Euclidean distance to the cluster centre.
    pub distance: f32,
}

#[derive(Debug, Clone)]
pub struct Cluster {
    pub cluster_id: usize,
    /// Sorted by ascending distance to the centre.
    pub members: Vec<ClusterMember>,
}

impl Cluster {
    pub fn top_words(&self, n: usize) -> Vec<String> {
        self.members.iter().take(n).map(|m| m.word.clone()).collect()
    }
}

/// Groups labelled words by cluster. Empty clusters are omitted.
pub fn group_clusters(words: &WordVectors, labels: &[usize], model: &KMeansModel) -> Vec<Cluster> {
    let mut grouped: BTreeMap<usize, Vec<ClusterMember>> = BTreeMap::new();

    for (idx, label) in labels.iter().enumerate() {
        let distance = squared_distance(&words.vectors[idx], &model.centers[*label]).sqrt();
        grouped.entry(*label).or_default().push(ClusterMember {
            id: words.ids[idx].clone(),
            word: words.words[idx].clone(),
            distance,
        });
    }

    grouped
        .into_iter()
        .map(|(cluster_id, mut members)| {
            members.sort_by(|a, b| a.distance.total_cmp(&b.distance));
            Cluster {
                cluster_id,
                members,
            }
        })
        .collect()
}

/// A named cluster as written to the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub cluster_id: u32,
    pub title: String,
    pub representative_words: Vec<String>,
    pub total_words: usize,
    pub sample_words: Vec<String>,
    pub all_words: Vec<String>,
}

/// Named clusters in cluster order; serialises as an object keyed by title.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryReport(pub Vec<Category>);

impl CategoryReport {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total_words(&self) -> usize {
        self.0.iter().map(|c| c.total_words).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.0.iter()
    }
}

impl Serialize for CategoryReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for category in &self.0 {
            map.serialize_entry(&category.title, category)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for CategoryReport {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = BTreeMap::<String, Category>::deserialize(deserializer)?;
        let mut categories: Vec<Category> = map.into_values().collect();
        categories.sort_by_key(|c| c.cluster_id);
        Ok(Self(categories))
    }
}

/// Names every cluster. Generation failures fall back to
/// `Cluster_<w0>_<w1>_<w2>`; duplicate titles get a `_<cluster_id>` suffix.
pub async fn assign_category_names<F>(
    clusters: &[Cluster],
    generator: &dyn TitleGenerator,
    top_n: usize,
    mut on_named: F,
) -> CategoryReport
where
    F: FnMut(&Category),
{
    let mut taken = HashSet::new();
    let mut categories = Vec::with_capacity(clusters.len());

    for cluster in clusters {
        let top_words = cluster.top_words(top_n);

        let title = match generator.generate(&top_words).await {
            Ok(title) => title,
            Err(e) => {
                tracing::warn!(cluster_id = cluster.cluster_id, error = %e, "Falling back to default title");
                fallback_title(&top_words)
            }
        };
        let title = unique_title(title, cluster.cluster_id, &taken);
        taken.insert(title.clone());

        let category = Category {
            cluster_id: u32::try_from(cluster.cluster_id).unwrap_or(u32::MAX),
            title,
            representative_words: top_words.iter().take(REPRESENTATIVE_WORDS).cloned().collect(),
            total_words: cluster.members.len(),
            sample_words: cluster.top_words(SAMPLE_WORDS),
            all_words: cluster.members.iter().map(|m| m.word.clone()).collect(),
        };

        tracing::info!(cluster_id = category.cluster_id, title = %category.title, words = category.total_words, "Cluster named");
        on_named(&category);
        categories.push(category);
    }

    CategoryReport(categories)
}

/// Appends `_<cluster_id>` until the title is not already taken. The report is
/// keyed by title, so a repeat would drop a category.
fn unique_title(mut title: String, cluster_id: usize, taken: &HashSet<String>) -> String {
    while taken.contains(&title) {
        title = format!("{title}_{cluster_id}");
    }
    title
}

/// Writes the report as pretty-printed UTF-8 JSON.
pub fn save_report(report: &CategoryReport, path: &Path) -> AppResult<()> {
    std::fs::write(path, serde_json::to_string_pretty(report)?)?;
    tracing::info!(path = %path.display(), categories = report.len(), "Category report saved");
    Ok(())
}

/// Persisted clustering model: centres plus the title given to each.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedModel {
    pub n_clusters: usize,
    pub dimension: usize,
    pub centers: Vec<Vec<f32>>,
    pub titles: BTreeMap<u32, String>,
}

impl SavedModel {
    pub fn new(model: &KMeansModel, report: &CategoryReport) -> Self {
        Self {
            n_clusters: model.n_clusters(),
            dimension: model.centers.first().map_or(0, Vec::len),
            centers: model.centers.clone(),
            titles: report
                .iter()
                .map(|c| (c.cluster_id, c.title.clone()))
                .collect(),
        }
    }

    pub fn load(path: &Path) -> AppResult<Self> {
        Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
    }

    pub fn into_model(self) -> KMeansModel {
        KMeansModel {
            centers: self.centers,
        }
    }
}

pub fn save_model(model: &KMeansModel, report: &CategoryReport, path: &Path) -> AppResult<()> {
    let saved = SavedModel::new(model, report);
    std::fs::write(path, serde_json::to_string(&saved)?)?;
    tracing::info!(path = %path.display(), clusters = saved.n_clusters, "Clustering model saved");
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpdateStats {
    pub total_updated: usize,
    pub total_failed: usize,
}

/// Tags every member point with its cluster's title and id.
///
/// Batches that the store rejects are counted as failed and skipped.
pub async fn update_words_with_categories(
    store: &dyn VectorStore,
    clusters: &[Cluster],
    report: &CategoryReport,
) -> UpdateStats {
    let titles: BTreeMap<u32, &str> = report
        .iter()
        .map(|c| (c.cluster_id, c.title.as_str()))
        .collect();
    let mut stats = UpdateStats::default();

    for cluster in clusters {
        let cluster_id = u32::try_from(cluster.cluster_id).unwrap_or(u32::MAX);
        let Some(title) = titles.get(&cluster_id) else {
            tracing::warn!(cluster_id, "No category for cluster, skipping");
            stats.total_failed += cluster.members.len();
            continue;
        };
        let tag = CategoryTag {
            category: (*title).to_string(),
            category_id: cluster_id,
        };

        let ids: Vec<String> = cluster.members.iter().map(|m| m.id.clone()).collect();
        for chunk in ids.chunks(UPDATE_BATCH_SIZE) {
            match store.set_category(chunk, &tag).await {
                Ok(()) => stats.total_updated += chunk.len(),
                Err(e) => {
                    tracing::error!(cluster_id, batch = chunk.len(), error = %e, "Failed to tag words");
                    stats.total_failed += chunk.len();
                }
            }
        }
    }

    tracing::info!(updated = stats.total_updated, failed = stats.total_failed, "Category update finished");
    stats
}

/// Human-readable overview of the first ten categories.
pub fn summarize(report: &CategoryReport) -> String {
    let rule = "=".repeat(80);
    let mut out = String::new();

    let _ = writeln!(out, "{rule}\nWORD CATEGORIZATION SUMMARY\n{rule}\n");
    let _ = writeln!(out, "Total Categories: {}", report.len());
    let _ = writeln!(out, "Total Words Categorized: {}", report.total_words());
    let _ = writeln!(out, "\nSample Categories:\n");

    for (i, category) in report.iter().take(10).enumerate() {
        let examples: Vec<&str> = category
            .representative_words
            .iter()
            .take(8)
            .map(String::as_str)
            .collect();
        let _ = writeln!(out, "{}. {}", i + 1, category.title);
        let _ = writeln!(out, "   Words: {}", category.total_words);
        let _ = writeln!(out, "   Examples: {}\n", examples.join(", "));
    }

    out
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub kmeans: MiniBatchKMeans,
    pub scroll_batch_size: usize,
    pub top_n: usize,
    pub report_path: PathBuf,
    pub model_path: PathBuf,
    pub update_store: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            kmeans: MiniBatchKMeans::default(),
            scroll_batch_size: SCROLL_BATCH_SIZE,
            top_n: crate::clustering::naming::PROMPT_WORDS,
            report_path: PathBuf::from("word_categories.json"),
            model_path: PathBuf::from("kmeans_model.json"),
            update_store: true,
        }
    }
}

#[derive(Debug)]
pub struct PipelineOutcome {
    pub report: CategoryReport,
    pub model: KMeansModel,
    pub summary: String,
    /// `None` when the store update was skipped.
    pub update: Option<UpdateStats>,
}

/// Runs fetch, cluster, name, report, tag and save in order.
///
/// Returns `Ok(None)` when the collection holds no words.
pub async fn run_pipeline<F>(
    store: &dyn VectorStore,
    generator: &dyn TitleGenerator,
    options: &PipelineOptions,
    on_named: F,
) -> AppResult<Option<PipelineOutcome>>
where
    F: FnMut(&Category),
{
    let words = fetch_all_words(store, options.scroll_batch_size).await?;
    if words.is_empty() {
        tracing::warn!("No words found in the vector store, load a word list first");
        return Ok(None);
    }

    tracing::info!(words = words.len(), clusters = options.kmeans.n_clusters, "Clustering words");
    let kmeans = options.kmeans.clone();
    let WordVectors {
        ids,
        words,
        vectors,
    } = words;
    let (labels, model, vectors) = tokio::task::spawn_blocking(move || {
        kmeans
            .fit_predict(&vectors)
            .map(|(labels, model)| (labels, model, vectors))
    })
    .await
    .map_err(|e| AppError::Internal(format!("Clustering task failed: {e}")))??;
    let words = WordVectors {
        ids,
        words,
        vectors,
    };

    let clusters = group_clusters(&words, &labels, &model);
    tracing::info!(clusters = clusters.len(), "Clustering completed");

    let report = assign_category_names(&clusters, generator, options.top_n, on_named).await;
    save_report(&report, &options.report_path)?;
    let summary = summarize(&report);

    let update = if options.update_store {
        Some(update_words_with_categories(store, &clusters, &report).await)
    } else {
        None
    };

    save_model(&model, &report, &options.model_path)?;

    Ok(Some(PipelineOutcome {
        report,
        model,
        summary,
        update,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{WordPayload, WordPoint};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct FixedTitle(&'static str);

    #[async_trait]
    impl TitleGenerator for FixedTitle {
        async fn generate(&self, _words: &[String]) -> AppResult<String> {
            Ok(self.0.to_string())
        }
    }

    /// Returns the queued titles in order.
    struct Scripted(std::sync::Mutex<Vec<&'static str>>);

    impl Scripted {
        fn new(titles: &[&'static str]) -> Self {
            Self(std::sync::Mutex::new(titles.iter().rev().copied().collect()))
        }
    }

    #[async_trait]
    impl TitleGenerator for Scripted {
        async fn generate(&self, _words: &[String]) -> AppResult<String> {
            self.0
                .lock()
                .unwrap()
                .pop()
                .map(str::to_string)
                .ok_or_else(|| AppError::Internal("no more titles".to_string()))
        }
    }

    struct Failing;

    #[async_trait]
    impl TitleGenerator for Failing {
        async fn generate(&self, _words: &[String]) -> AppResult<String> {
            Err(AppError::Internal("offline".to_string()))
        }
    }

    fn cluster(id: usize, words: &[&str]) -> Cluster {
        Cluster {
            cluster_id: id,
            members: words
                .iter()
                .enumerate()
                .map(|(i, w)| ClusterMember {
                    id: format!("{id}-{i}"),
                    word: (*w).to_string(),
                    distance: i as f32,
                })
                .collect(),
        }
    }

    async fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.ensure_collection(2, false).await.unwrap();
        let points = [
            ("east", [1.0, 0.0]),
            ("eastward", [0.99, 0.01]),
            ("north", [0.0, 1.0]),
            ("northward", [0.01, 0.99]),
        ]
        .into_iter()
        .map(|(w, v)| WordPoint::new(v.to_vec(), WordPayload::bare(w)))
        .collect();
        store.upsert(points).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_fetch_all_words_pages() {
        let store = seeded_store().await;
        let fetched = fetch_all_words(store.as_ref(), 3).await.unwrap();

        assert_eq!(fetched.len(), 4);
        assert_eq!(fetched.ids.len(), 4);
        assert!(fetched.vectors.iter().all(|v| v.len() == 2));
    }

    #[test]
    fn test_group_clusters_sorts_by_distance() {
        let words = WordVectors {
            ids: vec!["a".into(), "b".into(), "c".into()],
            words: vec!["far".into(), "near".into(), "other".into()],
            vectors: vec![vec![3.0, 0.0], vec![1.0, 0.0], vec![0.0, 9.0]],
        };
        let model = KMeansModel {
            centers: vec![vec![0.0, 0.0], vec![0.0, 9.0], vec![5.0, 5.0]],
        };
        let clusters = group_clusters(&words, &[0, 0, 1], &model);

        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].top_words(5), vec!["near", "far"]);
        assert!((clusters[0].members[1].distance - 3.0).abs() < 1e-6);
        assert_eq!(clusters[1].cluster_id, 1);
    }

    #[tokio::test]
    async fn test_assign_names_disambiguates_duplicates() {
        let clusters = vec![cluster(0, &["a", "b"]), cluster(4, &["c"])];
        let mut seen = 0;
        let report =
            assign_category_names(&clusters, &FixedTitle("Same_Theme_Here"), 45, |_| seen += 1).await;

        assert_eq!(seen, 2);
        assert_eq!(report.0[0].title, "Same_Theme_Here");
        assert_eq!(report.0[1].title, "Same_Theme_Here_4");
    }

    #[tokio::test]
    async fn test_suffixed_title_never_collides() {
        let clusters = vec![
            cluster(0, &["a"]),
            cluster(3, &["b"]),
            cluster(4, &["c"]),
        ];
        let generator = Scripted::new(&["Theme", "Theme_4", "Theme"]);
        let report = assign_category_names(&clusters, &generator, 45, |_| {}).await;

        let titles: Vec<&str> = report.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Theme", "Theme_4", "Theme_4_4"]);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json.as_object().unwrap().len(), 3);
        let parsed: CategoryReport = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, report);
    }

    #[test]
    fn test_unique_title() {
        let taken: HashSet<String> = ["Theme", "Theme_2"].into_iter().map(String::from).collect();
        assert_eq!(unique_title("Fresh".to_string(), 2, &taken), "Fresh");
        assert_eq!(unique_title("Theme".to_string(), 2, &taken), "Theme_2_2");
    }

    #[tokio::test]
    async fn test_assign_names_falls_back() {
        let words: Vec<String> = (0..40).map(|i| format!("w{i}")).collect();
        let refs: Vec<&str> = words.iter().map(String::as_str).collect();
        let report = assign_category_names(&[cluster(2, &refs)], &Failing, 45, |_| {}).await;

        let category = &report.0[0];
        assert_eq!(category.title, "Cluster_w0_w1_w2");
        assert_eq!(category.cluster_id, 2);
        assert_eq!(category.representative_words.len(), 15);
        assert_eq!(category.sample_words.len(), 30);
        assert_eq!(category.all_words.len(), 40);
        assert_eq!(category.total_words, 40);
    }

    #[tokio::test]
    async fn test_report_json_keyed_by_title() {
        let report = assign_category_names(
            &[cluster(1, &["café", "menu"])],
            &FixedTitle("Food_Dining_Places"),
            45,
            |_| {},
        )
        .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("word_categories.json");
        save_report(&report, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("café"));
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["Food_Dining_Places"]["cluster_id"], 1);
        assert_eq!(value["Food_Dining_Places"]["total_words"], 2);

        let parsed: CategoryReport = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, report);
    }

    #[tokio::test]
    async fn test_update_words_with_categories() {
        let store = seeded_store().await;
        let fetched = fetch_all_words(store.as_ref(), 10).await.unwrap();
        let model = KMeansModel {
            centers: vec![vec![1.0, 0.0], vec![0.0, 1.0]],
        };
        let labels = model.predict(&fetched.vectors);
        let mut clusters = group_clusters(&fetched, &labels, &model);
        clusters[0].members.push(ClusterMember {
            id: "missing".to_string(),
            word: "ghost".to_string(),
            distance: 9.0,
        });

        let report = assign_category_names(&clusters, &Failing, 45, |_| {}).await;
        let stats = update_words_with_categories(store.as_ref(), &clusters, &report).await;

        // The batch holding the unknown id is rejected as a whole.
        assert_eq!(stats.total_updated, 2);
        assert_eq!(stats.total_failed, 3);

        let page = store.scroll(None, 10, false).await.unwrap();
        let tagged: Vec<_> = page
            .points
            .iter()
            .filter(|p| p.payload.category.is_some())
            .collect();
        assert_eq!(tagged.len(), 2);
    }

    #[test]
    fn test_summarize() {
        let report = CategoryReport(vec![Category {
            cluster_id: 0,
            title: "Compass_Directions_Bearings".to_string(),
            representative_words: vec!["east".into(), "north".into()],
            total_words: 2,
            sample_words: vec![],
            all_words: vec!["east".into(), "north".into()],
        }]);
        let summary = summarize(&report);

        assert!(summary.contains("Total Categories: 1"));
        assert!(summary.contains("Total Words Categorized: 2"));
        assert!(summary.contains("1. Compass_Directions_Bearings"));
        assert!(summary.contains("Examples: east, north"));
    }

    #[tokio::test]
    async fn test_run_pipeline_end_to_end() {
        let store = seeded_store().await;
        let dir = tempfile::tempdir().unwrap();
        let options = PipelineOptions {
            kmeans: MiniBatchKMeans {
                n_clusters: 2,
                batch_size: 4,
                max_iter: 10,
                ..MiniBatchKMeans::default()
            },
            report_path: dir.path().join("report.json"),
            model_path: dir.path().join("model.json"),
            ..PipelineOptions::default()
        };

        let outcome = run_pipeline(store.as_ref(), &Failing, &options, |_| {})
            .await
            .unwrap()
            .unwrap();

        assert_eq!(outcome.report.len(), 2);
        assert_eq!(outcome.report.total_words(), 4);
        assert_eq!(
            outcome.update,
            Some(UpdateStats {
                total_updated: 4,
                total_failed: 0
            })
        );
        assert!(options.report_path.exists());

        let saved = SavedModel::load(&options.model_path).unwrap();
        assert_eq!(saved.n_clusters, 2);
        assert_eq!(saved.dimension, 2);
        assert_eq!(saved.titles.len(), 2);
    }

    #[tokio::test]
    async fn test_run_pipeline_empty_store() {
        let store = MemoryStore::new();
        store.ensure_collection(2, false).await.unwrap();
        let options = PipelineOptions::default();

        let outcome = run_pipeline(&store, &Failing, &options, |_| {}).await.unwrap();
        assert!(outcome.is_none());
    }
}
