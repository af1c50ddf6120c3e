//! Word categorisation.
//!
//! Groups the stored words into themed clusters with mini-batch k-means and
//! names each cluster with an LLM-generated title.

pub mod kmeans;
pub mod naming;
pub mod pipeline;

pub use kmeans::{KMeansModel, MiniBatchKMeans};
pub use naming::{fallback_title, sanitize_title, LlmTitleGenerator, TitleGenerator};
pub use pipeline::{
    assign_category_names, fetch_all_words, group_clusters, run_pipeline, save_model,
    save_report, summarize, update_words_with_categories, Category, CategoryReport, Cluster,
    PipelineOptions, PipelineOutcome, SavedModel, UpdateStats,
};
