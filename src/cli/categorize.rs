use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};

use crate::clustering::{run_pipeline, LlmTitleGenerator, MiniBatchKMeans, PipelineOptions};
use crate::config::APP_CONFIG;
use crate::store::build_store;

/// Arguments for categorize command
#[derive(Args, Debug)]
pub struct CategorizeArgs {
    /// Number of clusters
    #[arg(long, default_value_t = 50)]
    pub clusters: usize,

    /// Mini-batch size for k-means
    #[arg(long, default_value_t = 1000)]
    pub batch_size: usize,

    /// Passes over the data set
    #[arg(long, default_value_t = 100)]
    pub max_iter: usize,

    /// Random seed
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Central words sent to the LLM per cluster
    #[arg(long, default_value_t = 45)]
    pub top_n: usize,

    /// Category report path
    #[arg(long, default_value = "word_categories.json")]
    pub output: PathBuf,

    /// Cluster model path
    #[arg(long, default_value = "kmeans_model.json")]
    pub model_output: PathBuf,

    /// Don't write categories back to the vector store
    #[arg(long)]
    pub skip_update: bool,
}

impl CategorizeArgs {
    fn options(&self) -> PipelineOptions {
        PipelineOptions {
            kmeans: MiniBatchKMeans {
                n_clusters: self.clusters,
                batch_size: self.batch_size,
                max_iter: self.max_iter,
                seed: self.seed,
                ..MiniBatchKMeans::default()
            },
            top_n: self.top_n,
            report_path: self.output.clone(),
            model_path: self.model_output.clone(),
            update_store: !self.skip_update,
            ..PipelineOptions::default()
        }
    }
}

pub async fn categorize(args: CategorizeArgs) -> Result<()> {
    let generator = LlmTitleGenerator::new(&APP_CONFIG)?;
    if !generator.is_available() {
        println!("⚠️  Warning: AVALAI_API_KEY is not set, clusters will get fallback titles");
        println!("   export AVALAI_API_KEY='your-actual-api-key'");
    }

    let store = build_store(&APP_CONFIG)?;

    let progress = ProgressBar::new_spinner();
    progress.set_style(ProgressStyle::with_template("{spinner} Naming clusters: {pos} done, last: {msg}")?);
    progress.enable_steady_tick(Duration::from_millis(120));

    let outcome = run_pipeline(store.as_ref(), &generator, &args.options(), |category| {
        progress.inc(1);
        progress.set_message(category.title.clone());
    })
    .await;
    progress.finish_and_clear();

    let Some(outcome) = outcome? else {
        println!("❌ No words found in the collection. Run `lexicon-cli load-words` first.");
        return Ok(());
    };

    println!("\n✅ Categories saved to {}", args.output.display());
    println!("{}", outcome.summary);

    match outcome.update {
        Some(stats) => {
            println!("✅ Updated {} words in the vector store", stats.total_updated);
            println!("❌ Failed: {} words", stats.total_failed);
        }
        None => println!("Skipped vector store update"),
    }
    println!("✅ Cluster model saved to {}", args.model_output.display());

    Ok(())
}
