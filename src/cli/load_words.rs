use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::{init_optional_cache, APP_CONFIG};
use crate::embeddings::build_embedder;
use crate::services::{parse_word_list, WordService};
use crate::store::build_store;

/// Arguments for load-words command
#[derive(Args, Debug)]
pub struct LoadWordsArgs {
    /// Word list, one word per line (`#` lines are ignored)
    #[arg(long, short)]
    pub file: PathBuf,

    /// Words embedded and written per request
    #[arg(long, default_value_t = 256)]
    pub batch_size: usize,
}

pub async fn load_words(args: LoadWordsArgs) -> Result<()> {
    let content = tokio::fs::read_to_string(&args.file)
        .await
        .with_context(|| format!("failed to read word list {}", args.file.display()))?;
    let list = parse_word_list(&content);

    println!(
        "📖 Read {} words ({} unique) from {}",
        list.read,
        list.words.len(),
        args.file.display()
    );
    if list.words.is_empty() {
        println!("Nothing to load.");
        return Ok(());
    }

    let cache = init_optional_cache().await;
    let embedder = build_embedder(&APP_CONFIG, cache).await?;
    let store = build_store(&APP_CONFIG)?;
    store
        .ensure_collection(APP_CONFIG.vector_size, false)
        .await
        .context("failed to prepare collection")?;

    let service = WordService::new(embedder, store.clone());
    let progress = ProgressBar::new(list.words.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} words ({eta})")?
            .progress_chars("=> "),
    );

    let started = Instant::now();
    let stats = service
        .load_words(&content, args.batch_size, |written| {
            progress.inc(written as u64);
        })
        .await;
    progress.finish_and_clear();
    let stats = stats?;

    println!(
        "✅ Inserted {} words in {:.1}s ({} points in collection)",
        stats.inserted,
        started.elapsed().as_secs_f32(),
        store.count().await?
    );

    Ok(())
}
