pub mod categorize;
pub mod load_words;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// Lexicon Search CLI
#[derive(Parser, Debug)]
#[command(name = "lexicon-cli")]
#[command(version)]
#[command(about = "Batch tools for the word search collection", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Embed and store every word in a newline-delimited word list
    LoadWords(load_words::LoadWordsArgs),

    /// Cluster the stored words into named categories
    Categorize(categorize::CategorizeArgs),
}

/// Execute CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::LoadWords(args) => load_words::load_words(args).await,
        Commands::Categorize(args) => categorize::categorize(args).await,
    }
}
