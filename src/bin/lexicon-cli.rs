use anyhow::Result;
use clap::Parser;
use lexicon_search::cli::{execute, Cli};
use lexicon_search::config::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_tracing("lexicon_search=info");

    // Parse CLI arguments
    let cli = Cli::parse();

    // Execute the command
    match execute(cli).await {
        Ok(()) => Ok(()),
        Err(e) => {
            eprintln!("❌ Error: {e:#}");
            std::process::exit(1);
        }
    }
}
