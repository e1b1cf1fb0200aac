use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "formbook-cli")]
#[command(about = "Formbook command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Reconcile a scraped-race JSON file against the canonical store.
    Reconcile {
        /// JSON array of scraped races, as produced by the scraping layer.
        #[arg(long)]
        input: PathBuf,
        /// Also write the full run summary as JSON.
        #[arg(long)]
        summary_out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Reconcile { input, summary_out } => {
            let scraped = formbook_resolve::load_scraped_races(&input)?;
            let summary = formbook_resolve::run_reconcile_from_env(&scraped).await?;
            println!("reconcile complete: {}", summary.digest());
            if let Some(path) = summary_out {
                let json =
                    serde_json::to_vec_pretty(&summary).context("serializing run summary")?;
                std::fs::write(&path, json)
                    .with_context(|| format!("writing {}", path.display()))?;
            }
        }
    }

    Ok(())
}
