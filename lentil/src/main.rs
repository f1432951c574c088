use clap::{Parser, Subcommand};

use lentil::run_safe::{run_safe, SafeArgs};
use lentil::run_summary::{run_summary, SummaryArgs};

/// Spatial Analysis of Functional Enrichment over topological sample maps
#[derive(Parser, Debug)]
#[command(version, about, long_about)]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Permutation-based SAFE scoring with a per-feature enrichment summary
    Safe(SafeArgs),

    /// Recompute an enrichment summary from previously written SAFE scores
    Summary(SummaryArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.commands {
        Commands::Safe(args) => {
            run_safe(args)?;
        }
        Commands::Summary(args) => {
            run_summary(args)?;
        }
    }

    Ok(())
}
