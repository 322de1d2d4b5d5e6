use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, error, info, trace};

use genome_release::config::ReleaseConfig;
use genome_release::release::Release;

/// Build release documents from normalized genomic collections
#[derive(Parser)]
#[command(name = "genome-release")]
#[command(about = "Join, project and index a genomic data release", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv for all)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to configuration file (YAML or TOML)
    #[arg(short = 'c', long, global = true, default_value = "release.yml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the document type registry and list its entries
    Registry,
    /// Run the clinical and observation joins
    Join,
    /// Assemble documents for the configured document types
    Index,
    /// Write donor export cells
    Export,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        2 => "trace",
        _ => "trace,tokio=debug",
    };

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(cli.verbose >= 2)
        .with_thread_ids(cli.verbose >= 3)
        .with_line_number(cli.verbose >= 3)
        .init();

    debug!("genome-release started with verbosity level: {}", cli.verbose);
    trace!("Full CLI args: {:?}", std::env::args().collect::<Vec<_>>());

    if let Err(e) = run(cli).await {
        error!("Fatal error: {:#}", e);
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = ReleaseConfig::load(&cli.config)
        .await
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    let release = Release::new(config);

    match cli.command {
        Commands::Registry => run_registry(&release),
        Commands::Join => {
            let summary = release.join().await.context("Join failed")?;
            println!(
                "Joined {} donors and {} occurrences of {} mutations",
                summary.donors,
                summary.occurrences,
                summary.tallies.len()
            );
            Ok(())
        }
        Commands::Index => {
            let report = release.index().await.context("Indexing failed")?;
            info!(?report, "Index run finished");
            println!(
                "Wrote {} documents from {} records ({} skipped)",
                report.documents, report.records, report.skipped
            );
            Ok(())
        }
        Commands::Export => {
            let report = release.export().await.context("Export failed")?;
            println!("Exported {} donor rows", report.documents);
            Ok(())
        }
    }
}

fn run_registry(release: &Release) -> anyhow::Result<()> {
    let registry = release.registry().context("Registry validation failed")?;
    println!("{} document types:", registry.len());
    for spec in registry.iter() {
        let broadcasts = spec
            .broadcasts
            .iter()
            .map(|b| b.as_str())
            .collect::<Vec<_>>()
            .join(",");
        println!(
            "  {:<20} {:<12} {:<8} batch={:<5} status={:<6} broadcasts=[{}] -> {:?}",
            spec.document_type.as_str(),
            spec.collection.as_str(),
            format!("{:?}", spec.classifier).to_lowercase(),
            spec.batch_size,
            spec.status_interval,
            broadcasts,
            spec.destination
        );
    }
    Ok(())
}
