use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use fhirgraph::{
    config::Config,
    graph::{self, GraphStore},
    logging,
    services::{BatchIngestor, GraphSummary, IngestSummary},
};

#[derive(Parser)]
#[command(
    name = "fhirgraph",
    about = "Load FHIR bundles into a property graph",
    version,
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest every bundle file in a directory, then rebuild condition timelines.
    Ingest {
        /// Directory of bundle files. Defaults to `ingest.data_dir`.
        #[arg(short, long, value_name = "DIR")]
        dir: Option<PathBuf>,
        /// Only pick up files with this extension. Defaults to `ingest.file_extension`.
        #[arg(short, long)]
        extension: Option<String>,
        /// Delete all nodes and relationships first.
        #[arg(long, action = ArgAction::SetTrue)]
        clear: bool,
        /// Print the summary as JSON instead of a table.
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },

    /// Print node counts per label.
    Summary {
        /// Print as JSON.
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },

    /// Delete every node and relationship in the graph.
    Clear {
        /// Confirm the deletion.
        #[arg(long, action = ArgAction::SetTrue)]
        yes: bool,
    },

    /// Create the `id` uniqueness constraint for every label.
    Constraints,

    /// Extract one bundle file and print the records as JSON. Does not touch the graph.
    Extract {
        /// Path to a bundle JSON file.
        file: PathBuf,
        /// Pretty-print JSON output.
        #[arg(long, action = ArgAction::SetTrue)]
        pretty: bool,
    },

    /// Print CLI version.
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load().context("Failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {e}"))?;
    let _logging_guard =
        logging::init_logging(&config.logging).context("Failed to initialize logging")?;

    match cli.command {
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
        }
        Commands::Extract { file, pretty } => {
            let bundle = BatchIngestor::extract_file(&file).await?;
            let output = if pretty {
                serde_json::to_string_pretty(&bundle)?
            } else {
                serde_json::to_string(&bundle)?
            };
            println!("{output}");
        }
        Commands::Ingest {
            dir,
            extension,
            clear,
            json,
        } => {
            if clear {
                config.ingest.clear_before_ingest = true;
            }
            if let Some(extension) = extension {
                config.ingest.file_extension = extension;
            }
            let dir = dir.unwrap_or_else(|| config.ingest.data_dir.clone());

            let store = connect(&config).await?;
            let ingestor = BatchIngestor::new(store, config.ingest.clone());
            let summary = ingestor
                .ingest_directory(&dir)
                .await
                .with_context(|| format!("Ingestion of {} failed", dir.display()))?;
            let graph = ingestor.graph_summary().await?;

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "ingest": summary,
                        "graph": graph,
                    }))?
                );
            } else {
                print_ingest_summary(&summary);
                print_graph_summary(&graph);
            }
        }
        Commands::Summary { json } => {
            let store = connect(&config).await?;
            let graph = BatchIngestor::new(store, config.ingest.clone())
                .graph_summary()
                .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&graph)?);
            } else {
                print_graph_summary(&graph);
            }
        }
        Commands::Clear { yes } => {
            if !yes {
                anyhow::bail!("Refusing to clear the graph without --yes");
            }
            let store = connect(&config).await?;
            store.clear().await?;
            println!("Graph cleared");
        }
        Commands::Constraints => {
            let store = connect(&config).await?;
            BatchIngestor::new(store, config.ingest.clone())
                .ensure_constraints()
                .await?;
            println!("Uniqueness constraints ensured");
        }
    }

    Ok(())
}

async fn connect(config: &Config) -> Result<Arc<dyn GraphStore>> {
    graph::connect(&config.graph)
        .await
        .with_context(|| format!("Failed to connect to graph store at {}", config.graph.uri))
}

fn print_ingest_summary(summary: &IngestSummary) {
    println!(
        "Files: {} found, {} processed, {} failed ({} ms)",
        summary.files_found,
        summary.files_processed,
        summary.failures.len(),
        summary.elapsed_ms
    );
    for failure in &summary.failures {
        println!("  FAILED {}: {}", failure.file.display(), failure.error);
    }

    println!("Nodes created:");
    for (kind, created) in &summary.created {
        let duplicates = summary.duplicates.get(kind).copied().unwrap_or(0);
        println!("  {:<20} {:>8} (duplicates: {})", kind.to_string(), created, duplicates);
    }

    println!("Relationships created:");
    for (rel, created) in &summary.relationships {
        println!("  {:<24} {:>8}", rel.as_str(), created);
    }

    if summary.skipped_resources > 0 {
        println!("Skipped malformed resources: {}", summary.skipped_resources);
    }
    if !summary.unsupported.is_empty() {
        let ignored: usize = summary.unsupported.values().sum();
        println!(
            "Ignored unsupported resources: {} across {} types",
            ignored,
            summary.unsupported.len()
        );
    }

    let temporal = &summary.temporal;
    println!(
        "Condition timelines: {} patients, {} with conditions, {} NEXT_CONDITION edges",
        temporal.patients, temporal.patients_with_conditions, temporal.next_edges
    );
    for chain in &temporal.truncated {
        println!(
            "  TRUNCATED {}: kept {}, dropped {}",
            chain.patient_id, chain.conditions, chain.dropped
        );
    }
}

fn print_graph_summary(graph: &GraphSummary) {
    println!("Graph nodes:");
    for (kind, count) in &graph.nodes {
        println!("  {:<20} {:>8}", kind.to_string(), count);
    }
    println!("  {:<20} {:>8}", "Total", graph.total);
}
