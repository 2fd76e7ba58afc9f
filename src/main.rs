//! # ragrag CLI
//!
//! ## Usage
//!
//! ```bash
//! ragrag --config ./config/ragrag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragrag init` | Create the SQLite database and schema |
//! | `ragrag ingest [PATH]` | Ingest the corpus (or one file or directory) |
//! | `ragrag discover` | Search for papers and store summaries |
//! | `ragrag upgrade <ID>` | Replace one paper's summary with its full text |
//! | `ragrag upgrade-top` | Upgrade the most cited summary-only papers |
//! | `ragrag papers` | List stored papers |
//! | `ragrag stats` | Show store statistics |
//!
//! Logging goes to stderr and is controlled with `RUST_LOG`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use ragrag::{config, ingest, migrate, papers_cmd, stats};

/// ragrag: keep a local chunk store in sync with documents and papers.
#[derive(Parser)]
#[command(name = "ragrag", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ragrag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run more than once.
    Init,

    /// Ingest local documents.
    ///
    /// Without PATH the configured corpus root is scanned. Unchanged files
    /// are skipped; changed files have their chunks replaced.
    Ingest {
        /// A single file or a directory to scan.
        path: Option<PathBuf>,
    },

    /// Search for papers and store a summary chunk for each new one.
    Discover {
        /// Topic query. Repeatable; defaults to `discovery.topics`.
        #[arg(long = "topic")]
        topics: Vec<String>,

        /// Results requested per topic.
        #[arg(long)]
        limit: Option<usize>,

        /// Skip papers with fewer citations.
        #[arg(long)]
        min_citations: Option<u64>,
    },

    /// Fetch a paper's full text and replace its summary.
    Upgrade {
        /// External id (arXiv id, or `s2:<paperId>`).
        id: String,
    },

    /// Upgrade the most cited summary-only papers.
    UpgradeTop {
        /// Number of papers to upgrade.
        #[arg(long)]
        n: Option<usize>,

        /// Only consider papers with at least this many citations.
        #[arg(long)]
        min_citations: Option<u64>,
    },

    /// List stored papers, most cited first.
    Papers {
        /// Only papers still stored as a summary.
        #[arg(long)]
        summary_only: bool,
    },

    /// Show store statistics.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ragrag=info,warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { path } => {
            interruptible(ingest::run_ingest(&cfg, path.as_deref())).await?;
        }
        Commands::Discover {
            topics,
            limit,
            min_citations,
        } => {
            interruptible(papers_cmd::run_discover(&cfg, topics, limit, min_citations)).await?;
        }
        Commands::Upgrade { id } => {
            interruptible(papers_cmd::run_upgrade(&cfg, &id)).await?;
        }
        Commands::UpgradeTop { n, min_citations } => {
            interruptible(papers_cmd::run_upgrade_top(&cfg, n, min_citations)).await?;
        }
        Commands::Papers { summary_only } => {
            papers_cmd::run_papers(&cfg, summary_only).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}

/// Run a batch command until it finishes or Ctrl-C arrives.
///
/// Every store write is a single transaction, so stopping between documents
/// leaves each source either fully old or fully new.
async fn interruptible<F>(fut: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = anyhow::Result<()>>,
{
    tokio::select! {
        res = fut => res,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Interrupted.");
            std::process::exit(130);
        }
    }
}
