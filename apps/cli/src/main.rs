//! batchload CLI - download a list of URLs with bounded concurrency and rate
//!
//! Reads one URL per line, stores each file under the save directory, and
//! prints how long the whole batch took.

mod commands;
mod output;
mod progress;

use anyhow::Result;
use batchload_core::LoaderError;
use clap::{Args, Parser, Subcommand};
use console::style;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// batchload - Rate-limited batch downloader
#[derive(Parser)]
#[command(name = "batchload")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Output format
    #[arg(long, default_value = "human")]
    output: OutputFormat,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Human,
    Json,
    Table,
}

#[derive(Subcommand)]
enum Commands {
    /// Download every URL listed in a file
    Load(LoadArgs),

    /// Show where each URL would be saved without downloading
    Plan {
        /// File with one URL per line
        url_file: PathBuf,

        /// Directory the files would be saved to
        #[arg(short = 'd', long, env = "BATCHLOAD_SAVE_DIR")]
        save_dir: Option<PathBuf>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Args)]
struct LoadArgs {
    /// File with one URL per line
    url_file: PathBuf,

    /// JSON settings file (saveDirectory, numberOfThreads, rateLimit, chunkSize, admission)
    #[arg(short, long, env = "BATCHLOAD_CONFIG")]
    config: Option<PathBuf>,

    /// Directory to save files to
    #[arg(short = 'd', long, env = "BATCHLOAD_SAVE_DIR")]
    save_dir: Option<PathBuf>,

    /// Max simultaneous downloads
    #[arg(short, long, env = "BATCHLOAD_THREADS")]
    threads: Option<usize>,

    /// Aggregate speed limit in bytes/sec
    #[arg(short, long, env = "BATCHLOAD_RATE_LIMIT")]
    rate_limit: Option<u64>,

    /// Bytes metered per rate limiter call
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Open connections before waiting for a slot (only the copy is bounded)
    #[arg(long)]
    admit_after_open: bool,

    /// Disable progress bars
    #[arg(long)]
    no_progress: bool,
}

fn init_logging(verbose: bool, progress_bars: bool) {
    let default_filter = match (verbose, progress_bars) {
        (true, _) => "info,batchload_core=debug",
        // Per-task log lines would tear through the progress bars
        (false, true) => "warn",
        (false, false) => "warn,batchload_core=info",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let progress_bars = matches!(&cli.command, Commands::Load(args) if !args.no_progress)
        && cli.output == OutputFormat::Human;
    init_logging(cli.verbose, progress_bars);

    let result = match cli.command {
        Commands::Load(args) => commands::load(args, progress_bars, cli.output).await,

        Commands::Plan { url_file, save_dir } => {
            commands::plan(url_file, save_dir, cli.output).await
        }

        Commands::Completions { shell } => {
            use clap::CommandFactory;
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "batchload",
                &mut std::io::stdout(),
            );
            Ok(())
        }
    };

    // Setup problems exit with 2, before any download was attempted
    if let Err(e) = &result {
        if e.downcast_ref::<LoaderError>().is_some_and(LoaderError::is_fatal) {
            eprintln!("{} {}", style("Cannot start batch:").red().bold(), e);
            std::process::exit(2);
        }
    }

    result
}
