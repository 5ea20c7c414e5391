//! docqa - ask questions about a PDF corpus from the command line

mod cli;
mod extract;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Commands};
use docqa_rag::{IngestReport, QueryOutcome, RagConfig, RagPipeline};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "config.yml";

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let command = match cli.resolve() {
        Ok(command) => command,
        Err(e) => e.exit(),
    };
    init_tracing(cli.verbose);

    match command {
        Commands::Query { question } => {
            let start = Instant::now();
            match answer(cli.config.as_deref(), &question).await {
                Ok(outcome) => {
                    println!("{}", render_response(&outcome, start.elapsed().as_secs_f64()));
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("Error: {e:#}");
                    eprintln!("Time taken: {:.2} seconds", start.elapsed().as_secs_f64());
                    ExitCode::FAILURE
                }
            }
        }
        Commands::Ingest { files } => match ingest(cli.config.as_deref(), &files).await {
            Ok(report) => {
                println!(
                    "Ingested {} document(s) into '{}': {} chunks (generation {})",
                    report.document_count, report.collection, report.chunk_count, report.generation
                );
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Error: {e:#}");
                ExitCode::FAILURE
            }
        },
    }
}

/// Log to stderr, `info` by default, `RUST_LOG` when set, `debug` with `--verbose`.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

/// Load an explicit config file, else `./config.yml` if present, else defaults.
fn load_config(path: Option<&Path>) -> anyhow::Result<RagConfig> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None if Path::new(DEFAULT_CONFIG).exists() => PathBuf::from(DEFAULT_CONFIG),
        None => {
            info!("no {DEFAULT_CONFIG} found, using default configuration");
            return Ok(RagConfig::default());
        }
    };
    RagConfig::load(&path).with_context(|| format!("loading configuration from {}", path.display()))
}

async fn answer(config: Option<&Path>, question: &str) -> anyhow::Result<QueryOutcome> {
    let config = load_config(config)?;
    let pipeline = RagPipeline::from_config(config).await.context("setting up the pipeline")?;
    pipeline.answer(question).await.context("answering the question")
}

async fn ingest(config: Option<&Path>, files: &[PathBuf]) -> anyhow::Result<IngestReport> {
    let config = load_config(config)?;
    let documents = extract::load_documents(files).context("extracting document text")?;
    let pipeline = RagPipeline::from_config(config).await.context("setting up the pipeline")?;
    pipeline.ingest(&documents).await.context("rebuilding the collection")
}

fn render_response(outcome: &QueryOutcome, seconds: f64) -> String {
    format!("Response: {}\n{}\nTime taken: {seconds:.2} seconds", outcome.answer, "=".repeat(50))
}
