//! # docqa CLI
//!
//! ## Usage
//!
//! ```bash
//! docqa --config ./config/docqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa process <paths...>` | Extract, chunk, embed, and save an index |
//! | `docqa ask "<question>"` | Answer a question from the saved index |
//! | `docqa search "<question>"` | Show the ranked chunks for a question |
//! | `docqa serve` | Start the HTTP server |
//!
//! Logs go to stderr (`RUST_LOG`, default `info`); answers go to stdout.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use docqa::app::DocQa;
use docqa::config::{self, Config};
use docqa::extract::collect_documents;
use docqa_core::retrieve::Session;
use docqa_core::RagError;
use tracing_subscriber::EnvFilter;

/// Ask questions about your own documents.
#[derive(Parser)]
#[command(
    name = "docqa",
    about = "docqa: retrieval-augmented question answering over your own documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/docqa.toml`. A missing file means built-in defaults.
    #[arg(long, global = true, default_value = "./config/docqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an index from files or directories and save it.
    ///
    /// Supports `.pdf`, `.txt`, and `.md`. Directories are walked
    /// recursively. Replaces any index already saved at the output path.
    Process {
        /// Files or directories to index.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Output directory (defaults to `[index].path`).
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Answer a question from the saved index.
    Ask {
        question: String,

        /// Index directory (defaults to `[index].path`).
        #[arg(long)]
        index: Option<PathBuf>,

        /// Number of chunks to retrieve (defaults to `[retrieval].top_k`).
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Print the ranked chunks for a question without generating an answer.
    Search {
        question: String,

        #[arg(long)]
        index: Option<PathBuf>,

        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // Missing index and provider outages get the end-user message.
            match err.downcast_ref::<RagError>() {
                Some(rag) if rag.needs_rebuild() || rag.is_transient() => {
                    eprintln!("{}", rag.user_message())
                }
                _ => eprintln!("Error: {err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Process { paths, out } => {
            let out = out.unwrap_or_else(|| cfg.index.path.clone());
            cmd_process(&cfg, &paths, &out).await
        }
        Commands::Ask { question, index, k } => {
            let app = DocQa::from_config(&cfg)?;
            let session = open_session(&app, &cfg, index.as_deref())?;
            let answer = app.ask(&session, &question, k).await?;
            println!("{}", answer.text);
            if !answer.sources.is_empty() {
                eprintln!();
                for s in &answer.sources {
                    eprintln!("  [{}#{}] score={:.3}", s.document_id, s.chunk_index, s.score);
                }
            }
            Ok(())
        }
        Commands::Search { question, index, k } => {
            let app = DocQa::from_config(&cfg)?;
            let session = open_session(&app, &cfg, index.as_deref())?;
            let results = app.search(&session, &question, k).await?;
            for (rank, sc) in results.chunks.iter().enumerate() {
                let preview: String = sc.chunk.text.chars().take(160).collect();
                println!(
                    "{}. [{:.3}] {}#{}\n   {}",
                    rank + 1,
                    sc.score,
                    sc.chunk.document_id,
                    sc.chunk.chunk_index,
                    preview.replace('\n', " ")
                );
            }
            Ok(())
        }
        Commands::Serve => docqa::server::run_server(&cfg).await,
    }
}

async fn cmd_process(cfg: &Config, paths: &[PathBuf], out: &Path) -> anyhow::Result<()> {
    let documents = collect_documents(paths)?;
    let app = DocQa::from_config(cfg)?;

    let mut session = Session::new();
    let index = app.process(&mut session, &documents).await?;
    session
        .persist(out)
        .with_context(|| format!("Failed to save index to {}", out.display()))?;

    println!(
        "Processed {} document(s) into {} chunk(s); index saved to {}",
        documents.len(),
        index.len(),
        out.display()
    );
    Ok(())
}

fn open_session(app: &DocQa, cfg: &Config, index: Option<&Path>) -> anyhow::Result<Session> {
    let dir = index.unwrap_or(cfg.index.path.as_path());
    Ok(app.open_session(dir)?)
}
