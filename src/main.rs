//! # docrag CLI (`rag`)
//!
//! The `rag` binary ingests a directory of documents into a vector index and
//! answers questions about them, from the terminal or over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! rag --config ./config/rag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rag init` | Create the SQLite database and schema |
//! | `rag ingest` | Rebuild the index from the documents directory |
//! | `rag ask "<question>"` | Answer one question, or chat interactively |
//! | `rag serve` | Start the HTTP chat server |
//! | `rag status` | Show what is indexed |
//!
//! ## Examples
//!
//! ```bash
//! # Preview what would be indexed
//! rag ingest --dry-run
//!
//! # Rebuild the index
//! rag ingest
//!
//! # One-shot question
//! rag ask "What is the refund policy?"
//!
//! # Verbose pipeline logs
//! RUST_LOG=docrag=debug rag ask
//! ```

use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use docrag::config;
use docrag::embedding::create_embedder;
use docrag::index::SqliteIndex;
use docrag::ingest;
use docrag::pipeline::RagPipeline;
use docrag::server;
use docrag::stats;

/// docrag: answer questions from your own documents with a local LLM.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/rag.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "rag",
    about = "Retrieval-augmented chat over a directory of documents",
    version,
    long_about = "docrag chunks and embeds the text, PDF and Word files in a documents \
    directory into a SQLite vector index, then answers questions by retrieving the closest \
    passages and asking an OpenAI-compatible chat model, citing the files it used."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Rebuild the index from the documents directory.
    ///
    /// Every run replaces the whole index. Unsupported or unreadable files
    /// are skipped with a warning.
    Ingest {
        /// Show document and chunk counts without embedding or writing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Ask a question.
    ///
    /// With no question, starts an interactive session that ends on
    /// `quit`, `exit` or end of input.
    Ask {
        /// The question to answer.
        question: Option<String>,
    },

    /// Start the HTTP chat server.
    ///
    /// Binds to `[server].bind` and serves the chat page, `POST /chat`,
    /// and citation links under `/documents/`.
    Serve,

    /// Show index statistics.
    Status,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let index = SqliteIndex::open(&cfg.db.path).await?;
            index.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { dry_run: true } => {
            let (_, report) = ingest::collect_chunks(&cfg)?;
            ingest::print_report(&report, true);
        }
        Commands::Ingest { dry_run: false } => {
            if !cfg.embedding.is_enabled() {
                anyhow::bail!("Embeddings are disabled; set [embedding].provider to ingest");
            }
            // Fail on a bad documents root before paying for model loading
            docrag::connector_fs::ensure_root(&cfg.documents.root)?;
            let embedder = create_embedder(&cfg.embedding)?;
            let index = SqliteIndex::open(&cfg.db.path).await?;
            let report = ingest::run_ingest(&cfg, embedder.as_ref(), &index).await;
            index.close().await;
            ingest::print_report(&report?, false);
        }
        Commands::Ask { question } => {
            let pipeline = RagPipeline::from_config(&cfg).await?;
            match question {
                Some(q) => println!("{}", pipeline.answer(&q).await),
                None => chat_loop(&pipeline).await?,
            }
        }
        Commands::Serve => {
            let pipeline = RagPipeline::from_config(&cfg).await?;
            server::run_server(&cfg, Arc::new(pipeline)).await?;
        }
        Commands::Status => {
            stats::run_status(&cfg).await?;
        }
    }

    Ok(())
}

/// Interactive question/answer loop on stdin.
async fn chat_loop(pipeline: &RagPipeline) -> anyhow::Result<()> {
    println!("Ready. Ask a question (`quit` or `exit` to leave).");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("\nYou: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if query.eq_ignore_ascii_case("quit") || query.eq_ignore_ascii_case("exit") {
            break;
        }

        println!("\nBot: {}", pipeline.answer(query).await);
    }
    Ok(())
}
