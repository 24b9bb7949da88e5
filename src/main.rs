//! # Socratic Tutor CLI (`tutor`)
//!
//! The `tutor` binary ingests PDFs into a local vector store and answers
//! student questions about them with guiding questions instead of answers.
//!
//! ## Usage
//!
//! ```bash
//! tutor --config ./config/tutor.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tutor init` | Create the SQLite database and run schema migrations |
//! | `tutor ingest <pdf>...` | Extract, chunk, embed and store PDFs |
//! | `tutor documents` | List ingested documents and their chunk counts |
//! | `tutor extract <pdf>` | Dump the text the extractor sees |
//! | `tutor search "<q>" --document <name>` | Show retrieved chunks with scores |
//! | `tutor chat "<q>" --document <name>` | Ask the tutor one question |
//! | `tutor models` | List Gemini models that support `generateContent` |
//! | `tutor serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! tutor init
//! tutor ingest ./uploads/motor_vehicles_act.pdf
//! tutor chat "What is the fine for driving without a licence?" \
//!     --document motor_vehicles_act.pdf
//! tutor serve
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use socratic_tutor::{chat_cmd, config, documents, generation, ingest, migrate, search, server};

/// Socratic Tutor: guided questioning over your own PDFs.
///
/// All commands except `extract` and `models` read a TOML configuration file given by
/// `--config`. See `config/tutor.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "tutor",
    about = "Socratic Tutor: retrieval-grounded guided questioning over PDFs",
    version,
    long_about = "Socratic Tutor ingests PDF documents, splits them into heading-aware chunks, \
    embeds them into a local vector store, and answers student questions with guiding questions \
    grounded in the retrieved passages, via a CLI and an HTTP API."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/tutor.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the chunk and chat log tables.
    /// Running it more than once is safe.
    Init,

    /// Ingest one or more PDF documents.
    ///
    /// Each file is stored under its file name; re-ingesting a file
    /// replaces its chunks.
    Ingest {
        /// PDF files to ingest.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Store into this collection instead of `[retrieval].collection`.
        #[arg(long)]
        collection: Option<String>,
    },

    /// List ingested documents.
    Documents,

    /// Print the text extracted from a PDF, page by page.
    Extract {
        path: PathBuf,

        /// Write the dump to a file instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Show which chunks a question retrieves from a document.
    Search {
        query: String,

        /// Document (file name) to search within.
        #[arg(long)]
        document: String,

        /// Number of chunks to return. Defaults to `[retrieval].top_k`.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Ask the tutor a single question about a document.
    Chat {
        message: String,

        /// Document (file name) the question is about.
        #[arg(long)]
        document: String,

        /// Prior conversation as a JSON array, e.g.
        /// `[{"user":"...","bot":"..."}]`.
        #[arg(long)]
        history: Option<String>,
    },

    /// List the Gemini models `GOOGLE_API_KEY` can generate with.
    Models,

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Commands that don't require config
    match &cli.command {
        Commands::Extract { path, out } => {
            documents::run_extract(path, out.as_deref())?;
            return Ok(());
        }
        Commands::Models => {
            generation::run_models().await?;
            return Ok(());
        }
        _ => {}
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { paths, collection } => {
            ingest::run_ingest(&cfg, &paths, collection).await?;
        }
        Commands::Documents => {
            documents::run_documents(&cfg).await?;
        }
        Commands::Extract { .. } | Commands::Models => {
            // Handled above (before config loading)
            unreachable!()
        }
        Commands::Search {
            query,
            document,
            limit,
        } => {
            search::run_search(&cfg, &query, &document, limit).await?;
        }
        Commands::Chat {
            message,
            document,
            history,
        } => {
            chat_cmd::run_chat(&cfg, &message, &document, history.as_deref()).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
