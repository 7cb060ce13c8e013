//! # Verity CLI (`verity`)
//!
//! The `verity` binary runs the relay server and gives command-line access
//! to the detection API and the per-category analysis history.
//!
//! ## Usage
//!
//! ```bash
//! verity --config ./config/verity.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `verity init` | Create the SQLite database and run schema migrations |
//! | `verity serve` | Start the relay HTTP server |
//! | `verity analyze <category> <path>` | Analyze a media file and record the result |
//! | `verity analyze misinfo --text "<text>"` | Analyze a piece of text |
//! | `verity history <category>` | List recent analyses, newest first |
//! | `verity history <category> --clear` | Clear a category's history |
//! | `verity stats` | Per-category history counts |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! verity init --config ./config/verity.toml
//!
//! # Check an image against the detection API
//! verity analyze image ./suspect.png
//!
//! # Check a claim
//! verity analyze misinfo --text "The moon landing was staged"
//!
//! # Start the relay for the web UI
//! verity serve
//! ```
//!
//! Log verbosity is controlled by `RUST_LOG` (default `warn`).

mod analyze;
mod config;
mod db;
mod history_cmd;
mod migrate;
mod relay;
mod server;
mod sqlite_store;
mod uploads;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Verity CLI: a relay and local analysis history for deepfake, synthetic
/// media, and misinformation detection services.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/verity.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "verity",
    about = "Verity: relay and analysis history for media-authenticity and misinformation detection",
    version,
    long_about = "Verity forwards videos, audio clips, images, and text to an external detection \
    service, interprets its answers into verdicts, and keeps the ten most recent results per \
    category in a local history."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/verity.toml`. A missing file falls back to
    /// built-in defaults.
    #[arg(long, global = true, default_value = "./config/verity.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the history table. This
    /// command is idempotent; running it multiple times is safe.
    Init,

    /// Start the relay HTTP server.
    ///
    /// Binds to `[server].bind` and serves the upload, proxy, and history
    /// endpoints.
    Serve {
        /// Keep history in memory instead of the SQLite database.
        #[arg(long)]
        ephemeral: bool,
    },

    /// Analyze a file or text and record the result.
    ///
    /// Category is one of `deepfake`, `audio`, `image`, `misinfo`.
    /// Misinformation takes `--text`, or reads the text from `path`.
    Analyze {
        /// Analysis category.
        category: String,

        /// File to analyze.
        path: Option<PathBuf>,

        /// Text to analyze (misinfo only).
        #[arg(long)]
        text: Option<String>,
    },

    /// Show or clear a category's analysis history.
    History {
        /// Analysis category.
        category: String,

        /// Remove every record in the category.
        #[arg(long)]
        clear: bool,
    },

    /// Show per-category history counts.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let mut cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve { ephemeral } => {
            if ephemeral {
                cfg.server.ephemeral_history = true;
            }
            server::run_server(&cfg).await?;
        }
        Commands::Analyze {
            category,
            path,
            text,
        } => {
            analyze::run_analyze(&cfg, &category, path.as_deref(), text.as_deref()).await?;
        }
        Commands::History { category, clear } => {
            history_cmd::run_history(&cfg, &category, clear).await?;
        }
        Commands::Stats => {
            history_cmd::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
