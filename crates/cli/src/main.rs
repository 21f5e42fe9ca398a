//! Chronicle CLI: the main entry point.
//!
//! Commands:
//! - `config`    Show, validate, or print the default configuration
//! - `replay`    Feed a transcript through a session
//! - `append`    Record one entry
//! - `undo`      Remove the newest entry
//! - `edit`      Rewrite an entry, chunk summary, or deep memory
//! - `context`   Print the assembled prompt context
//! - `stats`     Show token statistics
//!
//! Session state lives in a JSON file (`--state`) holding the memory
//! snapshot; every mutating command rewrites it.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

use commands::GlobalOpts;

#[derive(Parser)]
#[command(
    name = "chronicle",
    about = "Chronicle: three-tier narrative memory for LLM storytelling",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use the heuristic tokenizer and extractive summarizer (no network)
    #[arg(long, global = true)]
    offline: bool,

    /// Session state file
    #[arg(
        long,
        global = true,
        env = "CHRONICLE_STATE",
        default_value = "chronicle-state.json"
    )]
    state: PathBuf,

    /// Config file (defaults to ~/.chronicle/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Feed a transcript through the session, one entry per line
    Replay {
        /// Transcript file; lines may start with `player:` or `narrator:`
        transcript: PathBuf,
    },

    /// Record a new entry
    Append {
        text: String,

        /// Who wrote the entry (player or narrator)
        #[arg(short, long, default_value = "narrator")]
        author: String,
    },

    /// Remove the newest entry
    Undo,

    /// Rewrite stored text
    Edit {
        #[command(subcommand)]
        target: EditTarget,
    },

    /// Print the prompt context assembled within a token budget
    Context {
        /// Maximum tokens of memory content
        #[arg(short, long, default_value_t = 2000)]
        budget: usize,

        /// Print sections and metadata as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show token statistics
    Stats,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the default configuration
    Default,
    /// Print the config file path
    Path,
    /// Validate the configuration
    Validate,
}

#[derive(Subcommand)]
enum EditTarget {
    /// An entry still in recent history
    Entry { ordinal: u64, text: String },
    /// A live chunk's summary
    Chunk { id: u64, text: String },
    /// The deep memory summary
    Deep { text: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays pipeable.
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let opts = GlobalOpts {
        state: cli.state,
        config: cli.config,
        offline: cli.offline,
    };

    match cli.command {
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(&opts).await?,
            ConfigAction::Default => commands::config_cmd::default().await?,
            ConfigAction::Path => commands::config_cmd::path(&opts).await?,
            ConfigAction::Validate => commands::config_cmd::validate(&opts).await?,
        },
        Commands::Replay { transcript } => commands::memory::replay(&opts, &transcript).await?,
        Commands::Append { text, author } => {
            let author = author.parse::<chronicle_core::Author>()?;
            commands::memory::append(&opts, text, author).await?
        }
        Commands::Undo => commands::memory::undo(&opts).await?,
        Commands::Edit { target } => match target {
            EditTarget::Entry { ordinal, text } => {
                commands::memory::edit_entry(&opts, ordinal, text).await?
            }
            EditTarget::Chunk { id, text } => commands::memory::edit_chunk(&opts, id, text).await?,
            EditTarget::Deep { text } => commands::memory::edit_deep(&opts, text).await?,
        },
        Commands::Context { budget, json } => commands::memory::context(&opts, budget, json).await?,
        Commands::Stats => commands::memory::stats(&opts).await?,
    }

    Ok(())
}
