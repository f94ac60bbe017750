//! AutoLite CLI: the main entry point.
//!
//! Commands:
//! - `run`: Start the autonomous agent loop
//! - `memory`: Inspect or edit the long-term memory store
//! - `config`: Show, locate, or initialise the configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "autolite",
    about = "AutoLite: an autonomous agent for local LLMs",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Use this config file instead of ~/.autolite/config.toml
    #[arg(short = 'C', long, global = true, env = "AUTOLITE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent loop
    Run {
        /// Don't ask for feedback between cycles
        #[arg(short, long)]
        continuous: bool,

        /// Stop after this many cycles in continuous mode (0 = unlimited)
        #[arg(short = 'l', long)]
        continuous_limit: Option<u32>,

        /// Add a goal (repeatable); replaces the configured goals
        #[arg(short, long = "goal")]
        goals: Vec<String>,

        /// Override the agent's name
        #[arg(long)]
        name: Option<String>,

        /// Override the agent's role
        #[arg(long)]
        role: Option<String>,
    },

    /// Manage long-term memory
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum MemoryAction {
    /// Show record count and matrix shape
    Stats,
    /// Find the stored texts most relevant to a query
    Search {
        query: String,
        #[arg(short, long, default_value_t = 5)]
        limit: usize,
    },
    /// Store a text
    Add { text: String },
    /// Delete every stored text
    Clear {
        #[arg(long)]
        confirm: bool,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Run {
            continuous,
            continuous_limit,
            goals,
            name,
            role,
        } => {
            let overrides = commands::run::RunOverrides {
                continuous,
                continuous_limit,
                goals,
                name,
                role,
            };
            commands::run::run(config_path, overrides).await?
        }
        Commands::Memory { action } => match action {
            MemoryAction::Stats => commands::memory::stats(config_path).await?,
            MemoryAction::Search { query, limit } => commands::memory::search(config_path, &query, limit).await?,
            MemoryAction::Add { text } => commands::memory::add(config_path, &text).await?,
            MemoryAction::Clear { confirm } => commands::memory::clear(config_path, confirm).await?,
        },
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(config_path)?,
            ConfigAction::Path => commands::config_cmd::path(config_path),
            ConfigAction::Init { force } => commands::config_cmd::init(config_path, force)?,
        },
    }

    Ok(())
}
