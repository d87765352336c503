//! VoxPilot CLI — the main entry point.
//!
//! Commands:
//! - `run`     — Interactive session (each stdin line stands in for push-to-talk)
//! - `goal`    — Run a single goal from text or a recorded WAV file
//! - `config`  — Print or validate configuration
//! - `doctor`  — Diagnose system health

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "voxpilot",
    about = "VoxPilot — drive a web browser with your voice",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive session.
    ///
    /// A plain line starts a new goal; a line starting with `+` amends the
    /// current one.
    Run,

    /// Run a single goal and exit
    Goal {
        /// The goal, e.g. "open youtube and search for lofi"
        text: Option<String>,

        /// Transcribe this WAV recording instead of passing text
        #[arg(long, conflicts_with = "text")]
        audio: Option<PathBuf>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Diagnose system health
    Doctor,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the default configuration as TOML
    Default,
    /// Load and validate the current configuration
    Validate,
    /// Print the configuration file path
    Path,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run => commands::run::run().await?,
        Commands::Goal { text, audio } => commands::goal::run(text, audio).await?,
        Commands::Config { action } => match action {
            ConfigAction::Default => commands::config_cmd::show_default(),
            ConfigAction::Validate => commands::config_cmd::validate()?,
            ConfigAction::Path => commands::config_cmd::path(),
        },
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
