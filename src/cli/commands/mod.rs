//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod config_cmd;
mod extract;
mod serve;

use clap::{Parser, Subcommand};

use crate::config::Settings;

#[derive(Parser)]
#[command(name = "mediapull")]
#[command(about = "Direct download link extraction for file-locker and pin pages")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Serve {
        /// Address to bind: a port, a host, or host:port
        #[arg(short, long, env = "MEDIAPULL_BIND")]
        bind: Option<String>,
    },

    /// Extract the direct link for one URL and print the JSON response
    Extract {
        /// File-locker or pin URL
        url: String,
        /// Source service (filelocker or pin); detected from the host when omitted
        #[arg(short, long)]
        source: Option<String>,
        /// Retrieval method: auto, http, bypass, browser, direct
        #[arg(short, long, default_value = "auto")]
        method: String,
        /// Skip the result cache
        #[arg(short, long)]
        force: bool,
    },

    /// Show effective settings
    Config,
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::from_env();

    match cli.command {
        Commands::Serve { bind } => serve::cmd_serve(settings, bind.as_deref()).await,
        Commands::Extract {
            url,
            source,
            method,
            force,
        } => extract::cmd_extract(settings, &url, source.as_deref(), &method, force).await,
        Commands::Config => config_cmd::cmd_config_show(&settings),
    }
}
