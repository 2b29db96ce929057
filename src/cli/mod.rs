//! CLI module: command parsing and dispatch
//!
//! All CLI logic lives here. `main.rs` calls `cli::run()`.

pub mod agent;
pub mod config;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tether")]
#[command(version)]
#[command(about = "Local orchestration core for an LLM coding agent", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent (interactive unless --message is given)
    Agent {
        /// Direct message to process (non-interactive mode)
        #[arg(short, long)]
        message: Option<String>,
        /// Conversation to continue; a fresh one is created when omitted
        #[arg(long)]
        session: Option<String>,
        /// Provider to dispatch to (anthropic, openai)
        #[arg(long)]
        provider: Option<String>,
        /// Model override
        #[arg(long)]
        model: Option<String>,
    },
    /// Show or validate configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
    /// Show version information
    Version,
}

#[derive(Subcommand, Debug, Clone, Copy)]
pub enum ConfigAction {
    /// Print the resolved configuration (API keys redacted)
    Show,
    /// Validate the configuration file
    Check,
}

/// Entry point for the CLI, called from main().
pub async fn run() -> Result<()> {
    // A missing .env is normal.
    let _ = dotenvy::dotenv();

    // Load config early so we can respect the logging settings; fall back to
    // defaults if the config file is missing or unreadable.
    let logging_cfg = tether::config::Config::load()
        .map(|c| c.logging)
        .unwrap_or_default();
    if let Err(e) = tether::utils::logging::init_logging(&logging_cfg) {
        eprintln!("Warning: {}", e);
    }

    let cli = Cli::parse();

    match cli.command {
        None => {
            let mut cmd = Cli::command();
            cmd.print_help()?;
            println!();
        }
        Some(Commands::Version) => {
            cmd_version();
        }
        Some(Commands::Agent {
            message,
            session,
            provider,
            model,
        }) => {
            agent::cmd_agent(message, session, provider, model).await?;
        }
        Some(Commands::Config { action }) => {
            config::cmd_config(action.unwrap_or(ConfigAction::Show)).await?;
        }
    }

    Ok(())
}

/// Display version information
fn cmd_version() {
    println!("tether {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Local orchestration core for an LLM coding agent");
}
