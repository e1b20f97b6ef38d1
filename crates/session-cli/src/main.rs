//! Session CLI - restore, inspect, and change the stored sign-in session.

mod commands;
mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use output::OutputFormat;
use session_config_and_utils::{init_logging, Config, LogConfig, Paths};

/// Session lifecycle command-line interface.
#[derive(Parser)]
#[command(name = "session-cli")]
#[command(about = "Restore, inspect, and change the stored sign-in session")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error). Defaults to the configured level
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for config, logs, and the local store. Defaults to ~/.session-coordinator
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Restore the session and print the authentication state
    Status,
    /// Sign in with email and password
    Login {
        /// Account email
        #[arg(short, long)]
        email: String,
        /// Account password
        #[arg(short, long, env = "SESSION_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Sign out and clear stored credentials
    Logout,
    /// Print every authentication state change until Ctrl-C
    Watch,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let config = Config::load(&paths)?;

    // Initialize logging
    init_logging(&LogConfig {
        default_level: cli.log_level.unwrap_or_else(|| config.log_level.clone()),
        log_path: Some(paths.log_file()),
        also_stderr: true,
    })?;

    let coordinator = commands::build_coordinator(&config, &paths)?;

    match cli.command {
        Commands::Status => commands::status(coordinator, cli.format).await,
        Commands::Login { email, password } => {
            commands::login(coordinator, &email, password, cli.format).await
        }
        Commands::Logout => commands::logout(coordinator, cli.format).await,
        Commands::Watch => commands::watch(coordinator, cli.format).await,
    }
}
