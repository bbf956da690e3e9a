//! # aqua-console
//!
//! Command-line client for an aquarium controller: stores the session
//! credentials, issues authenticated REST calls, and follows the push
//! channel.

#![deny(unsafe_code)]

mod commands;
mod session;

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::session::Session;

/// Aquarium controller console.
#[derive(Parser, Debug)]
#[command(name = "aqua-console", about = "Aquarium controller console")]
struct Cli {
    /// Settings file (defaults to `~/.aqua/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Log level override (error, warn, info, debug, trace).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store an access and renewal credential pair.
    Login {
        #[arg(long)]
        access: String,
        #[arg(long)]
        renewal: String,
    },
    /// Clear stored credentials.
    Logout,
    /// Show stored credential presence and endpoints.
    Status,
    /// Renew the session now.
    Renew,
    /// Send an authenticated REST call.
    Call {
        /// HTTP method.
        method: String,
        /// Path relative to the REST base URL.
        path: String,
        /// JSON request body.
        #[arg(long)]
        body: Option<String>,
    },
    /// Follow the push channel and print events as JSON lines.
    Watch {
        /// Application event to subscribe to (repeatable).
        #[arg(long = "event")]
        events: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let mut settings = match &args.settings {
        Some(path) => aqua_settings::load_settings_from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => aqua_settings::load_settings().context("Failed to load settings")?,
    };
    if let Some(level) = args.log_level.as_deref() {
        settings.logging.level = aqua_settings::loader::parse_log_level(level)
            .with_context(|| format!("Unknown log level: {level}"))?;
    }
    aqua_core::logging::init_subscriber(settings.logging.level.as_filter_str());

    let session = Session::open(settings, &aqua_settings::aqua_home())?;
    let mut stdout = std::io::stdout().lock();
    run(args.command, &session, &mut stdout).await?;
    stdout.flush()?;
    Ok(())
}

async fn run(command: Command, session: &Session, out: &mut dyn Write) -> Result<()> {
    match command {
        Command::Login { access, renewal } => commands::login(session, &access, &renewal, out),
        Command::Logout => commands::logout(session, out),
        Command::Status => commands::status(session, out),
        Command::Renew => commands::renew(session, out).await,
        Command::Call { method, path, body } => {
            commands::call(session, &method, &path, body.as_deref(), out).await
        }
        Command::Watch { events } => commands::watch(session, &events, out).await,
    }
}
