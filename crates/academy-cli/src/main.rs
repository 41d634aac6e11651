//! Academy CLI - a terminal front end for the Academy learning platform.
//!
//! Every invocation restores the saved session first, then runs one
//! command: sign in, register, sign out, show the session, open a guarded
//! page, or fetch a protected API resource.

mod app;

use std::io;
use std::path::PathBuf;

use academy_core::config::Backend;
use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::App;

/// Log file name prefix inside `--log-dir`
const LOG_FILE_PREFIX: &str = "academy.log";

#[derive(Parser)]
#[command(name = "academy", version, about = "Sign in to Academy and open protected pages")]
struct Cli {
    /// Identity backend, overriding the config file
    #[arg(long, value_enum, global = true)]
    backend: Option<BackendArg>,

    /// Also write logs to a daily-rolling file in this directory
    #[arg(long, global = true, env = "ACADEMY_LOG_DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendArg {
    Http,
    Local,
}

impl From<BackendArg> for Backend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Http => Backend::Http,
            BackendArg::Local => Backend::Local,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Sign in with email and password
    Login {
        #[arg(long, env = "ACADEMY_EMAIL")]
        email: Option<String>,
    },
    /// Create an account and sign in
    Register {
        #[arg(long)]
        name: String,
        #[arg(long, env = "ACADEMY_EMAIL")]
        email: Option<String>,
    },
    /// Sign out and forget the saved session
    Logout,
    /// Show the current session
    Status,
    /// Open a page through the route guard
    Open { path: String },
    /// GET a protected API resource and print the JSON
    Fetch { path: String },
}

/// Initialize the tracing subscriber for logging
fn init_tracing(log_dir: Option<PathBuf>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_dir);
    info!("Academy CLI starting");

    let mut app = App::new(cli.backend.map(Backend::from))?;
    app.restore().await;

    match cli.command {
        Command::Login { email } => app.login(email).await?,
        Command::Register { name, email } => app.register(&name, email).await?,
        Command::Logout => app.logout(),
        Command::Status => app.print_status(),
        Command::Open { path } => {
            app.open(&path);
        }
        Command::Fetch { path } => app.fetch(&path).await?,
    }

    Ok(())
}
