//! pampax binary entry point.
//!
//! Responsibilities kept at this boundary: argument parsing, logging
//! bootstrap (stderr plus optional rolling file under `.pampa/logs/`),
//! the CTRL-C handler, and the panic guard that turns any escape into an
//! `INTERNAL_ERROR` envelope instead of a raw backtrace on stdout.

use std::path::PathBuf;
use std::sync::atomic::Ordering;

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use pampax::cli::{self, Cli, Command};
use pampax::constants::{INDEX_DIR_NAME, LOG_DIR_NAME, LOG_FILE_NAME, SHUTDOWN_REQUESTED};
use pampax::error::PampaxError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    pampax::output::set_quiet(cli.quiet);

    let _log_guard = init_logging(cli.pretty, command_root(&cli.command));

    if let Err(e) = ctrlc::set_handler(|| {
        SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
        eprintln!("{}", "shutdown requested, finishing current step...".yellow());
    }) {
        tracing::warn!("could not install CTRL-C handler: {e}");
    }

    // The command runs in its own task so a panic surfaces as a JoinError
    // and can be reported through the normal envelope.
    let local = tokio::task::LocalSet::new();
    let exit_code = local
        .run_until(async {
            match tokio::task::spawn_local(cli::execute(cli)).await {
                Ok(code) => code,
                Err(join_err) if join_err.is_panic() => {
                    let err = PampaxError::Internal(
                        "unexpected panic while running the command; re-run with RUST_LOG=debug for details"
                            .to_string(),
                    );
                    cli::emit_error(&err);
                    1
                }
                Err(join_err) => {
                    cli::emit_error(&PampaxError::Internal(format!(
                        "command task failed: {join_err}"
                    )));
                    1
                }
            }
        })
        .await;

    std::process::exit(exit_code);
}

/// Repository root a command will operate on, for file logging.
fn command_root(command: &Command) -> PathBuf {
    let path = match command {
        Command::Index { path, .. }
        | Command::Update { path, .. }
        | Command::Search { path, .. }
        | Command::Info { path } => path.clone(),
    };
    path.unwrap_or_else(|| PathBuf::from("."))
}

/// Initialize tracing: stderr always, a rolling file when the index
/// directory already exists. Returns the appender guard that must stay
/// alive for the process lifetime.
fn init_logging(
    pretty: bool,
    root: PathBuf,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_layer = if pretty {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    };

    let log_dir = root.join(INDEX_DIR_NAME).join(LOG_DIR_NAME);
    let file_setup = if root.join(INDEX_DIR_NAME).exists() {
        std::fs::create_dir_all(&log_dir).ok().map(|_| {
            let appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_NAME);
            tracing_appender::non_blocking(appender)
        })
    } else {
        None
    };

    match file_setup {
        Some((writer, guard)) => {
            let file_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .boxed();
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(file_layer)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .init();
            None
        }
    }
}
