//! `taskboard` -- interactive board shell over an in-memory remote store.
//!
//! ```bash
//! cargo run --bin taskboard -- --seed tasks.json
//! ```
//!
//! Logs go to `$TMPDIR/taskboard.log` unless `--log-file` is given.

use std::io;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_appender::non_blocking::WorkerGuard;

use taskboard::config::{BoardConfig, CliArgs};
use taskboard::engine::Engine;
use taskboard::gateway::memory::InMemoryGateway;
use taskboard::shell::{self, Command};
use taskboard_proto::codec;
use taskboard_proto::task::Task;

#[tokio::main]
async fn main() -> io::Result<()> {
    let cli = CliArgs::parse();

    let config = match BoardConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            BoardConfig::default()
        }
    };

    let _log_guard = init_logging(&config.log_level, config.log_file.as_deref());
    tracing::info!("taskboard starting");

    let seed = match config.seed_file.as_deref() {
        Some(path) => load_seed(path)?,
        None => Vec::new(),
    };
    let engine = Arc::new(Engine::new(
        InMemoryGateway::with_tasks(seed),
        config.engine(),
    ));

    if let Err(e) = engine.refresh().await {
        eprintln!("initial load failed: {e}");
    }

    let mut events = engine.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => println!("* {}", shell::describe_event(&event)),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "board events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let result = run_shell(&engine).await;

    printer.abort();
    tracing::info!("taskboard exiting");
    result
}

async fn run_shell(engine: &Engine<InMemoryGateway>) -> io::Result<()> {
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("{}", shell::render_board(&engine.board("")));
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let command: Command = match line.parse() {
            Ok(command) => command,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };
        if command == Command::Quit {
            break;
        }

        match shell::execute(engine, command).await {
            Ok(output) => println!("{output}"),
            Err(e) => {
                let hint = if e.is_retryable() { " (try again)" } else { "" };
                println!("error: {e}{hint}");
            }
        }
    }
    Ok(())
}

fn load_seed(path: &Path) -> io::Result<Vec<Task>> {
    let bytes = std::fs::read(path)?;
    codec::decode(&bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Initialize file-based logging. Stdout belongs to the shell.
///
/// The returned [`WorkerGuard`] must be held until shutdown so buffered
/// entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("taskboard.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_env("TASKBOARD_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}
