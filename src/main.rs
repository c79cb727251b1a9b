mod api;
mod app;
mod cache;
mod config;
mod db;
mod event;
mod sync;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "lexsync")]
#[command(about = "Offline cache and sync agent for the LegisFlow CEMAC legal practice suite")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/lexsync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Run the agent: watch connectivity and replay pending records
  Run,
  /// Queue a new record
  Enqueue {
    /// Record type: time-entry, document, matter, client or deadline
    kind: String,
    /// JSON payload of the record
    #[arg(long)]
    data: String,
  },
  /// Queue an edit to an existing record
  Edit {
    /// Record type: time-entry, document, matter, client or deadline
    kind: String,
    /// Current identifier of the record
    id: String,
    /// JSON payload replacing the record
    #[arg(long)]
    data: String,
  },
  /// Replay every pending record once
  Flush,
  /// Show pending/synced/dead-letter counts and cache usage
  Status,
  /// Fetch a URL through the cache router
  Get {
    /// Absolute URL or a path on the configured server
    url: String,
    /// Accept header sent with the request
    #[arg(long)]
    accept: Option<String>,
  },
  /// Pre-populate the static cache partition from the configured manifest
  Install,
  /// Retire stale cache partitions and purge expired entries
  Sweep,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;
  let _log_guard = init_tracing(&config)?;

  let mut app = app::App::new(config)?;

  match args.command {
    Command::Run => app.run().await,
    Command::Enqueue { kind, data } => app.enqueue(&kind, &data).await,
    Command::Edit { kind, id, data } => app.edit(&kind, &id, &data).await,
    Command::Flush => app.flush_all().await,
    Command::Status => app.status(),
    Command::Get { url, accept } => app.get(&url, accept.as_deref()).await,
    Command::Install => app.install().await,
    Command::Sweep => app.sweep(),
  }
}

/// Log to a daily file under the data directory; stdout stays reserved for
/// command output.
fn init_tracing(config: &config::Config) -> Result<WorkerGuard> {
  let log_dir = config.data_dir()?.join("logs");
  let appender = tracing_appender::rolling::daily(log_dir, "lexsync.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}
