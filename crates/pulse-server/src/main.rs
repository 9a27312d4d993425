//! `pulse`: serves the dashboard API and runs poll maintenance.
//!
//! Reads `pulse.toml` (or the path given with `--config`) plus `PULSE_*`
//! environment variables.
//!
//! ```text
//! pulse serve                 # default
//! pulse check                 # compare the stored tally with the voter records
//! pulse reconcile             # overwrite the tally from the voter records
//! pulse new-voter             # print a fresh voter id
//! ```

mod config;

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context as _, bail};
use clap::{Args, Parser, Subcommand};
use pulse_api::{AppState, PollState};
use pulse_core::vote::{StatementId, VoterId};
use pulse_poll::VoteAggregator;
use pulse_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;

#[derive(Parser)]
#[command(author, version, about = "Overdose trends dashboard server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "pulse.toml", global = true)]
  config: PathBuf,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the HTTP API.
  Serve,
  /// Recompute the tally from the voter records and overwrite it.
  Reconcile(StatementArgs),
  /// Report drift between the stored tally and the voter records.
  Check(StatementArgs),
  /// Print a freshly minted voter id.
  NewVoter,
}

#[derive(Args)]
struct StatementArgs {
  /// Statement to operate on; defaults to `poll.statement_id`.
  #[arg(long)]
  statement: Option<String>,

  /// Statement text to store; defaults to `poll.statement_text`.
  #[arg(long)]
  text: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  if let Some(Command::NewVoter) = cli.command {
    println!("{}", VoterId::generate());
    return Ok(());
  }

  let cfg = ServerConfig::load(&cli.config)
    .with_context(|| format!("failed to read configuration from {:?}", cli.config))?;

  match cli.command.unwrap_or(Command::Serve) {
    Command::Serve => serve(cfg).await,
    Command::Reconcile(args) => reconcile(cfg, args).await,
    Command::Check(args) => check(cfg, args).await,
    Command::NewVoter => Ok(()),
  }
}

/// Open the configured store, or `None` if voting is not configured.
async fn open_store(cfg: &ServerConfig) -> anyhow::Result<Option<SqliteStore>> {
  let Some(store_cfg) = cfg.store() else {
    return Ok(None);
  };
  let path = store_cfg.resolved_path();
  let store = SqliteStore::open(&path)
    .await
    .with_context(|| format!("failed to open vote store at {path:?}"))?
    .with_max_attempts(store_cfg.max_attempts)
    .with_watch_interval(store_cfg.watch_interval());
  Ok(Some(store))
}

async fn require_store(cfg: &ServerConfig) -> anyhow::Result<SqliteStore> {
  match open_store(cfg).await? {
    Some(store) => Ok(store),
    None => bail!("no vote store configured (set store.path or PULSE_STORE__PATH)"),
  }
}

fn statement(cfg: &ServerConfig, args: &StatementArgs) -> anyhow::Result<StatementId> {
  let raw = args
    .statement
    .clone()
    .unwrap_or_else(|| cfg.poll.statement_id.clone());
  StatementId::new(raw).context("invalid statement id")
}

// ─── serve ───────────────────────────────────────────────────────────────────

async fn serve(cfg: ServerConfig) -> anyhow::Result<()> {
  let series = pulse_series::load_source(&cfg.dataset)
    .await
    .with_context(|| format!("failed to load dataset from {}", cfg.dataset))?;

  let poll = match open_store(&cfg).await? {
    Some(store) => Some(PollState {
      aggregator:     VoteAggregator::new(Arc::new(store)),
      statement_text: cfg.poll.statement_text.clone(),
    }),
    None => {
      tracing::warn!("no vote store configured; voting is disabled");
      None
    }
  };

  let app = pulse_api::router(AppState::new(series, poll)).layer(TraceLayer::new_for_http());
  let address = format!("{}:{}", cfg.host, cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

// ─── maintenance ─────────────────────────────────────────────────────────────

async fn reconcile(cfg: ServerConfig, args: StatementArgs) -> anyhow::Result<()> {
  let store = require_store(&cfg).await?;
  let statement = statement(&cfg, &args)?;
  let text = args.text.unwrap_or(cfg.poll.statement_text);

  let result = pulse_poll::reconcile(&store, &statement, &text)
    .await
    .context("reconciliation failed")?;

  let after = result.after.counts;
  match result.before {
    Some(before) if result.changed() => println!(
      "{statement}: {}/{} -> {}/{} (support/against) from {} records",
      before.support, before.against, after.support, after.against, result.records_scanned
    ),
    Some(_) => println!("{statement}: already in sync ({}/{})", after.support, after.against),
    None => println!(
      "{statement}: created {}/{} from {} records",
      after.support, after.against, result.records_scanned
    ),
  }
  Ok(())
}

async fn check(cfg: ServerConfig, args: StatementArgs) -> anyhow::Result<()> {
  let store = require_store(&cfg).await?;
  let statement = statement(&cfg, &args)?;

  let report = pulse_poll::check(&store, &statement)
    .await
    .context("drift check failed")?;

  match &report.stored {
    Some(tally) => println!(
      "stored:   {}/{} (updated {})",
      tally.counts.support, tally.counts.against, tally.updated_at
    ),
    None => println!("stored:   none"),
  }
  println!(
    "records:  {}/{} across {} voters",
    report.actual.support, report.actual.against, report.records
  );
  if report.in_sync() {
    println!("in sync");
  } else {
    tracing::warn!(%statement, "stored tally drifted; run `pulse reconcile`");
    println!("drifted");
  }
  Ok(())
}
