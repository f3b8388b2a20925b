//! firmograph binary.
//!
//! Reads `firmograph.toml` (or the path specified with `--config`), opens the
//! SQLite store, and runs one step of the normalization workflow:
//!
//! ```text
//! firmograph stage profiles.jsonl
//! firmograph migrate
//! firmograph finalize
//! firmograph stats
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use firmograph_core::{
  entity::Stage, pipeline::Pipeline, staging::NewStagingRecord, store::NormalizedStore,
};
use firmograph_etl::{EtlConfig, parse_profiles, parse_stage};
use firmograph_store_sqlite::SqliteStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Company-profile normalization engine")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "firmograph.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Load company profiles (JSON array or JSON lines) into staging.
  Stage {
    /// Profile file to load.
    file: PathBuf,
  },
  /// Run normalization stages over every staged record.
  Migrate {
    /// Stage to run; repeat for several. Defaults to all stages.
    #[arg(long = "stage", value_name = "STAGE", value_parser = parse_stage)]
    stages:   Vec<Stage>,
    /// Drop the staging payload columns once every stage has completed.
    #[arg(long)]
    finalize: bool,
  },
  /// Drop the staging payload columns. Fails unless every stage has run.
  Finalize,
  /// Print per-table row counts as JSON.
  Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  let cfg = EtlConfig::load(&cli.config)
    .with_context(|| format!("failed to load configuration from {:?}", cli.config))?;

  let store = SqliteStore::open(&cfg.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", cfg.store_path))?;
  let pipeline = Pipeline::new(store.clone(), cfg.pipeline_options());

  match cli.command {
    Command::Stage { file } => stage_file(&store, &file).await?,
    Command::Migrate { stages, finalize } => {
      let stages = if stages.is_empty() { Stage::all() } else { stages };
      let reports = pipeline.run(&stages).await.context("migration failed")?;
      println!("{}", serde_json::to_string_pretty(&reports)?);

      if finalize {
        finalize_schema(&pipeline).await?;
      }
    }
    Command::Finalize => finalize_schema(&pipeline).await?,
    Command::Stats => {
      let counts = store.table_counts().await.context("failed to count rows")?;
      println!("{}", serde_json::to_string_pretty(&counts)?);
    }
  }

  Ok(())
}

/// Stage every profile in `file`. Unparseable entries are logged and skipped.
async fn stage_file(store: &SqliteStore, file: &Path) -> anyhow::Result<()> {
  let input = tokio::fs::read_to_string(file)
    .await
    .with_context(|| format!("failed to read {file:?}"))?;

  let mut staged = 0usize;
  let mut skipped = 0usize;
  for (i, doc) in parse_profiles(&input).into_iter().enumerate() {
    let record = match doc
      .map_err(anyhow::Error::from)
      .and_then(|doc| Ok(NewStagingRecord::from_profile(doc)?))
    {
      Ok(record) => record,
      Err(e) => {
        tracing::warn!(entry = i, error = %e, "skipping profile");
        skipped += 1;
        continue;
      }
    };
    store
      .stage_record(record)
      .await
      .context("failed to stage profile")?;
    staged += 1;
  }

  tracing::info!(staged, skipped, file = %file.display(), "staging complete");
  Ok(())
}

async fn finalize_schema(pipeline: &Pipeline<SqliteStore>) -> anyhow::Result<()> {
  let barrier = pipeline
    .barrier()
    .await
    .context("refusing to finalize")?;
  let dropped = pipeline.finalize(&barrier).await.context("finalize failed")?;
  println!("{}", serde_json::to_string_pretty(&dropped)?);
  Ok(())
}
