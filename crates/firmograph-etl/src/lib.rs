//! Configuration and input handling for the `firmograph` binary.

pub mod error;

pub use error::{Error, Result};

use std::path::{Path, PathBuf};

use firmograph_core::{entity::Stage, pipeline::PipelineOptions};
use serde::Deserialize;
use serde_json::Value;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Prefix for environment overrides, e.g. `FIRMOGRAPH_STORE_PATH`.
pub const ENV_PREFIX: &str = "FIRMOGRAPH";

/// Runtime configuration, deserialised from `firmograph.toml` and the
/// environment.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct EtlConfig {
  #[serde(default = "default_store_path")]
  pub store_path:        PathBuf,
  #[serde(default = "default_concurrent_stages")]
  pub concurrent_stages: bool,
}

fn default_store_path() -> PathBuf { PathBuf::from("firmograph.db") }

fn default_concurrent_stages() -> bool { true }

impl EtlConfig {
  /// Layer the (optional) file at `path` under `FIRMOGRAPH_*` variables.
  pub fn load(path: &Path) -> Result<Self> {
    Self::from_builder(
      config::Config::builder()
        .add_source(config::File::from(path.to_path_buf()).required(false)),
    )
  }

  /// Finish `builder` with the environment layer and deserialise.
  pub fn from_builder(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
  ) -> Result<Self> {
    let mut cfg: EtlConfig = builder
      .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
      .build()?
      .try_deserialize()?;
    cfg.store_path = expand_tilde(&cfg.store_path);
    Ok(cfg)
  }

  pub fn pipeline_options(&self) -> PipelineOptions {
    PipelineOptions { concurrent_stages: self.concurrent_stages }
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

// ─── Input ────────────────────────────────────────────────────────────────────

/// Parse a stage name as accepted on the command line.
pub fn parse_stage(name: &str) -> Result<Stage> {
  name
    .trim()
    .parse()
    .map_err(|_| Error::UnknownStage(name.to_owned()))
}

/// Split a profile file into individual JSON documents.
///
/// A file whose whole content is a JSON array yields its elements; a single
/// JSON object yields itself. Anything else is read as JSON lines, where each
/// non-blank line is parsed independently and a bad line yields `Err(…)` in
/// its position without aborting the rest.
pub fn parse_profiles(input: &str) -> Vec<Result<Value>> {
  match serde_json::from_str::<Value>(input) {
    Ok(Value::Array(items)) => return items.into_iter().map(Ok).collect(),
    Ok(doc @ Value::Object(_)) => return vec![Ok(doc)],
    _ => {}
  }

  input
    .lines()
    .enumerate()
    .filter(|(_, line)| !line.trim().is_empty())
    .map(|(i, line)| {
      serde_json::from_str(line).map_err(|source| Error::ProfileLine { line: i + 1, source })
    })
    .collect()
}
