//! Error types for `firmograph-etl`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("configuration error: {0}")]
  Config(#[from] config::ConfigError),

  #[error("unknown stage {0:?}")]
  UnknownStage(String),

  #[error("line {line}: {source}")]
  ProfileLine {
    line:   usize,
    #[source]
    source: serde_json::Error,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
