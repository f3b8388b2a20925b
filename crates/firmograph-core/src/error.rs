//! Error types for `firmograph-core`.

use thiserror::Error;

use crate::entity::Stage;

#[derive(Debug, Error)]
pub enum Error {
  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("unknown size bucket label: {0:?}")]
  UnknownSizeLabel(String),

  #[error("unknown stage: {0:?}")]
  UnknownStage(String),

  #[error("staging profile must be a JSON object")]
  ProfileNotObject,

  /// The finalizer barrier was requested before every stage had run.
  #[error("stages not yet complete: {0:?}")]
  StagesIncomplete(Vec<Stage>),

  #[error("staging schema is already finalized")]
  AlreadyFinalized,

  #[error("stage task failed: {0}")]
  StageTask(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
