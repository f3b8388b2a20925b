//! Error type for `firmograph-store-sqlite`.

use firmograph_core::entity::DimensionKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] firmograph_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored column did not hold the type its table declares.
  #[error("column decode error: {0}")]
  Decode(String),

  /// Every insert attempt collided with a concurrent writer and the winner's
  /// row could not be read back.
  #[error("could not resolve {0} value after repeated conflicts")]
  ResolveConflict(DimensionKind),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
