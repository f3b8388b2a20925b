//! The `NormalizedStore` trait.
//!
//! Implemented by storage backends (e.g. `firmograph-store-sqlite`). The
//! [`Pipeline`](crate::pipeline::Pipeline) depends on this abstraction only.

use std::{collections::BTreeSet, future::Future};

use uuid::Uuid;

use crate::{
  entity::{DetailKind, DetailRow, DetailValue, Dimension, DimensionKind, DimensionValue, Link, Stage},
  pipeline::StagesComplete,
  staging::{NewStagingRecord, StagingRecord},
};

/// Abstraction over a staging + normalized-model backend.
///
/// Dimension and link writes are idempotent on their natural keys. Detail
/// writes always append.
pub trait NormalizedStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Staging ───────────────────────────────────────────────────────────

  /// Persist a staging row with a freshly assigned `company_id`. Clears the
  /// stage ledger: every stage must run again before finalization.
  fn stage_record(
    &self,
    input: NewStagingRecord,
  ) -> impl Future<Output = Result<StagingRecord, Self::Error>> + Send + '_;

  /// Every staging row. After finalization, `payloads` is always empty.
  fn list_staging(
    &self,
  ) -> impl Future<Output = Result<Vec<StagingRecord>, Self::Error>> + Send + '_;

  /// Whether the staging payload columns have already been dropped.
  fn is_finalized(&self) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Dimensions & links ────────────────────────────────────────────────

  /// Return the id of the dimension row equal to `value`, minting it first
  /// if none exists. Repeat calls with an equal value return the same id.
  fn resolve(
    &self,
    value: DimensionValue,
  ) -> impl Future<Output = Result<Uuid, Self::Error>> + Send + '_;

  /// Associate a company with a dimension row. Returns `false` when the
  /// association already existed.
  fn link(
    &self,
    company_id: Uuid,
    kind: DimensionKind,
    dimension_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Details ───────────────────────────────────────────────────────────

  /// Append a detail row owned by `company_id` and return its id.
  fn add_detail(
    &self,
    company_id: Uuid,
    detail: DetailValue,
  ) -> impl Future<Output = Result<Uuid, Self::Error>> + Send + '_;

  // ── Stage ledger & finalization ───────────────────────────────────────

  fn mark_stage_complete(
    &self,
    stage: Stage,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn completed_stages(
    &self,
  ) -> impl Future<Output = Result<BTreeSet<Stage>, Self::Error>> + Send + '_;

  /// Drop the migrated and retired payload columns from staging. Returns the
  /// columns actually dropped; a second call drops nothing.
  fn finalize_schema<'a>(
    &'a self,
    barrier: &'a StagesComplete,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + 'a;

  // ── Reads ─────────────────────────────────────────────────────────────

  fn dimensions(
    &self,
    kind: DimensionKind,
  ) -> impl Future<Output = Result<Vec<Dimension>, Self::Error>> + Send + '_;

  fn links(
    &self,
    kind: DimensionKind,
  ) -> impl Future<Output = Result<Vec<Link>, Self::Error>> + Send + '_;

  fn details(
    &self,
    kind: DetailKind,
  ) -> impl Future<Output = Result<Vec<DetailRow>, Self::Error>> + Send + '_;
}
