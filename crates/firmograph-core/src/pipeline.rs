//! The stage pipeline and the schema-finalization barrier.
//!
//! A stage reads one payload column from every staging record, normalizes
//! each sub-record, and either resolves + links it into a dimension or
//! appends it as a detail row. Stages are independent of one another and may
//! run concurrently. Dropping the payload columns is only possible with a
//! [`StagesComplete`] value, which can only be obtained once the store's
//! stage ledger lists every [`Stage`].

use std::{
  collections::{BTreeSet, HashSet},
  sync::Arc,
};

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;

use crate::{
  Error, Result,
  entity::Stage,
  normalize::{Normalized, normalize},
  payload::extract,
  staging::StagingRecord,
  store::NormalizedStore,
};

// ─── Barrier ─────────────────────────────────────────────────────────────────

/// Proof that every stage has completed at least once.
///
/// Required by [`NormalizedStore::finalize_schema`]; there is no way to build
/// one outside [`Pipeline::barrier`].
#[derive(Debug)]
pub struct StagesComplete {
  stages: BTreeSet<Stage>,
}

impl StagesComplete {
  pub(crate) fn check(completed: BTreeSet<Stage>) -> Result<Self> {
    let missing: Vec<Stage> = Stage::all()
      .into_iter()
      .filter(|s| !completed.contains(s))
      .collect();
    if !missing.is_empty() {
      return Err(Error::StagesIncomplete(missing));
    }
    Ok(Self { stages: completed })
  }

  pub fn stages(&self) -> &BTreeSet<Stage> { &self.stages }
}

// ─── Reports ─────────────────────────────────────────────────────────────────

/// Counters for one stage run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
  pub stage:            Stage,
  pub records:          usize,
  pub sub_records:      usize,
  /// Sub-records the normalizer declined (blank, unbucketed, nameless).
  pub dropped:          usize,
  /// Distinct dimension ids resolved by this run.
  pub dimension_values: usize,
  pub links_created:    usize,
  pub details_created:  usize,
}

impl StageReport {
  fn new(stage: Stage) -> Self {
    Self {
      stage,
      records: 0,
      sub_records: 0,
      dropped: 0,
      dimension_values: 0,
      links_created: 0,
      details_created: 0,
    }
  }
}

// ─── Pipeline ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
  /// Run independent stages as concurrent tasks.
  pub concurrent_stages: bool,
}

impl Default for PipelineOptions {
  fn default() -> Self { Self { concurrent_stages: true } }
}

#[derive(Clone)]
pub struct Pipeline<S> {
  store:   S,
  options: PipelineOptions,
}

impl<S> Pipeline<S>
where
  S: NormalizedStore + Clone + 'static,
{
  pub fn new(store: S, options: PipelineOptions) -> Self { Self { store, options } }

  pub fn store(&self) -> &S { &self.store }

  /// Run every stage.
  pub async fn run_all(&self) -> Result<Vec<StageReport>> { self.run(&Stage::all()).await }

  /// Run the given stages over the full staging set. Reports come back in
  /// stage order.
  pub async fn run(&self, stages: &[Stage]) -> Result<Vec<StageReport>> {
    if self.store.is_finalized().await.map_err(Error::store)? {
      return Err(Error::AlreadyFinalized);
    }

    let records: Arc<[StagingRecord]> =
      self.store.list_staging().await.map_err(Error::store)?.into();
    let stages: BTreeSet<Stage> = stages.iter().copied().collect();

    tracing::info!(
      records = records.len(),
      stages = stages.len(),
      concurrent = self.options.concurrent_stages,
      "starting normalization"
    );

    let mut reports = Vec::with_capacity(stages.len());

    if self.options.concurrent_stages {
      let mut tasks = JoinSet::new();
      for stage in stages {
        let store = self.store.clone();
        let records = Arc::clone(&records);
        tasks.spawn(async move { run_stage(&store, stage, &records).await });
      }
      while let Some(joined) = tasks.join_next().await {
        reports.push(joined.map_err(|e| Error::StageTask(e.to_string()))??);
      }
      reports.sort_by_key(|r| r.stage);
    } else {
      for stage in stages {
        reports.push(run_stage(&self.store, stage, &records).await?);
      }
    }

    Ok(reports)
  }

  /// Obtain the finalization barrier from the store's stage ledger.
  pub async fn barrier(&self) -> Result<StagesComplete> {
    let completed = self.store.completed_stages().await.map_err(Error::store)?;
    StagesComplete::check(completed)
  }

  /// Drop the staging payload columns. One-way.
  pub async fn finalize(&self, barrier: &StagesComplete) -> Result<Vec<String>> {
    let dropped = self
      .store
      .finalize_schema(barrier)
      .await
      .map_err(Error::store)?;
    if dropped.is_empty() {
      tracing::info!("staging schema already finalized; nothing to drop");
    } else {
      tracing::info!(columns = ?dropped, "dropped staging payload columns");
    }
    Ok(dropped)
  }
}

async fn run_stage<S: NormalizedStore>(
  store:   &S,
  stage:   Stage,
  records: &[StagingRecord],
) -> Result<StageReport> {
  tracing::debug!(%stage, target = ?stage.target(), "stage started");

  let mut report = StageReport::new(stage);
  let mut touched = HashSet::new();

  for record in records {
    report.records += 1;
    for sub in extract(record, stage) {
      report.sub_records += 1;
      match normalize(stage, &sub) {
        None => report.dropped += 1,
        Some(Normalized::Dimension(value)) => {
          let kind = value.kind();
          let dimension_id = store.resolve(value).await.map_err(Error::store)?;
          touched.insert(dimension_id);
          if store
            .link(record.company_id, kind, dimension_id)
            .await
            .map_err(Error::store)?
          {
            report.links_created += 1;
          }
        }
        Some(Normalized::Detail(detail)) => {
          store
            .add_detail(record.company_id, detail)
            .await
            .map_err(Error::store)?;
          report.details_created += 1;
        }
      }
    }
  }
  report.dimension_values = touched.len();

  store.mark_stage_complete(stage).await.map_err(Error::store)?;

  tracing::info!(
    %stage,
    records = report.records,
    sub_records = report.sub_records,
    dropped = report.dropped,
    dimension_values = report.dimension_values,
    links_created = report.links_created,
    details_created = report.details_created,
    "stage complete"
  );

  Ok(report)
}
