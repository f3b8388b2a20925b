//! [`SqliteStore`], the SQLite implementation of [`NormalizedStore`].

use std::{
  collections::{BTreeMap, BTreeSet, HashSet},
  path::Path,
};

use chrono::Utc;
use firmograph_core::{
  entity::{
    DetailKind, DetailRow, DetailValue, Dimension, DimensionKind, DimensionValue, Link, Stage,
  },
  pipeline::StagesComplete,
  staging::{NewStagingRecord, PayloadField, StagingRecord},
  store::NormalizedStore,
};
use rusqlite::{OptionalExtension as _, params_from_iter, types::Value as SqlValue};
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    DimensionTable, PROFILE_COLUMNS, RawDetail, RawDimension, RawStaging, decode_stage,
    decode_uuid, detail_params, detail_table, dimension_params, dimension_table, encode_dt,
    encode_stage, encode_uuid, profile_params,
  },
  schema::SCHEMA,
};

/// Insert attempts per resolve before giving up on a contended value.
const RESOLVE_ATTEMPTS: usize = 3;

// ─── Store ───────────────────────────────────────────────────────────────────

/// Staging table plus normalized model in a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, mostly for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Row counts for the base table and every derived table.
  pub async fn table_counts(&self) -> Result<BTreeMap<String, i64>> {
    let mut tables = vec!["company"];
    for kind in DimensionKind::all() {
      let t = dimension_table(kind);
      tables.push(t.table);
      tables.push(t.link_table);
    }
    for kind in DetailKind::all() {
      tables.push(detail_table(kind).table);
    }
    tables.push("stage_run");

    let counts = self
      .conn
      .call(move |conn| {
        let mut counts = BTreeMap::new();
        for table in tables {
          let n: i64 =
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))?;
          counts.insert(table.to_owned(), n);
        }
        Ok(counts)
      })
      .await?;
    Ok(counts)
  }
}

// ─── SQL helpers ─────────────────────────────────────────────────────────────

/// `?1, ?2, …, ?n`
fn placeholders(n: usize) -> String {
  (1..=n).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ")
}

/// Column names currently present on `company`.
fn staging_columns(conn: &rusqlite::Connection) -> rusqlite::Result<HashSet<String>> {
  let mut stmt = conn.prepare("SELECT name FROM pragma_table_info('company')")?;
  let columns = stmt
    .query_map([], |r| r.get::<_, String>(0))?
    .collect::<rusqlite::Result<HashSet<_>>>()?;
  Ok(columns)
}

fn present_payloads(columns: &HashSet<String>) -> Vec<PayloadField> {
  PayloadField::all()
    .into_iter()
    .filter(|f| columns.contains(f.column()))
    .collect()
}

/// Lookup and insert statements for one dimension table. The lookup compares
/// with `IS` so that absent (NULL) attributes match each other.
pub(crate) fn resolve_sql(table: &DimensionTable) -> (String, String) {
  let conditions = table
    .columns
    .iter()
    .enumerate()
    .map(|(i, c)| format!("{c} IS ?{}", i + 1))
    .collect::<Vec<_>>()
    .join(" AND ");
  let select_sql = format!(
    "SELECT {} FROM {} WHERE {conditions}",
    table.id_column, table.table
  );
  let insert_sql = format!(
    "INSERT INTO {} ({}, {}) VALUES ({})",
    table.table,
    table.id_column,
    table.columns.join(", "),
    placeholders(table.columns.len() + 1)
  );
  (select_sql, insert_sql)
}

fn fetch_dimension(
  conn:       &rusqlite::Connection,
  select_sql: &str,
  params:     &[SqlValue],
) -> rusqlite::Result<Option<String>> {
  conn
    .query_row(select_sql, params_from_iter(params.iter()), |r| r.get(0))
    .optional()
}

/// Mint the natural key under a fresh id. When another writer committed the
/// same key since our lookup, the unique constraint rejects the insert and
/// the winner's id is returned instead.
pub(crate) fn insert_or_fetch(
  conn:       &rusqlite::Connection,
  select_sql: &str,
  insert_sql: &str,
  params:     &[SqlValue],
) -> rusqlite::Result<Option<String>> {
  let id = encode_uuid(Uuid::new_v4());
  let insert_params =
    std::iter::once(SqlValue::Text(id.clone())).chain(params.iter().cloned());
  match conn.execute(insert_sql, params_from_iter(insert_params)) {
    Ok(_) => Ok(Some(id)),
    Err(e) if is_unique_violation(&e) => fetch_dimension(conn, select_sql, params),
    Err(e) => Err(e),
  }
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
  matches!(
    e,
    rusqlite::Error::SqliteFailure(f, _)
      if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        || f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
  )
}

// ─── NormalizedStore impl ────────────────────────────────────────────────────

impl NormalizedStore for SqliteStore {
  type Error = Error;

  // ── Staging ───────────────────────────────────────────────────────────────

  async fn stage_record(&self, input: NewStagingRecord) -> Result<StagingRecord> {
    if self.is_finalized().await? {
      return Err(Error::Core(firmograph_core::Error::AlreadyFinalized));
    }

    let record = StagingRecord {
      company_id: Uuid::new_v4(),
      staged_at:  Utc::now(),
      profile:    input.profile,
      payloads:   input.payloads,
    };

    let fields = PayloadField::all();
    let mut columns = vec!["company_id", "staged_at"];
    columns.extend(PROFILE_COLUMNS);
    columns.extend(fields.iter().map(|f| f.column()));

    let mut params = vec![
      SqlValue::Text(encode_uuid(record.company_id)),
      SqlValue::Text(encode_dt(record.staged_at)),
    ];
    params.extend(profile_params(&record.profile));
    params.extend(fields.iter().map(|f| {
      record
        .payload(*f)
        .map_or(SqlValue::Null, |raw| SqlValue::Text(raw.to_owned()))
    }));

    let sql = format!(
      "INSERT INTO company ({}) VALUES ({})",
      columns.join(", "),
      placeholders(columns.len())
    );

    // A new record has not been through any stage, so the ledger no longer
    // proves completeness.
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(&sql, params_from_iter(params))?;
        tx.execute("DELETE FROM stage_run", [])?;
        tx.commit()?;
        Ok(())
      })
      .await?;

    Ok(record)
  }

  async fn list_staging(&self) -> Result<Vec<StagingRecord>> {
    let raws: Vec<RawStaging> = self
      .conn
      .call(|conn| {
        let fields = present_payloads(&staging_columns(conn)?);

        let mut columns = vec!["company_id", "staged_at"];
        columns.extend(PROFILE_COLUMNS);
        columns.extend(fields.iter().map(|f| f.column()));

        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM company ORDER BY staged_at, company_id",
          columns.join(", ")
        ))?;

        let profile_start = 2;
        let payload_start = profile_start + PROFILE_COLUMNS.len();

        let rows = stmt
          .query_map([], |row| {
            let profile = (profile_start..payload_start)
              .map(|i| row.get::<_, SqlValue>(i))
              .collect::<rusqlite::Result<Vec<_>>>()?;
            let payloads = fields
              .iter()
              .enumerate()
              .map(|(i, f)| -> rusqlite::Result<_> {
                Ok((*f, row.get::<_, SqlValue>(payload_start + i)?))
              })
              .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(RawStaging {
              company_id: row.get(0)?,
              staged_at: row.get(1)?,
              profile,
              payloads,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
      })
      .await?;

    // One undecodable row must not sink the batch.
    let records = raws
      .into_iter()
      .filter_map(|raw| match raw.into_record() {
        Ok(record) => Some(record),
        Err(e) => {
          tracing::warn!(error = %e, "skipping undecodable staging row");
          None
        }
      })
      .collect();
    Ok(records)
  }

  async fn is_finalized(&self) -> Result<bool> {
    let columns = self
      .conn
      .call(|conn| Ok(staging_columns(conn)?))
      .await?;
    Ok(present_payloads(&columns).is_empty())
  }

  // ── Dimensions & links ────────────────────────────────────────────────────

  async fn resolve(&self, value: DimensionValue) -> Result<Uuid> {
    let kind = value.kind();
    let (select_sql, insert_sql) = resolve_sql(dimension_table(kind));
    let params = dimension_params(&value);

    let resolved: Option<String> = self
      .conn
      .call(move |conn| {
        for _ in 0..RESOLVE_ATTEMPTS {
          if let Some(id) = fetch_dimension(conn, &select_sql, &params)? {
            return Ok(Some(id));
          }
          if let Some(id) = insert_or_fetch(conn, &select_sql, &insert_sql, &params)? {
            return Ok(Some(id));
          }
        }
        Ok(None)
      })
      .await?;

    let id = resolved.ok_or(Error::ResolveConflict(kind))?;
    decode_uuid(&id)
  }

  async fn link(
    &self,
    company_id:   Uuid,
    kind:         DimensionKind,
    dimension_id: Uuid,
  ) -> Result<bool> {
    let table = dimension_table(kind);
    let sql = format!(
      "INSERT INTO {link} (company_id, {id}) VALUES (?1, ?2)
       ON CONFLICT (company_id, {id}) DO NOTHING",
      link = table.link_table,
      id = table.id_column,
    );
    let company_id_str = encode_uuid(company_id);
    let dimension_id_str = encode_uuid(dimension_id);

    let inserted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(&sql, rusqlite::params![company_id_str, dimension_id_str])?)
      })
      .await?;

    Ok(inserted == 1)
  }

  // ── Details ───────────────────────────────────────────────────────────────

  async fn add_detail(&self, company_id: Uuid, detail: DetailValue) -> Result<Uuid> {
    let table = detail_table(detail.kind());
    let detail_id = Uuid::new_v4();

    let sql = format!(
      "INSERT INTO {} ({}, company_id, {}) VALUES ({})",
      table.table,
      table.id_column,
      table.columns.join(", "),
      placeholders(table.columns.len() + 2)
    );
    let mut params = vec![
      SqlValue::Text(encode_uuid(detail_id)),
      SqlValue::Text(encode_uuid(company_id)),
    ];
    params.extend(detail_params(&detail));

    self
      .conn
      .call(move |conn| {
        conn.execute(&sql, params_from_iter(params))?;
        Ok(())
      })
      .await?;

    Ok(detail_id)
  }

  // ── Stage ledger & finalization ───────────────────────────────────────────

  async fn mark_stage_complete(&self, stage: Stage) -> Result<()> {
    let stage_str = encode_stage(stage);
    let at_str = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO stage_run (stage, completed_at) VALUES (?1, ?2)
           ON CONFLICT (stage) DO UPDATE SET completed_at = excluded.completed_at",
          rusqlite::params![stage_str, at_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn completed_stages(&self) -> Result<BTreeSet<Stage>> {
    let names: Vec<String> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare("SELECT stage FROM stage_run")?;
        let rows = stmt
          .query_map([], |r| r.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    names.iter().map(|n| decode_stage(n)).collect()
  }

  async fn finalize_schema(&self, _barrier: &StagesComplete) -> Result<Vec<String>> {
    let dropped = self
      .conn
      .call(|conn| {
        let fields = present_payloads(&staging_columns(conn)?);
        let tx = conn.transaction()?;
        let mut dropped = Vec::with_capacity(fields.len());
        for field in fields {
          tx.execute_batch(&format!("ALTER TABLE company DROP COLUMN {}", field.column()))?;
          dropped.push(field.column().to_owned());
        }
        tx.commit()?;
        Ok(dropped)
      })
      .await?;
    Ok(dropped)
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn dimensions(&self, kind: DimensionKind) -> Result<Vec<Dimension>> {
    let table = dimension_table(kind);
    let width = table.columns.len();
    let sql = format!(
      "SELECT {}, {} FROM {} ORDER BY rowid",
      table.id_column,
      table.columns.join(", "),
      table.table
    );

    let raws: Vec<RawDimension> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawDimension {
              dimension_id: row.get(0)?,
              values:       (1..=width)
                .map(|i| row.get::<_, SqlValue>(i))
                .collect::<rusqlite::Result<Vec<_>>>()?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(|r| r.into_dimension(kind)).collect()
  }

  async fn links(&self, kind: DimensionKind) -> Result<Vec<Link>> {
    let table = dimension_table(kind);
    let sql = format!(
      "SELECT company_id, {} FROM {} ORDER BY rowid",
      table.id_column, table.link_table
    );

    let raws: Vec<(String, String)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(|(company, dimension)| {
        Ok(Link {
          company_id:   decode_uuid(&company)?,
          dimension_id: decode_uuid(&dimension)?,
        })
      })
      .collect()
  }

  async fn details(&self, kind: DetailKind) -> Result<Vec<DetailRow>> {
    let table = detail_table(kind);
    let width = table.columns.len();
    let sql = format!(
      "SELECT {}, company_id, {} FROM {} ORDER BY rowid",
      table.id_column,
      table.columns.join(", "),
      table.table
    );

    let raws: Vec<RawDetail> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawDetail {
              detail_id:  row.get(0)?,
              company_id: row.get(1)?,
              values:     (2..2 + width)
                .map(|i| row.get::<_, SqlValue>(i))
                .collect::<rusqlite::Result<Vec<_>>>()?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(|r| r.into_detail_row(kind)).collect()
  }
}
