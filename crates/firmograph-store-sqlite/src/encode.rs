//! Encoding and decoding helpers between Rust domain types and the plain
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings, calendar dates are `YYYY-MM-DD`, UUIDs
//! are hyphenated lowercase strings. Dimension and detail tables are
//! described by static descriptors so that one generic routine serves every
//! entity kind.

use std::{collections::BTreeMap, str::FromStr as _};

use chrono::{DateTime, NaiveDate, Utc};
use firmograph_core::{
  entity::{
    AffiliatedCompany, CompanyUpdate, DetailKind, DetailRow, DetailValue, Dimension,
    DimensionKind, DimensionValue, Location, SimilarCompany, SizeRange, Stage,
  },
  staging::{CompanyProfile, PayloadField, StagingRecord},
};
use rusqlite::types::Value as SqlValue;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── NaiveDate ────────────────────────────────────────────────────────────────

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Stage ────────────────────────────────────────────────────────────────────

pub fn encode_stage(stage: Stage) -> &'static str { stage.into() }

pub fn decode_stage(s: &str) -> Result<Stage> {
  Stage::from_str(s).map_err(|_| Error::Core(firmograph_core::Error::UnknownStage(s.to_owned())))
}

// ─── Table descriptors ────────────────────────────────────────────────────────

/// Layout of one dimension table and its link table.
pub struct DimensionTable {
  pub table:      &'static str,
  pub id_column:  &'static str,
  /// Natural-key columns, in [`dimension_params`] order.
  pub columns:    &'static [&'static str],
  pub link_table: &'static str,
}

pub fn dimension_table(kind: DimensionKind) -> &'static DimensionTable {
  match kind {
    DimensionKind::Specialty => &DimensionTable {
      table:      "specialty",
      id_column:  "specialty_id",
      columns:    &["specialty_name"],
      link_table: "specialty_link",
    },
    DimensionKind::CompanyType => &DimensionTable {
      table:      "company_type",
      id_column:  "company_type_id",
      columns:    &["company_type_name"],
      link_table: "company_type_link",
    },
    DimensionKind::Industry => &DimensionTable {
      table:      "industry",
      id_column:  "industry_id",
      columns:    &["industry_name"],
      link_table: "industry_link",
    },
    DimensionKind::SizeRange => &DimensionTable {
      table:      "size_range",
      id_column:  "size_range_id",
      columns:    &["label"],
      link_table: "size_range_link",
    },
    DimensionKind::Location => &DimensionTable {
      table:      "location",
      id_column:  "location_id",
      columns:    &["country", "city", "postal_code", "address_line1", "state", "is_hq"],
      link_table: "location_link",
    },
    DimensionKind::SimilarCompany => &DimensionTable {
      table:      "similar_company",
      id_column:  "similar_company_id",
      columns:    &["name", "linkedin_url", "industry", "location"],
      link_table: "similar_company_link",
    },
  }
}

/// Layout of one detail table.
pub struct DetailTable {
  pub table:     &'static str,
  pub id_column: &'static str,
  /// Value columns, in [`detail_params`] order.
  pub columns:   &'static [&'static str],
}

pub fn detail_table(kind: DetailKind) -> &'static DetailTable {
  match kind {
    DetailKind::Update => &DetailTable {
      table:     "company_update",
      id_column: "update_id",
      columns:   &["article_link", "image", "posted_on", "update_text", "total_likes"],
    },
    DetailKind::AffiliatedCompany => &DetailTable {
      table:     "affiliated_company",
      id_column: "affiliated_company_id",
      columns:   &["name", "linkedin_url", "industry", "location"],
    },
  }
}

// ─── Column values ────────────────────────────────────────────────────────────

fn text(s: &str) -> SqlValue { SqlValue::Text(s.to_owned()) }

fn opt_text(s: Option<&str>) -> SqlValue { s.map_or(SqlValue::Null, text) }

fn opt_int(i: Option<i64>) -> SqlValue { i.map_or(SqlValue::Null, SqlValue::Integer) }

/// Natural-key column values for a dimension, matching
/// [`DimensionTable::columns`].
pub fn dimension_params(value: &DimensionValue) -> Vec<SqlValue> {
  match value {
    DimensionValue::Specialty(s)
    | DimensionValue::CompanyType(s)
    | DimensionValue::Industry(s) => vec![text(s)],
    DimensionValue::SizeRange(r) => vec![text(r.label())],
    DimensionValue::Location(l) => vec![
      text(&l.country),
      opt_text(l.city.as_deref()),
      opt_text(l.postal_code.as_deref()),
      opt_text(l.address_line1.as_deref()),
      opt_text(l.state.as_deref()),
      SqlValue::Integer(i64::from(l.is_hq)),
    ],
    DimensionValue::SimilarCompany(c) => vec![
      text(&c.name),
      text(&c.linkedin_url),
      text(&c.industry),
      text(&c.location),
    ],
  }
}

/// Column values for a detail, matching [`DetailTable::columns`].
pub fn detail_params(value: &DetailValue) -> Vec<SqlValue> {
  match value {
    DetailValue::Update(u) => vec![
      text(&u.article_link),
      text(&u.image),
      SqlValue::Text(encode_date(u.posted_on)),
      text(&u.update_text),
      SqlValue::Integer(u.total_likes),
    ],
    DetailValue::AffiliatedCompany(a) => vec![
      text(&a.name),
      text(&a.linkedin_url),
      text(&a.industry),
      text(&a.location),
    ],
  }
}

/// Positional reader over the generic column values of one row.
struct Columns(std::vec::IntoIter<SqlValue>);

impl Columns {
  fn next(&mut self) -> Result<SqlValue> {
    self.0.next().ok_or_else(|| Error::Decode("row has too few columns".into()))
  }

  fn opt_text(&mut self) -> Result<Option<String>> {
    match self.next()? {
      SqlValue::Null => Ok(None),
      SqlValue::Text(s) => Ok(Some(s)),
      other => Err(Error::Decode(format!("expected TEXT, found {other:?}"))),
    }
  }

  fn text(&mut self) -> Result<String> {
    self.opt_text()?.ok_or_else(|| Error::Decode("unexpected NULL".into()))
  }

  fn opt_int(&mut self) -> Result<Option<i64>> {
    match self.next()? {
      SqlValue::Null => Ok(None),
      SqlValue::Integer(i) => Ok(Some(i)),
      other => Err(Error::Decode(format!("expected INTEGER, found {other:?}"))),
    }
  }

  fn int(&mut self) -> Result<i64> {
    self.opt_int()?.ok_or_else(|| Error::Decode("unexpected NULL".into()))
  }
}

// ─── Row types ────────────────────────────────────────────────────────────────

/// Raw values read from a dimension table: id, then natural-key columns.
pub struct RawDimension {
  pub dimension_id: String,
  pub values:       Vec<SqlValue>,
}

impl RawDimension {
  pub fn into_dimension(self, kind: DimensionKind) -> Result<Dimension> {
    let mut cols = Columns(self.values.into_iter());
    let value = match kind {
      DimensionKind::Specialty => DimensionValue::Specialty(cols.text()?),
      DimensionKind::CompanyType => DimensionValue::CompanyType(cols.text()?),
      DimensionKind::Industry => DimensionValue::Industry(cols.text()?),
      DimensionKind::SizeRange => {
        let label = cols.text()?;
        let range = SizeRange::from_str(&label)
          .map_err(|_| Error::Core(firmograph_core::Error::UnknownSizeLabel(label)))?;
        DimensionValue::SizeRange(range)
      }
      DimensionKind::Location => DimensionValue::Location(Location {
        country:       cols.text()?,
        city:          cols.opt_text()?,
        postal_code:   cols.opt_text()?,
        address_line1: cols.opt_text()?,
        state:         cols.opt_text()?,
        is_hq:         cols.int()? != 0,
      }),
      DimensionKind::SimilarCompany => DimensionValue::SimilarCompany(SimilarCompany {
        name:         cols.text()?,
        linkedin_url: cols.text()?,
        industry:     cols.text()?,
        location:     cols.text()?,
      }),
    };

    Ok(Dimension { dimension_id: decode_uuid(&self.dimension_id)?, value })
  }
}

/// Raw values read from a detail table: id, owner, then value columns.
pub struct RawDetail {
  pub detail_id:  String,
  pub company_id: String,
  pub values:     Vec<SqlValue>,
}

impl RawDetail {
  pub fn into_detail_row(self, kind: DetailKind) -> Result<DetailRow> {
    let mut cols = Columns(self.values.into_iter());
    let value = match kind {
      DetailKind::Update => DetailValue::Update(CompanyUpdate {
        article_link: cols.text()?,
        image:        cols.text()?,
        posted_on:    decode_date(&cols.text()?)?,
        update_text:  cols.text()?,
        total_likes:  cols.int()?,
      }),
      DetailKind::AffiliatedCompany => DetailValue::AffiliatedCompany(AffiliatedCompany {
        name:         cols.text()?,
        linkedin_url: cols.text()?,
        industry:     cols.text()?,
        location:     cols.text()?,
      }),
    };

    Ok(DetailRow {
      detail_id: decode_uuid(&self.detail_id)?,
      company_id: decode_uuid(&self.company_id)?,
      value,
    })
  }
}

// ─── Staging ──────────────────────────────────────────────────────────────────

/// Scalar columns of `company`, in [`profile_params`] order.
pub const PROFILE_COLUMNS: &[&str] = &[
  "name",
  "description",
  "website",
  "tagline",
  "founded_year",
  "follower_count",
  "linkedin_internal_id",
  "profile_pic_url",
];

pub fn profile_params(p: &CompanyProfile) -> Vec<SqlValue> {
  vec![
    opt_text(p.name.as_deref()),
    opt_text(p.description.as_deref()),
    opt_text(p.website.as_deref()),
    opt_text(p.tagline.as_deref()),
    opt_int(p.founded_year.map(i64::from)),
    opt_int(p.follower_count),
    opt_text(p.linkedin_internal_id.as_deref()),
    opt_text(p.profile_pic_url.as_deref()),
  ]
}

/// Untyped values read directly from a `company` row. Rows may come from an
/// external loader, so nothing here is trusted to match the declared types.
pub struct RawStaging {
  pub company_id: SqlValue,
  pub staged_at:  SqlValue,
  /// [`PROFILE_COLUMNS`] values.
  pub profile:    Vec<SqlValue>,
  /// Only the payload columns still present in the table.
  pub payloads:   Vec<(PayloadField, SqlValue)>,
}

impl RawStaging {
  /// Decode the row. A bad identity (`company_id`, `staged_at`) fails the
  /// row; a bad profile or payload column is logged and read as absent.
  pub fn into_record(self) -> Result<StagingRecord> {
    let company_id = match self.company_id {
      SqlValue::Text(s) => decode_uuid(&s)?,
      other => return Err(Error::Decode(format!("company_id: found {other:?}"))),
    };
    let staged_at = match self.staged_at {
      SqlValue::Text(s) => decode_dt(&s)?,
      other => return Err(Error::Decode(format!("staged_at: found {other:?}"))),
    };

    let mut cols = Columns(self.profile.into_iter());
    let id = &company_id;
    let profile = CompanyProfile {
      name:                 lenient_text(id, "name", cols.next()),
      description:          lenient_text(id, "description", cols.next()),
      website:              lenient_text(id, "website", cols.next()),
      tagline:              lenient_text(id, "tagline", cols.next()),
      founded_year:         lenient_int(id, "founded_year", cols.next())
        .and_then(|y| i32::try_from(y).ok()),
      follower_count:       lenient_int(id, "follower_count", cols.next()),
      linkedin_internal_id: lenient_text(id, "linkedin_internal_id", cols.next()),
      profile_pic_url:      lenient_text(id, "profile_pic_url", cols.next()),
    };

    let payloads: BTreeMap<PayloadField, String> = self
      .payloads
      .into_iter()
      .filter_map(|(field, raw)| {
        let raw = match raw {
          SqlValue::Null => return None,
          SqlValue::Text(s) => s,
          SqlValue::Integer(i) => i.to_string(),
          SqlValue::Real(f) => f.to_string(),
          SqlValue::Blob(bytes) => match String::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => {
              tracing::warn!(%company_id, %field, error = %e, "ignoring binary payload");
              return None;
            }
          },
        };
        Some((field, raw))
      })
      .collect();

    Ok(StagingRecord { company_id, staged_at, profile, payloads })
  }
}

fn lenient_text(company_id: &Uuid, column: &str, v: Result<SqlValue>) -> Option<String> {
  let decoded = match v {
    Ok(SqlValue::Null) => return None,
    Ok(SqlValue::Text(s)) => return Some(s),
    Ok(SqlValue::Integer(i)) => return Some(i.to_string()),
    Ok(other) => format!("expected TEXT, found {other:?}"),
    Err(e) => e.to_string(),
  };
  tracing::warn!(%company_id, column, error = %decoded, "ignoring undecodable column");
  None
}

/// Integer columns also accept integer-looking text.
fn lenient_int(company_id: &Uuid, column: &str, v: Result<SqlValue>) -> Option<i64> {
  let decoded = match v {
    Ok(SqlValue::Null) => return None,
    Ok(SqlValue::Integer(i)) => return Some(i),
    Ok(SqlValue::Text(s)) => match s.trim().parse::<i64>() {
      Ok(i) => return Some(i),
      Err(_) => format!("expected INTEGER, found text {s:?}"),
    },
    Ok(other) => format!("expected INTEGER, found {other:?}"),
    Err(e) => e.to_string(),
  };
  tracing::warn!(%company_id, column, error = %decoded, "ignoring undecodable column");
  None
}
