//! Staging records: one flat row per source company profile.
//!
//! A staging record owns a handful of scalar attributes plus the raw text of
//! every semi-structured payload column. Payloads stay undecoded here; the
//! [`payload`](crate::payload) module turns them into sub-records on demand.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator as _, IntoStaticStr};
use uuid::Uuid;

use crate::{
  Error, Result,
  entity::Stage,
  normalize::{integer, text},
};

// ─── Payload columns ─────────────────────────────────────────────────────────

/// A semi-structured column of the staging table.
///
/// The string form is both the staging column name and the key in a source
/// profile document.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumIter,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PayloadField {
  Specialities,
  Locations,
  CompanySize,
  CompanyType,
  Industry,
  Updates,
  AffiliatedCompanies,
  SimilarCompanies,
  // Retired: carried through staging, never migrated, dropped on finalize.
  Hq,
  ExitData,
  Acquisitions,
  Extra,
  FundingData,
  Categories,
  CustomerList,
}

impl PayloadField {
  pub fn column(self) -> &'static str { self.into() }

  /// The stage that migrates this column, or `None` for retired columns.
  pub fn stage(self) -> Option<Stage> {
    Stage::iter().find(|s| s.field() == self)
  }

  pub fn is_retired(self) -> bool { self.stage().is_none() }

  pub fn all() -> Vec<PayloadField> { PayloadField::iter().collect() }
}

// ─── Records ─────────────────────────────────────────────────────────────────

/// Scalar attributes owned directly by the company row. These survive
/// schema finalization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyProfile {
  pub name:                 Option<String>,
  pub description:          Option<String>,
  pub website:              Option<String>,
  pub tagline:              Option<String>,
  pub founded_year:         Option<i32>,
  pub follower_count:       Option<i64>,
  pub linkedin_internal_id: Option<String>,
  pub profile_pic_url:      Option<String>,
}

/// A persisted staging row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingRecord {
  pub company_id: Uuid,
  pub staged_at:  DateTime<Utc>,
  pub profile:    CompanyProfile,
  /// Raw payload text keyed by column; absent columns are NULL in storage.
  pub payloads:   BTreeMap<PayloadField, String>,
}

impl StagingRecord {
  pub fn payload(&self, field: PayloadField) -> Option<&str> {
    self.payloads.get(&field).map(String::as_str)
  }
}

/// Input for [`NormalizedStore::stage_record`](crate::store::NormalizedStore::stage_record).
/// The store assigns `company_id` and `staged_at`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStagingRecord {
  pub profile:  CompanyProfile,
  pub payloads: BTreeMap<PayloadField, String>,
}

impl NewStagingRecord {
  /// Map one company-profile document onto the staging shape.
  ///
  /// Single-valued text payloads (industry, company type) are stored as
  /// plain text; every other payload is stored as compact JSON. `null`
  /// members are left out.
  pub fn from_profile(doc: Value) -> Result<Self> {
    let Value::Object(mut map) = doc else {
      return Err(Error::ProfileNotObject);
    };

    let scalar = |map: &serde_json::Map<String, Value>, key: &str| {
      map.get(key).and_then(text)
    };

    let profile = CompanyProfile {
      name:                 scalar(&map, "name"),
      description:          scalar(&map, "description"),
      website:              scalar(&map, "website"),
      tagline:              scalar(&map, "tagline"),
      founded_year:         map
        .get("founded_year")
        .and_then(integer)
        .and_then(|y| i32::try_from(y).ok()),
      follower_count:       map.get("follower_count").and_then(integer),
      linkedin_internal_id: scalar(&map, "linkedin_internal_id"),
      profile_pic_url:      scalar(&map, "profile_pic_url"),
    };

    let mut payloads = BTreeMap::new();
    for field in PayloadField::iter() {
      let raw = match map.remove(field.column()) {
        None | Some(Value::Null) => continue,
        Some(Value::String(s)) if is_plain_text(field) => s,
        Some(other) => serde_json::to_string(&other)?,
      };
      payloads.insert(field, raw);
    }

    Ok(Self { profile, payloads })
  }

  pub fn with_payload(mut self, field: PayloadField, raw: impl Into<String>) -> Self {
    self.payloads.insert(field, raw.into());
    self
  }
}

fn is_plain_text(field: PayloadField) -> bool {
  field
    .stage()
    .is_some_and(|s| s.shape() == crate::payload::Shape::Scalar)
}
