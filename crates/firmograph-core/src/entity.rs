//! Entity kinds, stages, and the normalized values that flow into the
//! dimension, link and detail tables.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator as _, IntoStaticStr};
use uuid::Uuid;

use crate::{payload::Shape, staging::PayloadField};

// ─── Stages ──────────────────────────────────────────────────────────────────

/// One semi-structured field category, processed as a unit.
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
pub enum Stage {
  Specialty,
  CompanyType,
  Industry,
  SizeRange,
  Location,
  SimilarCompany,
  Update,
  AffiliatedCompany,
}

/// Where a stage writes its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageTarget {
  Dimension(DimensionKind),
  Detail(DetailKind),
}

impl Stage {
  pub fn all() -> Vec<Stage> { Stage::iter().collect() }

  /// The staging column this stage reads.
  pub fn field(self) -> PayloadField {
    match self {
      Self::Specialty => PayloadField::Specialities,
      Self::CompanyType => PayloadField::CompanyType,
      Self::Industry => PayloadField::Industry,
      Self::SizeRange => PayloadField::CompanySize,
      Self::Location => PayloadField::Locations,
      Self::SimilarCompany => PayloadField::SimilarCompanies,
      Self::Update => PayloadField::Updates,
      Self::AffiliatedCompany => PayloadField::AffiliatedCompanies,
    }
  }

  /// The payload shape the staging column is expected to hold.
  pub fn shape(self) -> Shape {
    match self {
      Self::CompanyType | Self::Industry => Shape::Scalar,
      Self::Specialty => Shape::ScalarList,
      Self::SizeRange => Shape::NumericPair,
      Self::Location
      | Self::SimilarCompany
      | Self::Update
      | Self::AffiliatedCompany => Shape::ObjectList,
    }
  }

  pub fn target(self) -> StageTarget {
    match self {
      Self::Specialty => StageTarget::Dimension(DimensionKind::Specialty),
      Self::CompanyType => StageTarget::Dimension(DimensionKind::CompanyType),
      Self::Industry => StageTarget::Dimension(DimensionKind::Industry),
      Self::SizeRange => StageTarget::Dimension(DimensionKind::SizeRange),
      Self::Location => StageTarget::Dimension(DimensionKind::Location),
      Self::SimilarCompany => {
        StageTarget::Dimension(DimensionKind::SimilarCompany)
      }
      Self::Update => StageTarget::Detail(DetailKind::Update),
      Self::AffiliatedCompany => StageTarget::Detail(DetailKind::AffiliatedCompany),
    }
  }
}

// ─── Kinds ───────────────────────────────────────────────────────────────────

/// A deduplicated entity type with its own dimension and link table.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DimensionKind {
  Specialty,
  CompanyType,
  Industry,
  SizeRange,
  Location,
  SimilarCompany,
}

impl DimensionKind {
  pub fn all() -> Vec<DimensionKind> { DimensionKind::iter().collect() }
}

/// A per-record occurrence table; never deduplicated.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DetailKind {
  Update,
  AffiliatedCompany,
}

impl DetailKind {
  pub fn all() -> Vec<DetailKind> { DetailKind::iter().collect() }
}

// ─── Size buckets ────────────────────────────────────────────────────────────

/// Canonical employee-count bucket.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumIter,
  EnumString,
  IntoStaticStr,
)]
pub enum SizeRange {
  #[serde(rename = "0-1")]
  #[strum(serialize = "0-1")]
  From0To1,
  #[serde(rename = "2-10")]
  #[strum(serialize = "2-10")]
  From2To10,
  #[serde(rename = "11-50")]
  #[strum(serialize = "11-50")]
  From11To50,
  #[serde(rename = "51-200")]
  #[strum(serialize = "51-200")]
  From51To200,
  #[serde(rename = "201-500")]
  #[strum(serialize = "201-500")]
  From201To500,
  #[serde(rename = "501-1000")]
  #[strum(serialize = "501-1000")]
  From501To1000,
  #[serde(rename = "1001-5000")]
  #[strum(serialize = "1001-5000")]
  From1001To5000,
  #[serde(rename = "5001-10000")]
  #[strum(serialize = "5001-10000")]
  From5001To10000,
  #[serde(rename = "10001+")]
  #[strum(serialize = "10001+")]
  From10001,
}

impl SizeRange {
  /// The exact `(low, high)` pair that maps onto this bucket.
  pub fn bounds(self) -> (i64, Option<i64>) {
    match self {
      Self::From0To1 => (0, Some(1)),
      Self::From2To10 => (2, Some(10)),
      Self::From11To50 => (11, Some(50)),
      Self::From51To200 => (51, Some(200)),
      Self::From201To500 => (201, Some(500)),
      Self::From501To1000 => (501, Some(1000)),
      Self::From1001To5000 => (1001, Some(5000)),
      Self::From5001To10000 => (5001, Some(10000)),
      Self::From10001 => (10001, None),
    }
  }

  pub fn label(self) -> &'static str { self.into() }
}

// ─── Dimension values ────────────────────────────────────────────────────────

/// An office location. The whole struct is the natural key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
  pub country:       String,
  pub city:          Option<String>,
  pub postal_code:   Option<String>,
  pub address_line1: Option<String>,
  pub state:         Option<String>,
  pub is_hq:         bool,
}

/// A company listed as "similar"; shared across every profile that lists it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SimilarCompany {
  pub name:         String,
  pub linkedin_url: String,
  pub industry:     String,
  pub location:     String,
}

/// A normalized value destined for a dimension table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DimensionValue {
  Specialty(String),
  CompanyType(String),
  Industry(String),
  SizeRange(SizeRange),
  Location(Location),
  SimilarCompany(SimilarCompany),
}

impl DimensionValue {
  pub fn kind(&self) -> DimensionKind {
    match self {
      Self::Specialty(_) => DimensionKind::Specialty,
      Self::CompanyType(_) => DimensionKind::CompanyType,
      Self::Industry(_) => DimensionKind::Industry,
      Self::SizeRange(_) => DimensionKind::SizeRange,
      Self::Location(_) => DimensionKind::Location,
      Self::SimilarCompany(_) => DimensionKind::SimilarCompany,
    }
  }
}

// ─── Detail values ───────────────────────────────────────────────────────────

/// A post from the company's feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyUpdate {
  pub article_link: String,
  pub image:        String,
  /// `1900-01-01` when the source carried no date at all.
  pub posted_on:    NaiveDate,
  pub update_text:  String,
  pub total_likes:  i64,
}

/// A subsidiary or sister company shown on the profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffiliatedCompany {
  pub name:         String,
  pub linkedin_url: String,
  pub industry:     String,
  pub location:     String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DetailValue {
  Update(CompanyUpdate),
  AffiliatedCompany(AffiliatedCompany),
}

impl DetailValue {
  pub fn kind(&self) -> DetailKind {
    match self {
      Self::Update(_) => DetailKind::Update,
      Self::AffiliatedCompany(_) => DetailKind::AffiliatedCompany,
    }
  }
}

// ─── Persisted rows ──────────────────────────────────────────────────────────

/// A minted dimension value with its surrogate id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
  pub dimension_id: Uuid,
  pub value:        DimensionValue,
}

/// A company ↔ dimension association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Link {
  pub company_id:   Uuid,
  pub dimension_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailRow {
  pub detail_id:  Uuid,
  pub company_id: Uuid,
  pub value:      DetailValue,
}
