//! Value normalization: trimming, defaulting and coercing leaf values.
//!
//! [`normalize`] turns one [`SubRecord`] into the value a stage persists, or
//! `None` when the sub-record carries nothing usable (an empty scalar, a size
//! pair outside the known buckets, a location without a country, a similar
//! company without a name). Detail objects are never dropped; every missing
//! leaf takes its default. Dropping is silent: it is policy, not failure.

use chrono::NaiveDate;
use serde_json::Value;
use strum::IntoEnumIterator as _;

use crate::{
  entity::{
    AffiliatedCompany, CompanyUpdate, DetailValue, DimensionValue, Location,
    SimilarCompany, SizeRange, Stage,
  },
  payload::SubRecord,
};

pub const NO_NAME: &str = "No Name Provided";
pub const NO_LINK: &str = "No Link Provided";
pub const NO_INDUSTRY: &str = "No Industry Provided";
pub const NO_LOCATION: &str = "No Location Provided";

/// Year substituted when a date carries no year. Any date in this year means
/// "unknown", not a real historical date.
pub const UNKNOWN_YEAR: i32 = 1900;

/// `1900-01-01`, produced when every date part is missing.
pub fn unknown_date() -> NaiveDate {
  NaiveDate::from_ymd_opt(UNKNOWN_YEAR, 1, 1).unwrap_or(NaiveDate::MIN)
}

// ─── Leaf rules ──────────────────────────────────────────────────────────────

/// Trimmed text of a scalar leaf; empty text and non-scalars are absent.
pub fn text(v: &Value) -> Option<String> {
  let s = match v {
    Value::String(s) => s.trim().to_owned(),
    Value::Number(n) => n.to_string(),
    Value::Bool(b) => b.to_string(),
    Value::Null | Value::Array(_) | Value::Object(_) => return None,
  };
  (!s.is_empty()).then_some(s)
}

/// Integer value of a numeric or numeric-string leaf.
pub fn integer(v: &Value) -> Option<i64> {
  match v {
    Value::Number(n) => n.as_i64().or_else(|| {
      n.as_f64()
        .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
        .map(|f| f as i64)
    }),
    Value::String(s) => s.trim().parse().ok(),
    _ => None,
  }
}

/// Exact-match a `(low, high)` pair to its bucket.
pub fn size_range(low: Option<i64>, high: Option<i64>) -> Option<SizeRange> {
  let low = low?;
  SizeRange::iter().find(|bucket| bucket.bounds() == (low, high))
}

/// Assemble a calendar date, defaulting day and month to 1 and the year to
/// [`UNKNOWN_YEAR`]. Part combinations that name no real date fall back to
/// the unknown sentinel.
pub fn posted_on(day: Option<i64>, month: Option<i64>, year: Option<i64>) -> NaiveDate {
  let year = year.map_or(Some(UNKNOWN_YEAR), |y| i32::try_from(y).ok());
  let month = month.map_or(Some(1), |m| u32::try_from(m).ok());
  let day = day.map_or(Some(1), |d| u32::try_from(d).ok());

  match (year, month, day) {
    (Some(y), Some(m), Some(d)) => {
      NaiveDate::from_ymd_opt(y, m, d).unwrap_or_else(unknown_date)
    }
    _ => unknown_date(),
  }
}

/// `true` only for the literal tokens `"true"` and `"1"`.
pub fn hq_flag(v: Option<&Value>) -> bool {
  v.and_then(text).is_some_and(|t| t == "true" || t == "1")
}

// ─── Sub-record rules ────────────────────────────────────────────────────────

/// What one sub-record normalizes into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
  Dimension(DimensionValue),
  Detail(DetailValue),
}

pub fn normalize(stage: Stage, sub: &SubRecord) -> Option<Normalized> {
  match stage {
    Stage::Specialty => scalar(sub).map(DimensionValue::Specialty).map(Normalized::Dimension),
    Stage::CompanyType => {
      scalar(sub).map(DimensionValue::CompanyType).map(Normalized::Dimension)
    }
    Stage::Industry => scalar(sub).map(DimensionValue::Industry).map(Normalized::Dimension),
    Stage::SizeRange => size(sub).map(DimensionValue::SizeRange).map(Normalized::Dimension),
    Stage::Location => location(sub).map(DimensionValue::Location).map(Normalized::Dimension),
    Stage::SimilarCompany => {
      similar_company(sub).map(DimensionValue::SimilarCompany).map(Normalized::Dimension)
    }
    Stage::Update => update(sub).map(DetailValue::Update).map(Normalized::Detail),
    Stage::AffiliatedCompany => {
      affiliated_company(sub).map(DetailValue::AffiliatedCompany).map(Normalized::Detail)
    }
  }
}

fn scalar(sub: &SubRecord) -> Option<String> {
  match sub {
    SubRecord::Scalar(v) => text(v),
    _ => None,
  }
}

fn size(sub: &SubRecord) -> Option<SizeRange> {
  match sub {
    SubRecord::Pair { low, high } => size_range(integer(low), integer(high)),
    _ => None,
  }
}

fn leaf_text(sub: &SubRecord, path: &[&str]) -> Option<String> {
  sub.leaf(path).and_then(text)
}

fn location(sub: &SubRecord) -> Option<Location> {
  Some(Location {
    country:       leaf_text(sub, &["country"])?,
    city:          leaf_text(sub, &["city"]),
    postal_code:   leaf_text(sub, &["postal_code"]),
    address_line1: leaf_text(sub, &["line_1"]),
    state:         leaf_text(sub, &["state"]),
    is_hq:         hq_flag(sub.leaf(&["is_hq"])),
  })
}

/// `(name, link, industry, location)` of a company reference, each leaf
/// replaced by its placeholder when absent.
fn company_ref(sub: &SubRecord) -> (String, String, String, String) {
  (
    leaf_text(sub, &["name"]).unwrap_or_else(|| NO_NAME.to_owned()),
    leaf_text(sub, &["link"]).unwrap_or_else(|| NO_LINK.to_owned()),
    leaf_text(sub, &["industry"]).unwrap_or_else(|| NO_INDUSTRY.to_owned()),
    leaf_text(sub, &["location"]).unwrap_or_else(|| NO_LOCATION.to_owned()),
  )
}

/// Similar companies are only admitted under a real name.
fn similar_company(sub: &SubRecord) -> Option<SimilarCompany> {
  leaf_text(sub, &["name"])?;
  let (name, linkedin_url, industry, location) = company_ref(sub);
  Some(SimilarCompany { name, linkedin_url, industry, location })
}

fn affiliated_company(sub: &SubRecord) -> Option<AffiliatedCompany> {
  if !matches!(sub, SubRecord::Object(_)) {
    return None;
  }
  let (name, linkedin_url, industry, location) = company_ref(sub);
  Some(AffiliatedCompany { name, linkedin_url, industry, location })
}

fn update(sub: &SubRecord) -> Option<CompanyUpdate> {
  if !matches!(sub, SubRecord::Object(_)) {
    return None;
  }

  let part = |name: &str| sub.leaf(&["posted_on", name]).and_then(integer);

  Some(CompanyUpdate {
    article_link: leaf_text(sub, &["article_link"]).unwrap_or_else(|| NO_LINK.to_owned()),
    image:        leaf_text(sub, &["image"]).unwrap_or_default(),
    posted_on:    posted_on(part("day"), part("month"), part("year")),
    update_text:  leaf_text(sub, &["text"]).unwrap_or_default(),
    total_likes:  sub.leaf(&["total_likes"]).and_then(integer).unwrap_or(0),
  })
}
