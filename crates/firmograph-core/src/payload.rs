//! Field extraction: decoding a raw payload column into sub-records.
//!
//! Every payload column is decoded by one routine driven by the column's
//! declared [`Shape`]. The decoded [`Payload`] is one of a small closed set
//! and yields a lazy [`SubRecords`] sequence. A column that cannot be decoded
//! contributes nothing for that record; it never fails the batch.

use serde_json::{Map, Value};

use crate::{entity::Stage, staging::StagingRecord};

// ─── Shapes ──────────────────────────────────────────────────────────────────

/// What a staging column is expected to hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
  /// Plain text holding exactly one value (e.g. `industry`).
  Scalar,
  /// A JSON array of scalars.
  ScalarList,
  /// A JSON array of objects.
  ObjectList,
  /// A JSON `[low, high]` array.
  NumericPair,
}

/// A decoded payload column.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
  ScalarList(Vec<Value>),
  ObjectList(Vec<Value>),
  NumericPair(Value, Value),
  Absent,
}

/// Why a payload could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct Malformed(String);

impl Payload {
  pub fn decode(shape: Shape, raw: Option<&str>) -> Result<Self, Malformed> {
    let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
      return Ok(Self::Absent);
    };

    if shape == Shape::Scalar {
      // Plain text, or a JSON string literal from loaders that encode every
      // column as JSON.
      let text = match serde_json::from_str::<Value>(raw) {
        Ok(Value::String(s)) => s,
        _ => raw.to_owned(),
      };
      return Ok(Self::ScalarList(vec![Value::String(text)]));
    }

    let value: Value =
      serde_json::from_str(raw).map_err(|e| Malformed(format!("invalid JSON: {e}")))?;

    match (shape, value) {
      (_, Value::Null) => Ok(Self::Absent),
      (_, Value::Array(items)) if items.is_empty() => Ok(Self::Absent),

      (Shape::ScalarList, Value::Array(items)) => Ok(Self::ScalarList(items)),
      (Shape::ScalarList, s @ Value::String(_)) => Ok(Self::ScalarList(vec![s])),

      (Shape::ObjectList, Value::Array(items)) => Ok(Self::ObjectList(items)),
      (Shape::ObjectList, o @ Value::Object(_)) => Ok(Self::ObjectList(vec![o])),

      (Shape::NumericPair, Value::Array(items)) if items.len() <= 2 => {
        let mut items = items.into_iter();
        let low = items.next().unwrap_or(Value::Null);
        let high = items.next().unwrap_or(Value::Null);
        Ok(Self::NumericPair(low, high))
      }

      (shape, other) => Err(Malformed(format!(
        "expected {shape:?}, found {}",
        json_kind(&other)
      ))),
    }
  }

  pub fn into_sub_records(self) -> SubRecords {
    let inner: Box<dyn Iterator<Item = SubRecord> + Send> = match self {
      Self::ScalarList(items) => Box::new(
        items
          .into_iter()
          .filter(|v| !matches!(v, Value::Null | Value::Array(_) | Value::Object(_)))
          .map(SubRecord::Scalar),
      ),
      Self::ObjectList(items) => {
        Box::new(items.into_iter().filter_map(|v| match v {
          Value::Object(map) => Some(SubRecord::Object(map)),
          _ => None,
        }))
      }
      Self::NumericPair(low, high) => {
        Box::new(std::iter::once(SubRecord::Pair { low, high }))
      }
      Self::Absent => Box::new(std::iter::empty()),
    };
    SubRecords { inner }
  }
}

fn json_kind(v: &Value) -> &'static str {
  match v {
    Value::Null => "null",
    Value::Bool(_) => "boolean",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  }
}

// ─── Sub-records ─────────────────────────────────────────────────────────────

/// One element found inside a payload.
#[derive(Debug, Clone, PartialEq)]
pub enum SubRecord {
  Scalar(Value),
  Object(Map<String, Value>),
  Pair { low: Value, high: Value },
}

impl SubRecord {
  /// Look up a nested leaf of an object sub-record. Missing keys, and any
  /// path into a non-object, read as absent.
  pub fn leaf(&self, path: &[&str]) -> Option<&Value> {
    let Self::Object(map) = self else {
      return None;
    };
    let (first, rest) = path.split_first()?;
    rest
      .iter()
      .try_fold(map.get(*first)?, |v, key| v.as_object()?.get(*key))
      .filter(|v| !v.is_null())
  }
}

/// Lazy sequence of sub-records from one payload.
pub struct SubRecords {
  inner: Box<dyn Iterator<Item = SubRecord> + Send>,
}

impl SubRecords {
  pub fn empty() -> Self { Payload::Absent.into_sub_records() }
}

impl Iterator for SubRecords {
  type Item = SubRecord;

  fn next(&mut self) -> Option<SubRecord> { self.inner.next() }
}

/// Extract the sub-records a stage consumes from one staging record.
///
/// Malformed payloads are logged and yield nothing.
pub fn extract(record: &StagingRecord, stage: Stage) -> SubRecords {
  let field = stage.field();
  match Payload::decode(stage.shape(), record.payload(field)) {
    Ok(payload) => payload.into_sub_records(),
    Err(e) => {
      tracing::warn!(
        company_id = %record.company_id,
        %field,
        error = %e,
        "skipping malformed payload"
      );
      SubRecords::empty()
    }
  }
}
