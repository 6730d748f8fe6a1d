//! Captured values and their physical partitions.
//!
//! Callers exchange [`Value`]s keyed by attribute name. Each attribute type
//! maps to one of six [`ValuePartition`]s, and a value is converted into the
//! partition's column form ([`StoredValue`]) before it is written.

use std::fmt;

use bigdecimal::{BigDecimal, One, Zero};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
  ConstraintError, Error, Result,
  error::Violation,
  schema::{Attribute, AttributeType},
};

// ─── Value ───────────────────────────────────────────────────────────────────

/// Metadata of an uploaded file; the bytes live outside the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobInfo {
  /// Storage path of the file, relative to the configured upload root.
  pub path:      String,
  pub file_name: String,
  pub mime_type: String,
}

/// A typed answer, as read from or written to an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
  String(String),
  Text(String),
  Number(BigDecimal),
  Date(NaiveDate),
  DateTime(NaiveDateTime),
  Boolean(bool),
  /// The `name` code of one of the attribute's choices.
  ChoiceCode(String),
  Blob(BlobInfo),
  Collection(Vec<Value>),
}

impl Value {
  pub fn variant_name(&self) -> &'static str {
    match self {
      Self::String(_) => "string",
      Self::Text(_) => "text",
      Self::Number(_) => "number",
      Self::Date(_) => "date",
      Self::DateTime(_) => "datetime",
      Self::Boolean(_) => "boolean",
      Self::ChoiceCode(_) => "choice",
      Self::Blob(_) => "blob",
      Self::Collection(_) => "collection",
    }
  }

  pub fn choice(code: impl Into<String>) -> Self { Self::ChoiceCode(code.into()) }

  pub fn choices<I, S>(codes: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self::Collection(codes.into_iter().map(Self::choice).collect())
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::String(s) | Self::Text(s) | Self::ChoiceCode(s) => f.write_str(s),
      Self::Number(n) => write!(f, "{n}"),
      Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
      Self::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S")),
      Self::Boolean(b) => write!(f, "{b}"),
      Self::Blob(b) => f.write_str(&b.file_name),
      Self::Collection(items) => {
        f.write_str("[")?;
        for (i, item) in items.iter().enumerate() {
          if i > 0 {
            f.write_str(", ")?;
          }
          write!(f, "{item}")?;
        }
        f.write_str("]")
      }
    }
  }
}

impl From<&str> for Value {
  fn from(s: &str) -> Self { Self::String(s.to_owned()) }
}

impl From<String> for Value {
  fn from(s: String) -> Self { Self::String(s) }
}

impl From<i64> for Value {
  fn from(n: i64) -> Self { Self::Number(BigDecimal::from(n)) }
}

impl From<BigDecimal> for Value {
  fn from(n: BigDecimal) -> Self { Self::Number(n) }
}

impl From<bool> for Value {
  fn from(b: bool) -> Self { Self::Boolean(b) }
}

impl From<NaiveDate> for Value {
  fn from(d: NaiveDate) -> Self { Self::Date(d) }
}

impl From<NaiveDateTime> for Value {
  fn from(dt: NaiveDateTime) -> Self { Self::DateTime(dt) }
}

// ─── Partitions ──────────────────────────────────────────────────────────────

/// The six physical value tables.
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
  EnumString,
  EnumIter,
  IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ValuePartition {
  String,
  Text,
  Number,
  Datetime,
  Choice,
  Blob,
}

impl ValuePartition {
  /// The partition backing an attribute type; sections have none.
  pub fn for_type(kind: AttributeType) -> Option<Self> {
    match kind {
      AttributeType::String => Some(Self::String),
      AttributeType::Text => Some(Self::Text),
      AttributeType::Number => Some(Self::Number),
      AttributeType::Date | AttributeType::Datetime => Some(Self::Datetime),
      AttributeType::Choice => Some(Self::Choice),
      AttributeType::Blob => Some(Self::Blob),
      AttributeType::Section => None,
    }
  }

  pub fn table(self) -> &'static str {
    match self {
      Self::String => "value_string",
      Self::Text => "value_text",
      Self::Number => "value_number",
      Self::Datetime => "value_datetime",
      Self::Choice => "value_choice",
      Self::Blob => "value_blob",
    }
  }

  pub fn history_table(self) -> &'static str {
    match self {
      Self::String => "value_string_history",
      Self::Text => "value_text_history",
      Self::Number => "value_number_history",
      Self::Datetime => "value_datetime_history",
      Self::Choice => "value_choice_history",
      Self::Blob => "value_blob_history",
    }
  }
}

/// A value in the column form of its partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoredValue {
  /// Both `string` and `text` partitions.
  Text(String),
  Number(BigDecimal),
  Datetime(NaiveDateTime),
  /// The id of the selected choice.
  Choice(i64),
  Blob(BlobInfo),
}

impl Attribute {
  pub fn partition(&self) -> Option<ValuePartition> { ValuePartition::for_type(self.kind) }

  /// The partition of a value-bearing attribute; sections are rejected.
  pub fn value_partition(&self) -> Result<ValuePartition> {
    self.partition().ok_or_else(|| Error::AttributeDefinition {
      attribute: self.name.clone(),
      reason:    "sections hold no values".into(),
    })
  }

  fn mismatch(&self, value: &Value) -> Error {
    Error::ValueMismatch {
      attribute: self.name.clone(),
      expected:  self.kind.to_string(),
      found:     value.variant_name().into(),
    }
  }

  /// Bring a scalar into the canonical variant for this attribute: numbers
  /// rounded to `decimal_places`, text kinds unified, dates and datetimes
  /// reconciled. Choice codes are not resolved here.
  pub fn normalize(&self, value: Value) -> Result<Value> {
    use AttributeType as T;
    let normalized = match (self.kind, value) {
      (T::String, Value::String(s) | Value::Text(s)) => Value::String(s),
      (T::Text, Value::String(s) | Value::Text(s)) => Value::Text(s),
      (T::Number, Value::Number(n)) => {
        if self.is_boolean_flag() {
          Value::Boolean(!n.is_zero())
        } else {
          Value::Number(self.round(n))
        }
      }
      (T::Number, Value::Boolean(b)) => {
        if self.is_boolean_flag() {
          Value::Boolean(b)
        } else {
          Value::Number(bool_number(b))
        }
      }
      (T::Date, Value::Date(d)) => Value::Date(d),
      (T::Date, Value::DateTime(dt)) => Value::Date(dt.date()),
      (T::Datetime, Value::DateTime(dt)) => Value::DateTime(dt),
      (T::Datetime, Value::Date(d)) => Value::DateTime(d.and_time(NaiveTime::MIN)),
      (T::Choice, Value::ChoiceCode(c) | Value::String(c)) => Value::ChoiceCode(c),
      (T::Blob, Value::Blob(b)) => Value::Blob(b),
      (_, other) => return Err(self.mismatch(&other)),
    };
    Ok(normalized)
  }

  fn round(&self, n: BigDecimal) -> BigDecimal {
    match self.decimal_places {
      Some(places) => n.round(i64::from(places)),
      None => n,
    }
  }

  /// Convert a normalized scalar into its partition's column form. Choice
  /// codes resolve against the choice map; unknown codes are a constraint
  /// violation naming the valid set.
  pub fn to_stored(&self, schema: &str, value: &Value) -> Result<StoredValue> {
    let stored = match value {
      Value::String(s) | Value::Text(s) => StoredValue::Text(s.clone()),
      Value::Number(n) => StoredValue::Number(n.clone()),
      Value::Boolean(b) => StoredValue::Number(bool_number(*b)),
      Value::Date(d) => StoredValue::Datetime(d.and_time(NaiveTime::MIN)),
      Value::DateTime(dt) => StoredValue::Datetime(*dt),
      Value::ChoiceCode(code) => match self.choices.get(code) {
        Some(choice) => StoredValue::Choice(choice.id),
        None => {
          let valid: Vec<&str> = self.iterchoices().map(|c| c.name.as_str()).collect();
          return Err(
            ConstraintError {
              schema:    schema.to_owned(),
              attribute: self.name.clone(),
              violation: Violation::Choice,
              limit:     format!("{{{}}}", valid.join(", ")),
              value:     code.clone(),
            }
            .into(),
          );
        }
      },
      Value::Blob(b) => StoredValue::Blob(b.clone()),
      Value::Collection(_) => return Err(self.mismatch(value)),
    };
    Ok(stored)
  }

  /// Convert a stored column value back into the caller-facing form.
  pub fn from_stored(&self, stored: StoredValue) -> Result<Value> {
    use AttributeType as T;
    let value = match (self.kind, stored) {
      (T::String, StoredValue::Text(s)) => Value::String(s),
      (T::Text, StoredValue::Text(s)) => Value::Text(s),
      (T::Number, StoredValue::Number(n)) => {
        if self.is_boolean_flag() {
          Value::Boolean(!n.is_zero())
        } else {
          Value::Number(n)
        }
      }
      (T::Date, StoredValue::Datetime(dt)) => Value::Date(dt.date()),
      (T::Datetime, StoredValue::Datetime(dt)) => Value::DateTime(dt),
      (T::Choice, StoredValue::Choice(id)) => {
        let choice = self.choice_by_id(id).ok_or_else(|| Error::UnknownChoice {
          attribute: self.name.clone(),
          choice_id: id,
        })?;
        Value::ChoiceCode(choice.name.clone())
      }
      (T::Blob, StoredValue::Blob(b)) => Value::Blob(b),
      (kind, stored) => {
        return Err(Error::ValueMismatch {
          attribute: self.name.clone(),
          expected:  kind.to_string(),
          found:     format!("{stored:?}"),
        });
      }
    };
    Ok(value)
  }
}

fn bool_number(b: bool) -> BigDecimal {
  if b { BigDecimal::one() } else { BigDecimal::zero() }
}
