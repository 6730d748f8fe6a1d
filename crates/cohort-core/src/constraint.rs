//! Per-attribute value rules, enforced when a value is assigned.
//!
//! These mirror the store's CHECK constraints but run first, so a rejected
//! value carries the schema, attribute, limit and offending value.
//!
//! Collection attributes are not validated as a whole; only scalar
//! assignments pass through here.

use std::{
  cmp::Ordering,
  collections::HashMap,
  sync::{LazyLock, Mutex},
};

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDateTime, NaiveTime};
use regex::Regex;

use crate::{
  ConstraintError, Error, Result,
  error::Violation,
  schema::Attribute,
  value::Value,
};

/// Check a normalized scalar value against `attribute`'s bounds and pattern.
///
/// `min`/`max` are inclusive character counts for string and text, inclusive
/// numeric bounds for numbers, and epoch-second timestamps for dates and
/// datetimes.
pub fn validate(schema: &str, attribute: &Attribute, value: Option<&Value>) -> Result<()> {
  let Some(value) = value else { return Ok(()) };
  if attribute.is_collection || matches!(value, Value::Collection(_)) {
    return Ok(());
  }

  let violation = |violation: Violation, limit: String| -> Error {
    ConstraintError {
      schema: schema.to_owned(),
      attribute: attribute.name.clone(),
      violation,
      limit,
      value: value.to_string(),
    }
    .into()
  };

  if let Some(min) = attribute.value_min
    && compare(value, min).is_some_and(Ordering::is_lt)
  {
    return Err(violation(Violation::Min, render_limit(attribute, min)));
  }
  if let Some(max) = attribute.value_max
    && compare(value, max).is_some_and(Ordering::is_gt)
  {
    return Err(violation(Violation::Max, render_limit(attribute, max)));
  }

  if let Some(pattern) = &attribute.pattern {
    let full = compile_pattern(&attribute.name, pattern)?;
    if !full.is_match(&value.to_string()) {
      return Err(violation(Violation::Pattern, pattern.clone()));
    }
  }

  Ok(())
}

/// Order `value` against an integer limit in the value's own representation.
/// `None` when the kind of value has no bound semantics (choices, blobs,
/// booleans).
fn compare(value: &Value, limit: i64) -> Option<Ordering> {
  match value {
    Value::String(s) | Value::Text(s) => {
      let len = i64::try_from(s.chars().count()).unwrap_or(i64::MAX);
      Some(len.cmp(&limit))
    }
    Value::Number(n) => Some(n.cmp(&BigDecimal::from(limit))),
    Value::Date(d) => Some(d.and_time(NaiveTime::MIN).cmp(&epoch(limit)?)),
    Value::DateTime(dt) => Some(dt.cmp(&epoch(limit)?)),
    _ => None,
  }
}

/// Compiled, whole-value forms of attribute patterns, keyed by pattern text.
static PATTERNS: LazyLock<Mutex<HashMap<String, Regex>>> = LazyLock::new(Mutex::default);

/// `pattern` anchored to match a whole value, compiled once per process.
pub(crate) fn compile_pattern(attribute: &str, pattern: &str) -> Result<Regex> {
  if let Ok(cache) = PATTERNS.lock()
    && let Some(regex) = cache.get(pattern)
  {
    return Ok(regex.clone());
  }
  let regex = Regex::new(&format!("^(?:{pattern})$")).map_err(|e| Error::InvalidPattern {
    attribute: attribute.to_owned(),
    pattern:   pattern.to_owned(),
    message:   e.to_string(),
  })?;
  if let Ok(mut cache) = PATTERNS.lock() {
    cache.insert(pattern.to_owned(), regex.clone());
  }
  Ok(regex)
}

/// The UTC instant `seconds` after the epoch; `None` outside chrono's range.
pub(crate) fn epoch(seconds: i64) -> Option<NaiveDateTime> {
  DateTime::from_timestamp(seconds, 0).map(|dt| dt.naive_utc())
}

fn render_limit(attribute: &Attribute, limit: i64) -> String {
  if attribute.kind.is_temporal() {
    epoch(limit).map_or_else(|| limit.to_string(), |dt| dt.to_string())
  } else {
    limit.to_string()
  }
}
