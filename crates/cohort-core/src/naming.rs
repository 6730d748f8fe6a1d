//! Name rules for schemas and attributes.
//!
//! Names become column headers in exported reports and keys in captured data,
//! so they are restricted to identifier-like strings. Checks run when a name
//! is assigned, before anything reaches a store.

use std::sync::LazyLock;

use regex::Regex;

use crate::{Error, Result};

static NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("static name pattern")
});

/// Attribute names that would shadow entity columns, audit columns, or SQL
/// keywords in flattened exports. Compared case-insensitively.
pub const RESERVED_WORDS: &[&str] = &[
  // entity and audit columns
  "id",
  "entity",
  "entity_id",
  "schema",
  "schema_id",
  "attribute",
  "attribute_id",
  "state",
  "collect_date",
  "not_done",
  "revision",
  "create_date",
  "create_user",
  "modify_date",
  "modify_user",
  "context",
  "external",
  "key",
  "value",
  // SQL keywords
  "all",
  "and",
  "as",
  "between",
  "by",
  "case",
  "check",
  "column",
  "constraint",
  "create",
  "delete",
  "distinct",
  "drop",
  "else",
  "end",
  "exists",
  "from",
  "group",
  "having",
  "in",
  "index",
  "insert",
  "into",
  "is",
  "join",
  "like",
  "limit",
  "not",
  "null",
  "on",
  "or",
  "order",
  "primary",
  "references",
  "select",
  "set",
  "table",
  "then",
  "union",
  "unique",
  "update",
  "using",
  "values",
  "when",
  "where",
  "with",
];

/// Validate a schema name against the identifier pattern.
pub fn validate_schema_name(name: &str) -> Result<()> { check_pattern(name) }

/// Validate an attribute name against the identifier pattern and the
/// reserved-word list.
pub fn validate_attribute_name(name: &str) -> Result<()> {
  check_pattern(name)?;
  if is_reserved(name) {
    return Err(Error::NameValidation {
      name:   name.to_owned(),
      reason: "reserved word".into(),
    });
  }
  Ok(())
}

/// Choice names are short codes such as `"001"`; they only need content.
pub fn validate_choice_name(name: &str) -> Result<()> {
  if name.trim().is_empty() {
    return Err(Error::NameValidation {
      name:   name.to_owned(),
      reason: "choice code must not be blank".into(),
    });
  }
  Ok(())
}

pub fn is_reserved(name: &str) -> bool {
  RESERVED_WORDS.iter().any(|w| w.eq_ignore_ascii_case(name))
}

fn check_pattern(name: &str) -> Result<()> {
  if NAME_PATTERN.is_match(name) {
    Ok(())
  } else {
    Err(Error::NameValidation {
      name:   name.to_owned(),
      reason: format!("must match {}", NAME_PATTERN.as_str()),
    })
  }
}
