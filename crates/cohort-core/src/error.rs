//! Error types for `cohort-core`.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid name {name:?}: {reason}")]
  NameValidation { name: String, reason: String },

  #[error(transparent)]
  Constraint(#[from] ConstraintError),

  #[error("cannot bind entity to schema {schema:?}: {reason}")]
  InvalidEntitySchema { schema: String, reason: String },

  #[error("invalid definition for attribute {attribute:?}: {reason}")]
  AttributeDefinition { attribute: String, reason: String },

  #[error("invalid pattern {pattern:?} on attribute {attribute:?}: {message}")]
  InvalidPattern {
    attribute: String,
    pattern:   String,
    message:   String,
  },

  #[error("attribute {attribute:?} of type {expected} cannot hold {found}")]
  ValueMismatch {
    attribute: String,
    expected:  String,
    found:     String,
  },

  #[error("attribute {attribute:?} has no choice with id {choice_id}")]
  UnknownChoice { attribute: String, choice_id: i64 },

  #[error("invalid reparent of {attribute:?}: {reason}")]
  InvalidReparent { attribute: String, reason: String },

  #[error("schema {schema:?}: {reason}")]
  Lifecycle { schema: String, reason: String },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

// ─── Constraint violations ───────────────────────────────────────────────────

/// Which declarative rule a value broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
  /// `value_min`: the check `limit <= value` failed.
  Min,
  /// `value_max`: the check `limit >= value` failed.
  Max,
  Pattern,
  /// The value is not one of the attribute's choice codes.
  Choice,
}

impl Violation {
  /// The comparison operator that failed, as the limit relates to the value.
  pub fn operator(self) -> &'static str {
    match self {
      Self::Min => "<=",
      Self::Max => ">=",
      Self::Pattern => "~",
      Self::Choice => "in",
    }
  }
}

/// A value rejected by an attribute's declared rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct ConstraintError {
  pub schema:    String,
  pub attribute: String,
  pub violation: Violation,
  /// The limit, pattern, or valid choice set, rendered for display.
  pub limit:     String,
  pub value:     String,
}

impl fmt::Display for ConstraintError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.violation {
      Violation::Choice => write!(
        f,
        "{}.{}: {:?} is not a valid choice (valid: {})",
        self.schema, self.attribute, self.value, self.limit
      ),
      Violation::Pattern => write!(
        f,
        "{}.{}: {:?} does not match pattern {:?}",
        self.schema, self.attribute, self.value, self.limit
      ),
      op => write!(
        f,
        "{}.{}: constraint {} {} {:?} failed",
        self.schema,
        self.attribute,
        self.limit,
        op.operator(),
        self.value
      ),
    }
  }
}
