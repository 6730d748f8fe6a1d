//! Error type for `cohort-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] cohort_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(rusqlite::Error),

  /// A unique, check, or foreign-key constraint of the store rejected the
  /// change. The transaction has been rolled back.
  #[error("integrity violation: {0}")]
  Integrity(String),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("decimal parse error: {0}")]
  Decimal(#[from] bigdecimal::ParseBigDecimalError),

  #[error("unknown {column} code: {value:?}")]
  UnknownCode { column: &'static str, value: String },

  #[error("schema not found: {0}")]
  SchemaNotFound(i64),

  #[error("attribute not found: {0}")]
  AttributeNotFound(String),

  #[error("choice not found: {0}")]
  ChoiceNotFound(i64),

  #[error("entity not found: {0}")]
  EntityNotFound(i64),

  /// A reorder did not name every sibling exactly once.
  #[error("incomplete order for {scope}: {reason}")]
  IncompleteOrder { scope: String, reason: String },

  #[error("configuration error: {0}")]
  Config(#[from] config::ConfigError),
}

impl Error {
  /// Whether this is a value rejected by an attribute rule.
  pub fn is_constraint(&self) -> bool {
    matches!(self, Self::Core(cohort_core::Error::Constraint(_)))
  }
}

impl From<rusqlite::Error> for Error {
  fn from(e: rusqlite::Error) -> Self {
    match &e {
      rusqlite::Error::SqliteFailure(failure, message)
        if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
      {
        let message = message.clone().unwrap_or_else(|| e.to_string());
        tracing::warn!(%message, "store constraint rejected change");
        Self::Integrity(message)
      }
      _ => Self::Sqlite(e),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
