//! Revision history contract.
//!
//! Every mutable record type opts in by implementing [`Auditable`]. A backend
//! writes one [`Revision`] snapshot per material insert/update, plus a final
//! snapshot before a delete, in the same transaction as the change itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use strum::{Display, EnumString, IntoStaticStr};

use crate::{Result, value::ValuePartition};

// ─── Audit columns ───────────────────────────────────────────────────────────

/// Who created and last modified a live row, and when.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStamp {
  pub create_date: DateTime<Utc>,
  pub create_user: String,
  pub modify_date: DateTime<Utc>,
  pub modify_user: String,
}

impl AuditStamp {
  pub fn new(at: DateTime<Utc>, user: &str) -> Self {
    Self {
      create_date: at,
      create_user: user.to_owned(),
      modify_date: at,
      modify_user: user.to_owned(),
    }
  }

  /// Bump the modification columns, keeping the creation columns.
  pub fn touch(&mut self, at: DateTime<Utc>, user: &str) {
    self.modify_date = at;
    self.modify_user = user.to_owned();
  }
}

// ─── Tables ──────────────────────────────────────────────────────────────────

/// Every table with a parallel history table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditTable {
  Schema,
  Attribute,
  Choice,
  Entity,
  Context,
  Value(ValuePartition),
}

impl AuditTable {
  pub const ALL: [Self; 11] = [
    Self::Schema,
    Self::Attribute,
    Self::Choice,
    Self::Entity,
    Self::Context,
    Self::Value(ValuePartition::String),
    Self::Value(ValuePartition::Text),
    Self::Value(ValuePartition::Number),
    Self::Value(ValuePartition::Datetime),
    Self::Value(ValuePartition::Choice),
    Self::Value(ValuePartition::Blob),
  ];

  /// Name of the live table.
  pub fn name(self) -> &'static str {
    match self {
      Self::Schema => "schema",
      Self::Attribute => "attribute",
      Self::Choice => "choice",
      Self::Entity => "entity",
      Self::Context => "context",
      Self::Value(p) => p.table(),
    }
  }

  /// Name of the parallel history table.
  pub fn history_name(self) -> &'static str {
    match self {
      Self::Schema => "schema_history",
      Self::Attribute => "attribute_history",
      Self::Choice => "choice_history",
      Self::Entity => "entity_history",
      Self::Context => "context_history",
      Self::Value(p) => p.history_table(),
    }
  }
}

// ─── Auditable ───────────────────────────────────────────────────────────────

/// A record type whose every change is preserved in a history table.
pub trait Auditable: Serialize + DeserializeOwned {
  /// Keys of the serialised form that are not columns of the live row
  /// (e.g. child collections loaded alongside it).
  const DERIVED: &'static [&'static str] = &[];

  /// The table this record lives in.
  fn audit_table(&self) -> AuditTable;

  /// The live row's primary key; revisions are sequenced per key.
  fn audit_id(&self) -> i64;

  /// The column values captured in a history row. Audit columns are excluded
  /// so that re-saving an unchanged record is not a material change.
  fn snapshot(&self) -> Result<serde_json::Value> {
    let mut value = serde_json::to_value(self)?;
    if let Some(map) = value.as_object_mut() {
      map.remove("audit");
      for key in Self::DERIVED {
        map.remove(*key);
      }
    }
    Ok(value)
  }
}

/// The kind of change a history row records.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AuditAction {
  Insert,
  Update,
  Delete,
}

/// One history row: a full snapshot of a record at a revision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Revision<T> {
  pub id:          i64,
  /// Starts at 1 and increases by one per recorded change of `id`.
  pub revision:    u32,
  pub action:      AuditAction,
  pub recorded_at: DateTime<Utc>,
  pub recorded_by: String,
  pub data:        T,
}
