//! Entities (captured instances of one published schema version) and the
//! value rows that hold their answers.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::{
  Error, Result,
  audit::{AuditStamp, AuditTable, Auditable},
  schema::Schema,
  value::{StoredValue, ValuePartition},
};

/// Workflow state of a captured form.
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
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum EntityState {
  PendingEntry,
  InProgress,
  PendingReview,
  PendingCorrection,
  Complete,
}

/// A data-bearing instance of a schema version. Its answers live in the
/// value partitions and are reached through the store by attribute name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
  pub id:           i64,
  pub schema_id:    i64,
  pub state:        Option<EntityState>,
  /// The form was deliberately not collected.
  pub not_done:     bool,
  pub collect_date: NaiveDate,
  #[serde(default)]
  pub audit:        AuditStamp,
}

impl Auditable for Entity {
  fn audit_table(&self) -> AuditTable { AuditTable::Entity }

  fn audit_id(&self) -> i64 { self.id }
}

/// Input to [`crate::store::DataStore::create_entity`].
#[derive(Debug, Clone)]
pub struct NewEntity {
  pub schema_id:    i64,
  pub state:        Option<EntityState>,
  pub not_done:     bool,
  pub collect_date: NaiveDate,
}

impl NewEntity {
  pub fn new(schema_id: i64, collect_date: NaiveDate) -> Self {
    Self { schema_id, state: None, not_done: false, collect_date }
  }
}

/// Refuse to bind a new entity to a schema that is not currently published.
pub fn check_bindable(schema: &Schema) -> Result<()> {
  if schema.publish_date.is_none() {
    return Err(Error::InvalidEntitySchema {
      schema: schema.name.clone(),
      reason: "schema is an unpublished draft".into(),
    });
  }
  if let Some(retracted) = schema.retract_date {
    return Err(Error::InvalidEntitySchema {
      schema: schema.name.clone(),
      reason: format!("schema was retracted on {retracted}"),
    });
  }
  Ok(())
}

// ─── Value rows ──────────────────────────────────────────────────────────────

/// One stored answer (or one element of a collection answer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueRow {
  pub id:           i64,
  pub entity_id:    i64,
  pub attribute_id: i64,
  pub partition:    ValuePartition,
  pub value:        StoredValue,
  #[serde(default)]
  pub audit:        AuditStamp,
}

impl Auditable for ValueRow {
  fn audit_table(&self) -> AuditTable { AuditTable::Value(self.partition) }

  fn audit_id(&self) -> i64 { self.id }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::schema::tests::sample_schema;

  #[test]
  fn only_published_schemas_are_bindable() {
    let mut schema = sample_schema();
    assert!(check_bindable(&schema).is_ok());

    schema.retract_date = NaiveDate::from_ymd_opt(2022, 6, 1);
    assert!(matches!(check_bindable(&schema), Err(Error::InvalidEntitySchema { .. })));

    schema.publish_date = None;
    schema.retract_date = None;
    assert!(matches!(check_bindable(&schema), Err(Error::InvalidEntitySchema { .. })));
  }

  #[test]
  fn state_uses_kebab_case_codes() {
    assert_eq!(EntityState::PendingEntry.to_string(), "pending-entry");
    assert_eq!("complete".parse::<EntityState>().unwrap(), EntityState::Complete);
  }
}
