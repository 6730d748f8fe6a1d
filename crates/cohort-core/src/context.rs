//! Contexts: generic links from entities to outside aggregates.
//!
//! A context row says "entity E belongs to row K of table X". The store never
//! needs to know the aggregate types; each one opts in by implementing
//! [`HasEntities`] with its own table name as discriminator.

use serde::{Deserialize, Serialize};

use crate::{
  audit::{AuditStamp, AuditTable, Auditable},
  entity::Entity,
  store::DataStore,
};

/// Discriminator used for randomization strata; entities linked to one mark
/// their schema as randomization-bearing in schema summaries.
pub const STRATUM: &str = "stratum";

/// The `(external, key)` half of a context: which outside row is meant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextKey {
  pub external: String,
  pub key:      i64,
}

impl ContextKey {
  pub fn new(external: impl Into<String>, key: i64) -> Self {
    Self { external: external.into(), key }
  }
}

/// A persisted `(entity, external, key)` triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
  pub id:        i64,
  pub entity_id: i64,
  pub external:  String,
  pub key:       i64,
  #[serde(default)]
  pub audit:     AuditStamp,
}

impl Context {
  pub fn context_key(&self) -> ContextKey { ContextKey::new(self.external.clone(), self.key) }
}

impl Auditable for Context {
  fn audit_table(&self) -> AuditTable { AuditTable::Context }

  fn audit_id(&self) -> i64 { self.id }
}

/// Capability for any aggregate (patient, visit, enrollment, …) that owns
/// entities through contexts.
pub trait HasEntities {
  /// Table name of the aggregate, used as the context discriminator.
  const EXTERNAL: &'static str;

  /// Primary key of this aggregate row.
  fn entity_key(&self) -> i64;

  fn context_key(&self) -> ContextKey { ContextKey::new(Self::EXTERNAL, self.entity_key()) }

  /// Every entity attached to this aggregate.
  async fn entities<S: DataStore>(&self, store: &S) -> Result<Vec<Entity>, S::Error> {
    store.entities_for(self.context_key()).await
  }

  /// Every context row attached to this aggregate.
  async fn contexts<S: DataStore>(&self, store: &S) -> Result<Vec<Context>, S::Error> {
    store.contexts_for(self.context_key()).await
  }

  /// Attach `entity_id` to this aggregate.
  async fn attach<S: DataStore>(&self, store: &S, entity_id: i64) -> Result<Context, S::Error> {
    store.attach(entity_id, self.context_key()).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  struct Visit {
    id: i64,
  }

  impl HasEntities for Visit {
    const EXTERNAL: &'static str = "visit";

    fn entity_key(&self) -> i64 { self.id }
  }

  #[test]
  fn aggregate_derives_its_key() {
    let visit = Visit { id: 42 };
    assert_eq!(visit.context_key(), ContextKey::new("visit", 42));
  }
}
