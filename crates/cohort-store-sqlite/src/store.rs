//! [`SqliteStore`]: the SQLite implementation of [`DataStore`].

use std::{collections::BTreeMap, path::Path, sync::Arc, time::Duration};

use chrono::NaiveDate;
use cohort_core::{
  audit::{AuditTable, Auditable, Revision},
  context::{Context, ContextKey},
  entity::{Entity, NewEntity},
  schema::{Attribute, Choice, NewAttribute, NewChoice, NewSchema, Schema, SchemaSummary},
  store::DataStore,
  value::Value,
};

use crate::{Error, Result, Session, StoreConfig, schema::full_schema};

/// Default user stamped into audit columns.
const SYSTEM_ACTOR: &str = "system";
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Cohort store backed by a single SQLite database.
///
/// Cloning is cheap: the inner connection is reference-counted and clones
/// share it. Each clone may act as a different user (see [`with_actor`]).
///
/// [`with_actor`]: SqliteStore::with_actor
#[derive(Clone)]
pub struct SqliteStore {
  conn:  tokio_rusqlite::Connection,
  actor: Arc<str>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref().to_owned();
    let conn = tokio_rusqlite::Connection::open(&path).await?;
    tracing::info!(path = %path.display(), "store opened");
    Self::init(conn, SYSTEM_ACTOR.into(), DEFAULT_BUSY_TIMEOUT).await
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn, SYSTEM_ACTOR.into(), DEFAULT_BUSY_TIMEOUT).await
  }

  /// Open the store described by `config`.
  pub async fn from_config(config: &StoreConfig) -> Result<Self> {
    let conn = if config.is_in_memory() {
      tokio_rusqlite::Connection::open_in_memory().await?
    } else {
      tokio_rusqlite::Connection::open(&config.path).await?
    };
    tracing::info!(path = %config.path.display(), actor = %config.actor, "store opened");
    let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
    Self::init(conn, config.actor.as_str().into(), busy_timeout).await
  }

  async fn init(
    conn: tokio_rusqlite::Connection,
    actor: Arc<str>,
    busy_timeout: Duration,
  ) -> Result<Self> {
    let ddl = full_schema();
    conn
      .call(move |conn| {
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(&ddl)?;
        Ok(())
      })
      .await?;
    Ok(Self { conn, actor })
  }

  /// A handle on the same database that records `actor` as the user of
  /// every change it makes.
  pub fn with_actor(&self, actor: impl Into<Arc<str>>) -> Self {
    Self { conn: self.conn.clone(), actor: actor.into() }
  }

  pub fn actor(&self) -> &str { &self.actor }

  /// Run `work` as one unit of work: a single SQLite transaction that is
  /// committed if `work` succeeds and rolled back if it fails.
  pub async fn unit_of_work<T, F>(&self, work: F) -> Result<T>
  where
    F: FnOnce(&Session<'_>) -> Result<T> + Send + 'static,
    T: Send + 'static,
  {
    let actor = Arc::clone(&self.actor);
    self.conn.call(move |conn| Ok(run(conn, &actor, work))).await?
  }
}

fn run<T>(
  conn: &mut rusqlite::Connection,
  actor: &str,
  work: impl FnOnce(&Session<'_>) -> Result<T>,
) -> Result<T> {
  let tx = conn.transaction()?;
  let outcome = work(&Session::new(&tx, actor));
  match outcome {
    Ok(value) => {
      tx.commit()?;
      Ok(value)
    }
    Err(e) => {
      // Dropping the transaction rolls it back.
      tracing::debug!(error = %e, "unit of work rolled back");
      Err(e)
    }
  }
}

// ─── DataStore impl ──────────────────────────────────────────────────────────

impl DataStore for SqliteStore {
  type Error = Error;

  // ── Schemas ───────────────────────────────────────────────────────────────

  async fn create_schema(&self, input: NewSchema) -> Result<Schema> {
    self.unit_of_work(move |s| s.create_schema(input)).await
  }

  async fn get_schema(&self, id: i64) -> Result<Option<Schema>> {
    self.unit_of_work(move |s| s.get_schema(id)).await
  }

  async fn find_schema(&self, name: String, version: Option<NaiveDate>) -> Result<Option<Schema>> {
    self.unit_of_work(move |s| s.find_schema(&name, version)).await
  }

  async fn list_schemas(&self) -> Result<Vec<SchemaSummary>> {
    self.unit_of_work(|s| s.list_schemas()).await
  }

  async fn update_schema(&self, schema: Schema) -> Result<Schema> {
    self.unit_of_work(move |s| s.update_schema(schema)).await
  }

  async fn copy_schema(&self, id: i64) -> Result<Schema> {
    self.unit_of_work(move |s| s.copy_schema(id)).await
  }

  async fn publish_schema(&self, id: i64, on: NaiveDate) -> Result<Schema> {
    self.unit_of_work(move |s| s.publish_schema(id, on)).await
  }

  async fn retract_schema(&self, id: i64, on: NaiveDate) -> Result<Schema> {
    self.unit_of_work(move |s| s.retract_schema(id, on)).await
  }

  async fn delete_schema(&self, id: i64) -> Result<()> {
    self.unit_of_work(move |s| s.delete_schema(id)).await
  }

  // ── Attributes ────────────────────────────────────────────────────────────

  async fn add_attribute(
    &self,
    schema_id: i64,
    parent: Option<i64>,
    input: NewAttribute,
  ) -> Result<Attribute> {
    self.unit_of_work(move |s| s.add_attribute(schema_id, parent, input)).await
  }

  async fn update_attribute(&self, attribute: Attribute) -> Result<Attribute> {
    self.unit_of_work(move |s| s.update_attribute(attribute)).await
  }

  async fn delete_attribute(&self, id: i64) -> Result<()> {
    self.unit_of_work(move |s| s.delete_attribute(id)).await
  }

  async fn reparent_attribute(&self, id: i64, parent: Option<i64>) -> Result<Attribute> {
    self.unit_of_work(move |s| s.reparent_attribute(id, parent)).await
  }

  async fn reorder_attributes(&self, schema_id: i64, ids: Vec<i64>) -> Result<()> {
    self.unit_of_work(move |s| s.reorder_attributes(schema_id, &ids)).await
  }

  // ── Choices ───────────────────────────────────────────────────────────────

  async fn add_choice(&self, attribute_id: i64, input: NewChoice) -> Result<Choice> {
    self.unit_of_work(move |s| s.add_choice(attribute_id, input)).await
  }

  async fn update_choice(&self, choice: Choice) -> Result<Choice> {
    self.unit_of_work(move |s| s.update_choice(choice)).await
  }

  async fn delete_choice(&self, id: i64) -> Result<()> {
    self.unit_of_work(move |s| s.delete_choice(id)).await
  }

  async fn reorder_choices(&self, attribute_id: i64, ids: Vec<i64>) -> Result<()> {
    self.unit_of_work(move |s| s.reorder_choices(attribute_id, &ids)).await
  }

  // ── Entities ──────────────────────────────────────────────────────────────

  async fn create_entity(&self, input: NewEntity) -> Result<Entity> {
    self.unit_of_work(move |s| s.create_entity(input)).await
  }

  async fn get_entity(&self, id: i64) -> Result<Option<Entity>> {
    self.unit_of_work(move |s| s.get_entity(id)).await
  }

  async fn update_entity(&self, entity: Entity) -> Result<Entity> {
    self.unit_of_work(move |s| s.update_entity(entity)).await
  }

  async fn delete_entity(&self, id: i64) -> Result<()> {
    self.unit_of_work(move |s| s.delete_entity(id)).await
  }

  // ── Values ────────────────────────────────────────────────────────────────

  async fn get_value(&self, entity_id: i64, name: String) -> Result<Option<Value>> {
    self.unit_of_work(move |s| s.get_value(entity_id, &name)).await
  }

  async fn set_value(&self, entity_id: i64, name: String, value: Option<Value>) -> Result<()> {
    self.unit_of_work(move |s| s.set_value(entity_id, &name, value)).await
  }

  async fn delete_value(&self, entity_id: i64, name: String) -> Result<()> {
    self.unit_of_work(move |s| s.delete_value(entity_id, &name)).await
  }

  async fn entity_values(&self, entity_id: i64) -> Result<BTreeMap<String, Value>> {
    self.unit_of_work(move |s| s.entity_values(entity_id)).await
  }

  // ── Contexts ──────────────────────────────────────────────────────────────

  async fn attach(&self, entity_id: i64, key: ContextKey) -> Result<Context> {
    self.unit_of_work(move |s| s.attach(entity_id, key)).await
  }

  async fn detach(&self, entity_id: i64, key: ContextKey) -> Result<()> {
    self.unit_of_work(move |s| s.detach(entity_id, key)).await
  }

  async fn contexts_for(&self, key: ContextKey) -> Result<Vec<Context>> {
    self.unit_of_work(move |s| s.contexts_for(&key)).await
  }

  async fn entities_for(&self, key: ContextKey) -> Result<Vec<Entity>> {
    self.unit_of_work(move |s| s.entities_for(&key)).await
  }

  async fn entity_contexts(&self, entity_id: i64) -> Result<Vec<Context>> {
    self.unit_of_work(move |s| s.entity_contexts(entity_id)).await
  }

  // ── History ───────────────────────────────────────────────────────────────

  async fn history<T: Auditable + Send + 'static>(
    &self,
    table: AuditTable,
    id: i64,
  ) -> Result<Vec<Revision<T>>> {
    self.unit_of_work(move |s| s.history::<T>(table, id)).await
  }
}
