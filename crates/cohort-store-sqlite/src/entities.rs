//! Entity and context operations.

use cohort_core::{
  audit::{AuditAction, AuditTable},
  context::{Context, ContextKey},
  entity::{Entity, NewEntity, check_bindable},
};
use rusqlite::OptionalExtension as _;

use crate::{
  Error, Result, Session,
  encode::{RawContext, RawEntity, encode_date, encode_dt},
};

impl Session<'_> {
  // ─── Entities ──────────────────────────────────────────────────────────────

  /// Create an entity bound to a currently published schema version.
  pub fn create_entity(&self, input: NewEntity) -> Result<Entity> {
    let schema = self.load_schema(input.schema_id)?;
    check_bindable(&schema)?;

    let audit = self.stamp();
    let state: Option<&'static str> = input.state.map(Into::into);
    self.conn.execute(
      "INSERT INTO entity (
         schema_id, state, not_done, collect_date,
         create_date, create_user, modify_date, modify_user
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
      rusqlite::params![
        input.schema_id,
        state,
        input.not_done,
        encode_date(input.collect_date),
        encode_dt(audit.create_date),
        audit.create_user,
        encode_dt(audit.modify_date),
        audit.modify_user,
      ],
    )?;
    let entity = Entity {
      id: self.conn.last_insert_rowid(),
      schema_id: input.schema_id,
      state: input.state,
      not_done: input.not_done,
      collect_date: input.collect_date,
      audit,
    };
    self.audit::<Entity>(AuditTable::Entity).record(AuditAction::Insert, &entity)?;
    tracing::info!(schema = %schema.name, entity_id = entity.id, "entity created");
    Ok(entity)
  }

  pub fn get_entity(&self, id: i64) -> Result<Option<Entity>> {
    let sql = format!("SELECT {} FROM entity WHERE id = ?1", RawEntity::COLUMNS);
    self
      .conn
      .query_row(&sql, rusqlite::params![id], RawEntity::from_row)
      .optional()?
      .map(RawEntity::into_entity)
      .transpose()
  }

  pub(crate) fn load_entity(&self, id: i64) -> Result<Entity> {
    self.get_entity(id)?.ok_or(Error::EntityNotFound(id))
  }

  /// Save state, `not_done` and collect date; the schema binding is fixed.
  pub fn update_entity(&self, input: Entity) -> Result<Entity> {
    let current = self.load_entity(input.id)?;
    let mut entity = Entity {
      state: input.state,
      not_done: input.not_done,
      collect_date: input.collect_date,
      ..current
    };

    let log = self.audit::<Entity>(AuditTable::Entity);
    if !log.is_material(&entity)? {
      return Ok(entity);
    }
    self.touch(&mut entity.audit);
    let state: Option<&'static str> = entity.state.map(Into::into);
    self.conn.execute(
      "UPDATE entity SET state = ?2, not_done = ?3, collect_date = ?4,
         modify_date = ?5, modify_user = ?6
       WHERE id = ?1",
      rusqlite::params![
        entity.id,
        state,
        entity.not_done,
        encode_date(entity.collect_date),
        encode_dt(entity.audit.modify_date),
        entity.audit.modify_user,
      ],
    )?;
    log.record(AuditAction::Update, &entity)?;
    Ok(entity)
  }

  /// Delete an entity with its values and contexts, all with history.
  pub fn delete_entity(&self, id: i64) -> Result<()> {
    let entity = self.load_entity(id)?;
    let values = self.delete_entity_values(id)?;
    let contexts = self.entity_contexts(id)?;
    for context in &contexts {
      self.delete_context_row(context)?;
    }
    self.audit::<Entity>(AuditTable::Entity).record(AuditAction::Delete, &entity)?;
    self.conn.execute("DELETE FROM entity WHERE id = ?1", rusqlite::params![id])?;
    tracing::info!(entity_id = id, values, contexts = contexts.len(), "entity deleted");
    Ok(())
  }

  // ─── Contexts ──────────────────────────────────────────────────────────────

  fn find_context(&self, entity_id: i64, key: &ContextKey) -> Result<Option<Context>> {
    let sql = format!(
      "SELECT {} FROM context WHERE entity_id = ?1 AND external = ?2 AND \"key\" = ?3",
      RawContext::COLUMNS
    );
    self
      .conn
      .query_row(&sql, rusqlite::params![entity_id, key.external, key.key], RawContext::from_row)
      .optional()?
      .map(RawContext::into_context)
      .transpose()
  }

  /// Link an entity to an outside aggregate. Attaching an existing link
  /// returns it unchanged.
  pub fn attach(&self, entity_id: i64, key: ContextKey) -> Result<Context> {
    self.load_entity(entity_id)?;
    if let Some(existing) = self.find_context(entity_id, &key)? {
      return Ok(existing);
    }

    let audit = self.stamp();
    self.conn.execute(
      "INSERT INTO context (
         entity_id, external, \"key\", create_date, create_user, modify_date, modify_user
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
      rusqlite::params![
        entity_id,
        key.external,
        key.key,
        encode_dt(audit.create_date),
        audit.create_user,
        encode_dt(audit.modify_date),
        audit.modify_user,
      ],
    )?;
    let context = Context {
      id: self.conn.last_insert_rowid(),
      entity_id,
      external: key.external,
      key: key.key,
      audit,
    };
    self.audit::<Context>(AuditTable::Context).record(AuditAction::Insert, &context)?;
    tracing::debug!(entity_id, external = %context.external, key = context.key, "context attached");
    Ok(context)
  }

  /// Remove a link; a missing link is not an error.
  pub fn detach(&self, entity_id: i64, key: ContextKey) -> Result<()> {
    if let Some(context) = self.find_context(entity_id, &key)? {
      self.delete_context_row(&context)?;
    }
    Ok(())
  }

  fn delete_context_row(&self, context: &Context) -> Result<()> {
    self.audit::<Context>(AuditTable::Context).record(AuditAction::Delete, context)?;
    self.conn.execute("DELETE FROM context WHERE id = ?1", rusqlite::params![context.id])?;
    Ok(())
  }

  fn query_contexts(&self, filter: &str, params: impl rusqlite::Params) -> Result<Vec<Context>> {
    let sql = format!("SELECT {} FROM context WHERE {filter} ORDER BY id", RawContext::COLUMNS);
    let mut stmt = self.conn.prepare(&sql)?;
    let raw = stmt
      .query_map(params, RawContext::from_row)?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    raw.into_iter().map(RawContext::into_context).collect()
  }

  /// Every context row pointing at one outside aggregate.
  pub fn contexts_for(&self, key: &ContextKey) -> Result<Vec<Context>> {
    self.query_contexts("external = ?1 AND \"key\" = ?2", rusqlite::params![
      key.external,
      key.key
    ])
  }

  /// Every entity attached to one outside aggregate, oldest first.
  pub fn entities_for(&self, key: &ContextKey) -> Result<Vec<Entity>> {
    let sql = format!(
      "SELECT {} FROM entity
       WHERE id IN (SELECT entity_id FROM context WHERE external = ?1 AND \"key\" = ?2)
       ORDER BY id",
      RawEntity::COLUMNS
    );
    let mut stmt = self.conn.prepare(&sql)?;
    let raw = stmt
      .query_map(rusqlite::params![key.external, key.key], RawEntity::from_row)?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    raw.into_iter().map(RawEntity::into_entity).collect()
  }

  pub fn entity_contexts(&self, entity_id: i64) -> Result<Vec<Context>> {
    self.query_contexts("entity_id = ?1", rusqlite::params![entity_id])
  }
}
