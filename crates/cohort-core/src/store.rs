//! The `DataStore` trait.
//!
//! The trait is implemented by storage backends (e.g. `cohort-store-sqlite`).
//! Form rendering, export and the domain modules that own entities depend on
//! this abstraction, not on any concrete backend.
//!
//! Each call is one unit of work: it either applies completely, history rows
//! included, or not at all.

use std::{collections::BTreeMap, future::Future};

use chrono::NaiveDate;

use crate::{
  audit::{AuditTable, Auditable, Revision},
  context::{Context, ContextKey},
  entity::{Entity, NewEntity},
  schema::{Attribute, Choice, NewAttribute, NewChoice, NewSchema, Schema, SchemaSummary},
  value::Value,
};

/// Abstraction over a versioned EAV store backend.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes.
pub trait DataStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Schemas ───────────────────────────────────────────────────────────

  /// Persist a new draft from a nested definition. Attribute order follows
  /// the pre-order of the input tree.
  fn create_schema(
    &self,
    input: NewSchema,
  ) -> impl Future<Output = Result<Schema, Self::Error>> + Send + '_;

  /// Load a schema version with all its attributes and choices.
  fn get_schema(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<Schema>, Self::Error>> + Send + '_;

  /// Look up a schema by name (case-insensitive). With a version, the one
  /// published on that date; without, the newest currently published one.
  fn find_schema(
    &self,
    name: String,
    version: Option<NaiveDate>,
  ) -> impl Future<Output = Result<Option<Schema>, Self::Error>> + Send + '_;

  /// One summary per schema name, across all versions.
  fn list_schemas(
    &self,
  ) -> impl Future<Output = Result<Vec<SchemaSummary>, Self::Error>> + Send + '_;

  /// Save header fields (name, title, description, storage, association
  /// flag, categories). Publish state changes go through
  /// [`publish_schema`](Self::publish_schema) and
  /// [`retract_schema`](Self::retract_schema).
  fn update_schema(
    &self,
    schema: Schema,
  ) -> impl Future<Output = Result<Schema, Self::Error>> + Send + '_;

  /// Deep-copy a schema version into a new draft.
  fn copy_schema(&self, id: i64) -> impl Future<Output = Result<Schema, Self::Error>> + Send + '_;

  fn publish_schema(
    &self,
    id: i64,
    on: NaiveDate,
  ) -> impl Future<Output = Result<Schema, Self::Error>> + Send + '_;

  /// Block new entities from `on`; existing entities stay readable.
  fn retract_schema(
    &self,
    id: i64,
    on: NaiveDate,
  ) -> impl Future<Output = Result<Schema, Self::Error>> + Send + '_;

  /// Delete a schema version and its metadata. Fails if entities exist.
  fn delete_schema(&self, id: i64) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Attributes ────────────────────────────────────────────────────────

  /// Add an attribute subtree under `parent` (or at the top level),
  /// numbered after every existing attribute of the schema.
  fn add_attribute(
    &self,
    schema_id: i64,
    parent: Option<i64>,
    input: NewAttribute,
  ) -> impl Future<Output = Result<Attribute, Self::Error>> + Send + '_;

  /// Save an edited attribute's own properties. Parent and order are
  /// changed through [`reparent_attribute`](Self::reparent_attribute) and
  /// [`reorder_attributes`](Self::reorder_attributes).
  fn update_attribute(
    &self,
    attribute: Attribute,
  ) -> impl Future<Output = Result<Attribute, Self::Error>> + Send + '_;

  /// Delete an attribute with its descendants and choices.
  fn delete_attribute(&self, id: i64) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Move an attribute under a new parent section; the whole subtree adopts
  /// the parent's schema.
  fn reparent_attribute(
    &self,
    id: i64,
    parent: Option<i64>,
  ) -> impl Future<Output = Result<Attribute, Self::Error>> + Send + '_;

  /// Renumber a schema's attributes. `ids` must list every attribute of the
  /// schema exactly once; position becomes the new order.
  fn reorder_attributes(
    &self,
    schema_id: i64,
    ids: Vec<i64>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Choices ───────────────────────────────────────────────────────────

  /// Append a choice after the attribute's existing choices.
  fn add_choice(
    &self,
    attribute_id: i64,
    input: NewChoice,
  ) -> impl Future<Output = Result<Choice, Self::Error>> + Send + '_;

  fn update_choice(
    &self,
    choice: Choice,
  ) -> impl Future<Output = Result<Choice, Self::Error>> + Send + '_;

  fn delete_choice(&self, id: i64) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Renumber an attribute's choices; `ids` must list all of them once.
  fn reorder_choices(
    &self,
    attribute_id: i64,
    ids: Vec<i64>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Entities ──────────────────────────────────────────────────────────

  /// Create an entity bound to a currently published schema.
  fn create_entity(
    &self,
    input: NewEntity,
  ) -> impl Future<Output = Result<Entity, Self::Error>> + Send + '_;

  fn get_entity(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<Entity>, Self::Error>> + Send + '_;

  /// Save state, `not_done` and collect date. The schema binding is fixed.
  fn update_entity(
    &self,
    entity: Entity,
  ) -> impl Future<Output = Result<Entity, Self::Error>> + Send + '_;

  /// Delete an entity together with its values and contexts.
  fn delete_entity(&self, id: i64) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Values ────────────────────────────────────────────────────────────

  /// Read one answer. Collections come back as [`Value::Collection`] in
  /// store order; absent answers as `None`.
  fn get_value(
    &self,
    entity_id: i64,
    name: String,
  ) -> impl Future<Output = Result<Option<Value>, Self::Error>> + Send + '_;

  /// Write one answer. `None` deletes it.
  fn set_value(
    &self,
    entity_id: i64,
    name: String,
    value: Option<Value>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Remove every value row of one attribute. Deleting nothing is not an
  /// error.
  fn delete_value(
    &self,
    entity_id: i64,
    name: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Every populated answer of an entity, keyed by attribute name.
  fn entity_values(
    &self,
    entity_id: i64,
  ) -> impl Future<Output = Result<BTreeMap<String, Value>, Self::Error>> + Send + '_;

  // ── Contexts ──────────────────────────────────────────────────────────

  fn attach(
    &self,
    entity_id: i64,
    key: ContextKey,
  ) -> impl Future<Output = Result<Context, Self::Error>> + Send + '_;

  /// Remove a link; detaching a missing link is not an error.
  fn detach(
    &self,
    entity_id: i64,
    key: ContextKey,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Reverse lookup: every context row for one outside aggregate.
  fn contexts_for(
    &self,
    key: ContextKey,
  ) -> impl Future<Output = Result<Vec<Context>, Self::Error>> + Send + '_;

  /// Reverse lookup: every entity attached to one outside aggregate.
  fn entities_for(
    &self,
    key: ContextKey,
  ) -> impl Future<Output = Result<Vec<Entity>, Self::Error>> + Send + '_;

  fn entity_contexts(
    &self,
    entity_id: i64,
  ) -> impl Future<Output = Result<Vec<Context>, Self::Error>> + Send + '_;

  // ── History ───────────────────────────────────────────────────────────

  /// Every recorded revision of one row, oldest first.
  fn history<T: Auditable + Send + 'static>(
    &self,
    table: AuditTable,
    id: i64,
  ) -> impl Future<Output = Result<Vec<Revision<T>>, Self::Error>> + Send + '_;
}
