//! Schema, attribute and choice operations.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;
use cohort_core::{
  Error as CoreError,
  audit::{AuditAction, AuditTable},
  context::STRATUM,
  naming,
  schema::{
    Attribute, AttributeType, Choice, NewAttribute, NewChoice, NewSchema, Schema, SchemaStatus,
    SchemaSummary,
  },
};
use rusqlite::OptionalExtension as _;

use crate::{
  Error, Result, Session,
  encode::{decode_date, encode_categories, encode_date, encode_dt},
};

/// Reorders first move every sibling to `-1 - order`, which can never collide
/// with a final position.
const PARK: &str = "\"order\" = -1 - \"order\"";

fn lifecycle(schema: &Schema, reason: impl Into<String>) -> Error {
  CoreError::Lifecycle { schema: schema.name.clone(), reason: reason.into() }.into()
}

fn duplicate_name(schema: &Schema, name: &str) -> Error {
  CoreError::NameValidation {
    name:   name.to_owned(),
    reason: format!("schema {:?} already has an attribute of that name", schema.name),
  }
  .into()
}

/// Check that `ids` lists exactly the members of `current`.
fn check_complete(scope: String, current: &HashSet<i64>, ids: &[i64]) -> Result<()> {
  let mut seen = HashSet::with_capacity(ids.len());
  for id in ids {
    if !current.contains(id) {
      return Err(Error::IncompleteOrder { scope, reason: format!("{id} is not a member") });
    }
    if !seen.insert(*id) {
      return Err(Error::IncompleteOrder { scope, reason: format!("{id} is listed twice") });
    }
  }
  if seen.len() != current.len() {
    let missing = current.len() - seen.len();
    return Err(Error::IncompleteOrder { scope, reason: format!("{missing} members missing") });
  }
  Ok(())
}

impl Session<'_> {
  // ─── Schemas ───────────────────────────────────────────────────────────────

  /// Persist a new draft; attributes are numbered in input pre-order.
  pub fn create_schema(&self, input: NewSchema) -> Result<Schema> {
    input.validate()?;

    let audit = self.stamp();
    let storage: &'static str = input.storage.into();
    self.conn.execute(
      "INSERT INTO schema (
         name, title, description, storage, is_association, categories,
         create_date, create_user, modify_date, modify_user
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
      rusqlite::params![
        input.name,
        input.title,
        input.description,
        storage,
        input.is_association,
        encode_categories(&input.categories)?,
        encode_dt(audit.create_date),
        audit.create_user,
        encode_dt(audit.modify_date),
        audit.modify_user,
      ],
    )?;
    let schema = Schema {
      id: self.conn.last_insert_rowid(),
      name: input.name,
      title: input.title,
      description: input.description,
      storage: input.storage,
      publish_date: None,
      retract_date: None,
      is_association: input.is_association,
      categories: input.categories,
      attributes: BTreeMap::new(),
      audit,
    };
    self.audit::<Schema>(AuditTable::Schema).record(AuditAction::Insert, &schema)?;

    let mut order = 0;
    for attribute in &input.attributes {
      self.insert_tree(schema.id, None, attribute, &mut order)?;
    }

    tracing::info!(schema = %schema.name, id = schema.id, attributes = order, "schema created");
    self.load_schema(schema.id)
  }

  /// By name, case-insensitively. With a version, the one published on that
  /// date; otherwise the newest published version that is not retracted.
  pub fn find_schema(&self, name: &str, version: Option<NaiveDate>) -> Result<Option<Schema>> {
    let id: Option<i64> = match version {
      Some(date) => self
        .conn
        .query_row(
          "SELECT id FROM schema WHERE name = ?1 COLLATE NOCASE AND publish_date = ?2",
          rusqlite::params![name, encode_date(date)],
          |r| r.get(0),
        )
        .optional()?,
      None => self
        .conn
        .query_row(
          "SELECT id FROM schema
           WHERE name = ?1 COLLATE NOCASE
             AND publish_date IS NOT NULL AND retract_date IS NULL
           ORDER BY publish_date DESC LIMIT 1",
          rusqlite::params![name],
          |r| r.get(0),
        )
        .optional()?,
    };
    id.map(|id| self.load_schema(id)).transpose()
  }

  /// One summary per schema name, across every version.
  pub fn list_schemas(&self) -> Result<Vec<SchemaSummary>> {
    let mut stmt = self.conn.prepare(
      "SELECT s.name, s.title, s.publish_date,
         EXISTS (SELECT 1 FROM attribute a WHERE a.schema_id = s.id AND a.is_private),
         EXISTS (SELECT 1 FROM entity e JOIN context c ON c.entity_id = e.id
                 WHERE e.schema_id = s.id AND c.external = ?1)
       FROM schema s
       ORDER BY s.name COLLATE NOCASE, s.id",
    )?;
    let rows = stmt
      .query_map(rusqlite::params![STRATUM], |r| {
        Ok((
          r.get::<_, String>(0)?,
          r.get::<_, String>(1)?,
          r.get::<_, Option<String>>(2)?,
          r.get::<_, bool>(3)?,
          r.get::<_, bool>(4)?,
        ))
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;

    // Each summary is named after its newest published version, or its newest
    // draft while nothing has been published.
    let mut summaries: Vec<(SchemaSummary, Option<NaiveDate>)> = Vec::new();
    for (name, title, publish_date, has_private, has_rand) in rows {
      if !summaries.last().is_some_and(|(last, _)| last.name.eq_ignore_ascii_case(&name)) {
        summaries.push((
          SchemaSummary {
            name:        name.clone(),
            title:       title.clone(),
            has_private: false,
            has_rand:    false,
            versions:    Vec::new(),
          },
          None,
        ));
      }
      let Some((summary, named_by)) = summaries.last_mut() else { continue };
      let publish_date = publish_date.as_deref().map(decode_date).transpose()?;
      let names = match (publish_date, *named_by) {
        (Some(date), Some(current)) => date >= current,
        (Some(_), None) => true,
        (None, current) => current.is_none(),
      };
      if names {
        summary.name = name;
        summary.title = title;
        *named_by = publish_date;
      }
      summary.has_private |= has_private;
      summary.has_rand |= has_rand;
      summary.versions.extend(publish_date);
    }
    let mut summaries: Vec<SchemaSummary> =
      summaries.into_iter().map(|(summary, _)| summary).collect();
    for summary in &mut summaries {
      summary.versions.sort();
    }
    Ok(summaries)
  }

  /// Save header fields. A published version keeps its name.
  pub fn update_schema(&self, input: Schema) -> Result<Schema> {
    let mut schema = self.load_schema(input.id)?;
    naming::validate_schema_name(&input.name)?;
    if schema.status() != SchemaStatus::Draft && input.name != schema.name {
      return Err(lifecycle(&schema, "a published schema cannot be renamed"));
    }

    schema.name = input.name;
    schema.title = input.title;
    schema.description = input.description;
    schema.storage = input.storage;
    schema.is_association = input.is_association;
    schema.categories = input.categories;
    self.save_schema(&mut schema)?;
    Ok(schema)
  }

  /// Deep-copy a version into a new draft of the same name.
  pub fn copy_schema(&self, id: i64) -> Result<Schema> {
    let source = self.load_schema(id)?;
    let copy = self.create_schema(source.to_draft())?;
    tracing::info!(schema = %copy.name, from = id, id = copy.id, "schema copied to draft");
    Ok(copy)
  }

  pub fn publish_schema(&self, id: i64, on: NaiveDate) -> Result<Schema> {
    let mut schema = self.load_schema(id)?;
    if let Some(published) = schema.publish_date {
      return Err(lifecycle(&schema, format!("already published on {published}")));
    }
    schema.publish_date = Some(on);
    self.save_schema(&mut schema)?;
    tracing::info!(schema = %schema.name, id, version = %on, "schema published");
    Ok(schema)
  }

  pub fn retract_schema(&self, id: i64, on: NaiveDate) -> Result<Schema> {
    let mut schema = self.load_schema(id)?;
    match (schema.publish_date, schema.retract_date) {
      (None, _) => return Err(lifecycle(&schema, "a draft cannot be retracted")),
      (Some(_), Some(retracted)) => {
        return Err(lifecycle(&schema, format!("already retracted on {retracted}")));
      }
      (Some(published), None) if on < published => {
        return Err(lifecycle(&schema, format!("retract date {on} precedes {published}")));
      }
      _ => {}
    }
    schema.retract_date = Some(on);
    self.save_schema(&mut schema)?;
    tracing::info!(schema = %schema.name, id, on = %on, "schema retracted");
    Ok(schema)
  }

  /// Delete a version with its attributes and choices. Refused while any
  /// entity is bound to it.
  pub fn delete_schema(&self, id: i64) -> Result<()> {
    let schema = self.load_schema(id)?;
    let entities: i64 = self.conn.query_row(
      "SELECT COUNT(*) FROM entity WHERE schema_id = ?1",
      rusqlite::params![id],
      |r| r.get(0),
    )?;
    if entities > 0 {
      return Err(lifecycle(&schema, format!("{entities} entities are bound to this version")));
    }

    let doomed: Vec<&Attribute> = schema.iterlist().collect();
    for attribute in doomed.into_iter().rev() {
      self.delete_attribute_row(attribute)?;
    }
    self.audit::<Schema>(AuditTable::Schema).record(AuditAction::Delete, &schema)?;
    self.conn.execute("DELETE FROM schema WHERE id = ?1", rusqlite::params![id])?;
    tracing::info!(schema = %schema.name, id, "schema deleted");
    Ok(())
  }

  fn save_schema(&self, schema: &mut Schema) -> Result<bool> {
    let log = self.audit::<Schema>(AuditTable::Schema);
    if !log.is_material(schema)? {
      return Ok(false);
    }
    self.touch(&mut schema.audit);
    let storage: &'static str = schema.storage.into();
    self.conn.execute(
      "UPDATE schema SET
         name = ?2, title = ?3, description = ?4, storage = ?5, publish_date = ?6,
         retract_date = ?7, is_association = ?8, categories = ?9,
         modify_date = ?10, modify_user = ?11
       WHERE id = ?1",
      rusqlite::params![
        schema.id,
        schema.name,
        schema.title,
        schema.description,
        storage,
        schema.publish_date.map(encode_date),
        schema.retract_date.map(encode_date),
        schema.is_association,
        encode_categories(&schema.categories)?,
        encode_dt(schema.audit.modify_date),
        schema.audit.modify_user,
      ],
    )?;
    log.record(AuditAction::Update, schema)?;
    Ok(true)
  }

  // ─── Attributes ────────────────────────────────────────────────────────────

  fn next_attribute_order(&self, schema_id: i64) -> Result<i64> {
    Ok(self.conn.query_row(
      "SELECT COALESCE(MAX(\"order\") + 1, 0) FROM attribute WHERE schema_id = ?1",
      rusqlite::params![schema_id],
      |r| r.get(0),
    )?)
  }

  /// Add a subtree under `parent`, numbered after the schema's existing
  /// attributes.
  pub fn add_attribute(
    &self,
    schema_id: i64,
    parent: Option<i64>,
    input: NewAttribute,
  ) -> Result<Attribute> {
    let schema = self.load_schema(schema_id)?;
    input.validate()?;

    let mut seen = HashSet::new();
    for new in input.iterlist() {
      if schema.attribute_ignore_case(&new.name).is_some()
        || !seen.insert(new.name.to_ascii_lowercase())
      {
        return Err(duplicate_name(&schema, &new.name));
      }
    }
    if let Some(parent_id) = parent {
      match schema.attribute_by_id(parent_id) {
        Some(p) if p.is_section() => {}
        _ => {
          return Err(
            CoreError::AttributeDefinition {
              attribute: input.name.clone(),
              reason:    format!("parent {parent_id} is not a section of {:?}", schema.name),
            }
            .into(),
          );
        }
      }
    }

    let mut order = self.next_attribute_order(schema_id)?;
    let id = self.insert_tree(schema_id, parent, &input, &mut order)?;
    if parent.is_some() {
      self.relayout(&[&self.load_schema(schema_id)?])?;
    }
    self.load_attribute(id)
  }

  /// Insert `input`, its choices and its children in pre-order; returns the
  /// new attribute's id.
  fn insert_tree(
    &self,
    schema_id: i64,
    parent: Option<i64>,
    input: &NewAttribute,
    order: &mut i64,
  ) -> Result<i64> {
    let mut attribute = Attribute {
      id: 0,
      schema_id,
      parent_attribute_id: parent,
      name: input.name.clone(),
      title: input.title.clone(),
      description: input.description.clone(),
      kind: input.kind,
      is_collection: input.is_collection,
      is_required: input.is_required,
      is_private: input.is_private,
      is_readonly: input.is_readonly,
      is_system: input.is_system,
      is_shuffled: input.is_shuffled,
      widget: input.widget,
      value_min: input.value_min,
      value_max: input.value_max,
      collection_min: input.collection_min,
      collection_max: input.collection_max,
      pattern: input.pattern.clone(),
      decimal_places: input.decimal_places,
      order: *order,
      choices: BTreeMap::new(),
      audit: self.stamp(),
    };
    *order += 1;

    let kind: &'static str = attribute.kind.into();
    let widget: Option<&'static str> = attribute.widget.map(Into::into);
    self.conn.execute(
      "INSERT INTO attribute (
         schema_id, parent_attribute_id, name, title, description, type,
         is_collection, is_required, is_private, is_readonly, is_system, is_shuffled,
         widget, value_min, value_max, collection_min, collection_max, pattern,
         decimal_places, \"order\", create_date, create_user, modify_date, modify_user
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                 ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24)",
      rusqlite::params![
        attribute.schema_id,
        attribute.parent_attribute_id,
        attribute.name,
        attribute.title,
        attribute.description,
        kind,
        attribute.is_collection,
        attribute.is_required,
        attribute.is_private,
        attribute.is_readonly,
        attribute.is_system,
        attribute.is_shuffled,
        widget,
        attribute.value_min,
        attribute.value_max,
        attribute.collection_min,
        attribute.collection_max,
        attribute.pattern,
        attribute.decimal_places,
        attribute.order,
        encode_dt(attribute.audit.create_date),
        attribute.audit.create_user,
        encode_dt(attribute.audit.modify_date),
        attribute.audit.modify_user,
      ],
    )?;
    attribute.id = self.conn.last_insert_rowid();
    self.audit::<Attribute>(AuditTable::Attribute).record(AuditAction::Insert, &attribute)?;

    for (position, choice) in input.choices.iter().enumerate() {
      self.insert_choice(attribute.id, choice, position as i64)?;
    }
    for child in &input.children {
      self.insert_tree(schema_id, Some(attribute.id), child, order)?;
    }
    Ok(attribute.id)
  }

  /// Save an attribute's own properties; parent, order and choices are kept.
  pub fn update_attribute(&self, input: Attribute) -> Result<Attribute> {
    input.validate()?;
    let schema = self.schema_of_attribute(input.id)?;
    let mut attribute = schema
      .attribute_by_id(input.id)
      .cloned()
      .ok_or_else(|| Error::AttributeNotFound(input.id.to_string()))?;

    if let Some(other) = schema.attribute_ignore_case(&input.name)
      && other.id != input.id
    {
      return Err(duplicate_name(&schema, &input.name));
    }
    if (input.partition() != attribute.partition()
      || input.is_collection != attribute.is_collection)
      && self.attribute_value_count(&attribute)? > 0
    {
      return Err(
        CoreError::AttributeDefinition {
          attribute: input.name,
          reason:    "stored values pin its type and collection mode".into(),
        }
        .into(),
      );
    }
    if input.kind != AttributeType::Choice && !attribute.choices.is_empty() {
      return Err(
        CoreError::AttributeDefinition {
          attribute: input.name,
          reason:    "remove its choices before changing the type".into(),
        }
        .into(),
      );
    }

    attribute = Attribute {
      id: attribute.id,
      schema_id: attribute.schema_id,
      parent_attribute_id: attribute.parent_attribute_id,
      order: attribute.order,
      choices: attribute.choices,
      audit: attribute.audit,
      ..input
    };
    self.save_attribute(&mut attribute)?;
    Ok(attribute)
  }

  /// Delete an attribute, its descendants and all their choices.
  pub fn delete_attribute(&self, id: i64) -> Result<()> {
    let schema = self.schema_of_attribute(id)?;
    let mut doomed: Vec<&Attribute> = schema.attribute_by_id(id).into_iter().collect();
    doomed.extend(schema.descendants_of(id));
    for attribute in doomed.into_iter().rev() {
      self.delete_attribute_row(attribute)?;
    }
    self.relayout(&[&self.load_schema(schema.id)?])?;
    tracing::debug!(schema = %schema.name, id, "attribute subtree deleted");
    Ok(())
  }

  /// Move `id` under the section `parent` (or to the top level of its own
  /// schema), as the last of its new siblings. A move into another schema
  /// takes the whole subtree along. Every affected schema is renumbered so
  /// `order` stays the pre-order position.
  pub fn reparent_attribute(&self, id: i64, parent: Option<i64>) -> Result<Attribute> {
    let source = self.schema_of_attribute(id)?;
    let target = match parent {
      Some(parent_id) => self.schema_of_attribute(parent_id)?,
      None => source.clone(),
    };
    let plan = source.plan_reparent(id, &target, parent)?;

    let mut source_after = source.clone();
    if plan.schema_id == source.id {
      let last = source.attributes.values().map(|a| a.order).max().unwrap_or(0);
      let moved = source_after.attributes.values_mut().find(|a| a.id == plan.attribute_id);
      if let Some(moved) = moved {
        moved.parent_attribute_id = plan.parent_attribute_id;
        moved.order = last + 1;
      }
      self.relayout(&[&source_after])?;
    } else {
      let mut target_after = target.clone();
      let last = target.attributes.values().map(|a| a.order).max().unwrap_or(0);
      source_after.attributes.retain(|_, a| !plan.subtree.contains(&a.id));
      for moved in plan.subtree.iter().filter_map(|m| source.attribute_by_id(*m)) {
        let mut moved = moved.clone();
        moved.schema_id = plan.schema_id;
        if moved.id == plan.attribute_id {
          moved.parent_attribute_id = plan.parent_attribute_id;
          moved.order = last + 1;
        }
        target_after.attributes.insert(moved.name.clone(), moved);
      }
      self.relayout(&[&source_after, &target_after])?;
    }

    tracing::debug!(
      attribute = id,
      schema_id = plan.schema_id,
      moved = plan.subtree.len(),
      "attribute reparented"
    );
    self.load_attribute(id)
  }

  /// Renumber a schema's attributes. `ids` must list each attribute exactly
  /// once, in an order that is a pre-order walk of the tree.
  pub fn reorder_attributes(&self, schema_id: i64, ids: &[i64]) -> Result<()> {
    let schema = self.load_schema(schema_id)?;
    let scope = format!("schema {:?}", schema.name);
    let current: HashSet<i64> = schema.attributes.values().map(|a| a.id).collect();
    check_complete(scope.clone(), &current, ids)?;

    let positions: HashMap<i64, i64> =
      ids.iter().enumerate().map(|(position, id)| (*id, position as i64)).collect();
    let mut laid_out = schema.clone();
    for attribute in laid_out.attributes.values_mut() {
      if let Some(position) = positions.get(&attribute.id) {
        attribute.order = *position;
      }
    }
    if !laid_out.iterlist().map(|a| a.id).eq(ids.iter().copied()) {
      return Err(Error::IncompleteOrder {
        scope,
        reason: "sections must directly precede their descendants".into(),
      });
    }

    let changed = self.relayout(&[&laid_out])?;
    tracing::debug!(schema = %schema.name, changed, "attributes renumbered");
    Ok(())
  }

  /// Write `schemas` back with every attribute's `order` set to its position
  /// in `iterlist()`. All rows of those schemas are parked first; history is
  /// recorded only for attributes whose state changed. Returns that count.
  fn relayout(&self, schemas: &[&Schema]) -> Result<usize> {
    for schema in schemas {
      self.conn.execute(
        &format!("UPDATE attribute SET {PARK} WHERE schema_id = ?1"),
        rusqlite::params![schema.id],
      )?;
    }
    let mut changed = 0;
    for schema in schemas {
      for (position, attribute) in schema.iterlist().enumerate() {
        let mut attribute = attribute.clone();
        attribute.order = position as i64;
        if self.save_attribute(&mut attribute)? {
          changed += 1;
        } else {
          self.conn.execute(
            "UPDATE attribute SET \"order\" = ?2 WHERE id = ?1",
            rusqlite::params![attribute.id, attribute.order],
          )?;
        }
      }
    }
    Ok(changed)
  }

  fn save_attribute(&self, attribute: &mut Attribute) -> Result<bool> {
    let log = self.audit::<Attribute>(AuditTable::Attribute);
    if !log.is_material(attribute)? {
      return Ok(false);
    }
    self.touch(&mut attribute.audit);
    let kind: &'static str = attribute.kind.into();
    let widget: Option<&'static str> = attribute.widget.map(Into::into);
    self.conn.execute(
      "UPDATE attribute SET
         schema_id = ?2, parent_attribute_id = ?3, name = ?4, title = ?5,
         description = ?6, type = ?7, is_collection = ?8, is_required = ?9,
         is_private = ?10, is_readonly = ?11, is_system = ?12, is_shuffled = ?13,
         widget = ?14, value_min = ?15, value_max = ?16, collection_min = ?17,
         collection_max = ?18, pattern = ?19, decimal_places = ?20, \"order\" = ?21,
         modify_date = ?22, modify_user = ?23
       WHERE id = ?1",
      rusqlite::params![
        attribute.id,
        attribute.schema_id,
        attribute.parent_attribute_id,
        attribute.name,
        attribute.title,
        attribute.description,
        kind,
        attribute.is_collection,
        attribute.is_required,
        attribute.is_private,
        attribute.is_readonly,
        attribute.is_system,
        attribute.is_shuffled,
        widget,
        attribute.value_min,
        attribute.value_max,
        attribute.collection_min,
        attribute.collection_max,
        attribute.pattern,
        attribute.decimal_places,
        attribute.order,
        encode_dt(attribute.audit.modify_date),
        attribute.audit.modify_user,
      ],
    )?;
    log.record(AuditAction::Update, attribute)?;
    Ok(true)
  }

  /// Delete one attribute row and its choices, with history.
  fn delete_attribute_row(&self, attribute: &Attribute) -> Result<()> {
    for choice in attribute.iterchoices() {
      self.delete_choice_row(choice)?;
    }
    self.audit::<Attribute>(AuditTable::Attribute).record(AuditAction::Delete, attribute)?;
    self.conn.execute("DELETE FROM attribute WHERE id = ?1", rusqlite::params![attribute.id])?;
    Ok(())
  }

  // ─── Choices ───────────────────────────────────────────────────────────────

  fn insert_choice(&self, attribute_id: i64, input: &NewChoice, order: i64) -> Result<Choice> {
    let choice = Choice {
      id: 0,
      attribute_id,
      name: input.name.clone(),
      title: input.title.clone(),
      order,
      audit: self.stamp(),
    };
    self.conn.execute(
      "INSERT INTO choice (
         attribute_id, name, title, \"order\",
         create_date, create_user, modify_date, modify_user
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
      rusqlite::params![
        choice.attribute_id,
        choice.name,
        choice.title,
        choice.order,
        encode_dt(choice.audit.create_date),
        choice.audit.create_user,
        encode_dt(choice.audit.modify_date),
        choice.audit.modify_user,
      ],
    )?;
    let choice = Choice { id: self.conn.last_insert_rowid(), ..choice };
    self.audit::<Choice>(AuditTable::Choice).record(AuditAction::Insert, &choice)?;
    Ok(choice)
  }

  /// Append a choice after the attribute's existing ones.
  pub fn add_choice(&self, attribute_id: i64, input: NewChoice) -> Result<Choice> {
    let attribute = self.load_attribute(attribute_id)?;
    if attribute.kind != AttributeType::Choice {
      return Err(
        CoreError::AttributeDefinition {
          attribute: attribute.name,
          reason:    "only choice attributes may have choices".into(),
        }
        .into(),
      );
    }
    naming::validate_choice_name(&input.name)?;
    if attribute.choices.contains_key(&input.name) {
      return Err(
        CoreError::NameValidation {
          name:   input.name,
          reason: format!("attribute {:?} already has that choice", attribute.name),
        }
        .into(),
      );
    }
    let order = attribute.iterchoices().map(|c| c.order + 1).max().unwrap_or(0);
    self.insert_choice(attribute_id, &input, order)
  }

  /// Save a choice's code and title.
  pub fn update_choice(&self, input: Choice) -> Result<Choice> {
    naming::validate_choice_name(&input.name)?;
    let current = self.load_choice(input.id)?;
    let mut choice = Choice { name: input.name, title: input.title, ..current };

    let log = self.audit::<Choice>(AuditTable::Choice);
    if log.is_material(&choice)? {
      self.touch(&mut choice.audit);
      self.write_choice(&choice)?;
      log.record(AuditAction::Update, &choice)?;
    }
    Ok(choice)
  }

  pub fn delete_choice(&self, id: i64) -> Result<()> {
    let choice = self.load_choice(id)?;
    self.delete_choice_row(&choice)
  }

  /// Renumber an attribute's choices; `ids` must list each exactly once.
  pub fn reorder_choices(&self, attribute_id: i64, ids: &[i64]) -> Result<()> {
    let attribute = self.load_attribute(attribute_id)?;
    let current: HashSet<i64> = attribute.choices.values().map(|c| c.id).collect();
    check_complete(format!("attribute {:?}", attribute.name), &current, ids)?;

    self.conn.execute(
      &format!("UPDATE choice SET {PARK} WHERE attribute_id = ?1"),
      rusqlite::params![attribute_id],
    )?;
    let log = self.audit::<Choice>(AuditTable::Choice);
    let mut changed = 0;
    for (position, id) in ids.iter().enumerate() {
      let position = position as i64;
      self.conn.execute(
        "UPDATE choice SET \"order\" = ?2 WHERE id = ?1",
        rusqlite::params![id, position],
      )?;
      if let Some(current) = attribute.choice_by_id(*id)
        && current.order != position
      {
        let mut choice = current.clone();
        choice.order = position;
        self.touch(&mut choice.audit);
        self.write_choice(&choice)?;
        log.record(AuditAction::Update, &choice)?;
        changed += 1;
      }
    }
    tracing::debug!(attribute = %attribute.name, changed, "choices renumbered");
    Ok(())
  }

  fn write_choice(&self, choice: &Choice) -> Result<()> {
    self.conn.execute(
      "UPDATE choice SET name = ?2, title = ?3, \"order\" = ?4, modify_date = ?5, modify_user = ?6
       WHERE id = ?1",
      rusqlite::params![
        choice.id,
        choice.name,
        choice.title,
        choice.order,
        encode_dt(choice.audit.modify_date),
        choice.audit.modify_user,
      ],
    )?;
    Ok(())
  }

  fn delete_choice_row(&self, choice: &Choice) -> Result<()> {
    self.audit::<Choice>(AuditTable::Choice).record(AuditAction::Delete, choice)?;
    self.conn.execute("DELETE FROM choice WHERE id = ?1", rusqlite::params![choice.id])?;
    Ok(())
  }
}
