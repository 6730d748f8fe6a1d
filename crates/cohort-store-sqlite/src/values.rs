//! Value reads and writes, dispatched over the six value partitions.
//!
//! A scalar answer is one row, updated in place so it keeps its own history.
//! A collection answer is one row per element; writing it deletes every
//! existing row and inserts the new elements, all recorded in history.

use std::collections::BTreeMap;

use cohort_core::{
  audit::{AuditAction, AuditTable},
  constraint,
  entity::ValueRow,
  schema::{Attribute, Schema},
  value::{StoredValue, Value, ValuePartition},
};
use strum::IntoEnumIterator as _;

use crate::{
  Error, Result, Session,
  encode::{RawValue, encode_dt, encode_stored},
};

fn find_attribute<'s>(schema: &'s Schema, name: &str) -> Result<&'s Attribute> {
  schema
    .attribute(name)
    .or_else(|| schema.attribute_ignore_case(name))
    .ok_or_else(|| Error::AttributeNotFound(format!("{}.{name}", schema.name)))
}

/// Caller-facing value of the rows of one attribute; `None` when empty.
fn assemble(attribute: &Attribute, rows: Vec<ValueRow>) -> Result<Option<Value>> {
  if attribute.is_collection {
    if rows.is_empty() {
      return Ok(None);
    }
    let items = rows
      .into_iter()
      .map(|row| attribute.from_stored(row.value))
      .collect::<cohort_core::Result<Vec<_>>>()?;
    return Ok(Some(Value::Collection(items)));
  }
  match rows.into_iter().next() {
    Some(row) => Ok(Some(attribute.from_stored(row.value)?)),
    None => Ok(None),
  }
}

impl Session<'_> {
  /// The schema version an entity is bound to.
  fn entity_schema(&self, entity_id: i64) -> Result<Schema> {
    let entity = self.load_entity(entity_id)?;
    self.load_schema(entity.schema_id)
  }

  // ─── Reads ─────────────────────────────────────────────────────────────────

  /// Value rows of one partition for an entity, optionally one attribute,
  /// in insertion order.
  fn value_rows(
    &self,
    partition: ValuePartition,
    entity_id: i64,
    attribute_id: Option<i64>,
  ) -> Result<Vec<ValueRow>> {
    let sql = format!(
      "SELECT {} FROM {} WHERE entity_id = ?1 AND (?2 IS NULL OR attribute_id = ?2) ORDER BY id",
      RawValue::columns(partition),
      partition.table()
    );
    let mut stmt = self.conn.prepare(&sql)?;
    let raw = stmt
      .query_map(rusqlite::params![entity_id, attribute_id], |row| {
        RawValue::from_row(partition, row)
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    raw.into_iter().map(|r| r.into_value_row(partition)).collect()
  }

  /// One answer. Collections come back in insertion order.
  pub fn get_value(&self, entity_id: i64, name: &str) -> Result<Option<Value>> {
    let schema = self.entity_schema(entity_id)?;
    let attribute = find_attribute(&schema, name)?;
    let rows = self.value_rows(attribute.value_partition()?, entity_id, Some(attribute.id))?;
    assemble(attribute, rows)
  }

  /// Every populated answer of an entity, keyed by attribute name.
  pub fn entity_values(&self, entity_id: i64) -> Result<BTreeMap<String, Value>> {
    let schema = self.entity_schema(entity_id)?;

    let mut grouped: BTreeMap<i64, Vec<ValueRow>> = BTreeMap::new();
    for partition in ValuePartition::iter() {
      for row in self.value_rows(partition, entity_id, None)? {
        grouped.entry(row.attribute_id).or_default().push(row);
      }
    }

    let mut values = BTreeMap::new();
    for (attribute_id, rows) in grouped {
      let Some(attribute) = schema.attribute_by_id(attribute_id) else {
        tracing::warn!(entity_id, attribute_id, "value row outside the entity's schema");
        continue;
      };
      if let Some(value) = assemble(attribute, rows)? {
        values.insert(attribute.name.clone(), value);
      }
    }
    Ok(values)
  }

  /// How many value rows, across every entity, belong to `attribute`.
  pub(crate) fn attribute_value_count(&self, attribute: &Attribute) -> Result<i64> {
    let Some(partition) = attribute.partition() else { return Ok(0) };
    let sql = format!("SELECT COUNT(*) FROM {} WHERE attribute_id = ?1", partition.table());
    Ok(self.conn.query_row(&sql, rusqlite::params![attribute.id], |r| r.get(0))?)
  }

  // ─── Writes ────────────────────────────────────────────────────────────────

  /// Write one answer; `None` deletes it.
  ///
  /// Scalars are normalized, validated and resolved (choice codes to ids)
  /// before the row is written. Collection elements are normalized and
  /// resolved but not range- or pattern-checked.
  pub fn set_value(&self, entity_id: i64, name: &str, value: Option<Value>) -> Result<()> {
    let Some(value) = value else { return self.delete_value(entity_id, name) };
    let schema = self.entity_schema(entity_id)?;
    let attribute = find_attribute(&schema, name)?;
    let partition = attribute.value_partition()?;
    let existing = self.value_rows(partition, entity_id, Some(attribute.id))?;

    if attribute.is_collection {
      let items = match value {
        Value::Collection(items) => items,
        single => vec![single],
      };
      let stored = items
        .into_iter()
        .map(|item| {
          let item = attribute.normalize(item)?;
          attribute.to_stored(&schema.name, &item)
        })
        .collect::<cohort_core::Result<Vec<_>>>()?;

      for row in &existing {
        self.delete_value_row(row)?;
      }
      for item in &stored {
        self.insert_value(partition, entity_id, attribute.id, item)?;
      }
      tracing::debug!(
        entity_id,
        attribute = %attribute.name,
        replaced = existing.len(),
        written = stored.len(),
        "collection value written"
      );
      return Ok(());
    }

    let value = attribute.normalize(value)?;
    constraint::validate(&schema.name, attribute, Some(&value))?;
    let stored = attribute.to_stored(&schema.name, &value)?;

    let mut rows = existing.into_iter();
    match rows.next() {
      Some(mut row) => {
        self.update_value_row(&mut row, stored)?;
        // A scalar has at most one row; drop any strays.
        for stray in rows {
          self.delete_value_row(&stray)?;
        }
      }
      None => {
        self.insert_value(partition, entity_id, attribute.id, &stored)?;
      }
    }
    tracing::debug!(entity_id, attribute = %attribute.name, %value, "value written");
    Ok(())
  }

  /// Remove every row of one answer. Removing nothing is not an error.
  pub fn delete_value(&self, entity_id: i64, name: &str) -> Result<()> {
    let schema = self.entity_schema(entity_id)?;
    let attribute = find_attribute(&schema, name)?;
    let rows = self.value_rows(attribute.value_partition()?, entity_id, Some(attribute.id))?;
    for row in &rows {
      self.delete_value_row(row)?;
    }
    if !rows.is_empty() {
      tracing::debug!(entity_id, attribute = %attribute.name, rows = rows.len(), "value deleted");
    }
    Ok(())
  }

  /// Remove every value row of an entity; returns how many were removed.
  pub(crate) fn delete_entity_values(&self, entity_id: i64) -> Result<usize> {
    let mut removed = 0;
    for partition in ValuePartition::iter() {
      for row in self.value_rows(partition, entity_id, None)? {
        self.delete_value_row(&row)?;
        removed += 1;
      }
    }
    Ok(removed)
  }

  // ─── Rows ──────────────────────────────────────────────────────────────────

  fn insert_value(
    &self,
    partition: ValuePartition,
    entity_id: i64,
    attribute_id: i64,
    value: &StoredValue,
  ) -> Result<ValueRow> {
    let audit = self.stamp();
    let (file_name, mime_type) = match value {
      StoredValue::Blob(b) => (Some(b.file_name.as_str()), Some(b.mime_type.as_str())),
      _ => (None, None),
    };
    let sql = match partition {
      ValuePartition::Blob => format!(
        "INSERT INTO {} (
           entity_id, attribute_id, value, create_date, create_user, modify_date, modify_user,
           file_name, mime_type
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        partition.table()
      ),
      _ => format!(
        "INSERT INTO {} (
           entity_id, attribute_id, value, create_date, create_user, modify_date, modify_user
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        partition.table()
      ),
    };
    let create_date = encode_dt(audit.create_date);
    let modify_date = encode_dt(audit.modify_date);
    let column = encode_stored(value);
    let mut params: Vec<&dyn rusqlite::ToSql> = vec![
      &entity_id,
      &attribute_id,
      &column,
      &create_date,
      &audit.create_user,
      &modify_date,
      &audit.modify_user,
    ];
    if partition == ValuePartition::Blob {
      params.push(&file_name);
      params.push(&mime_type);
    }
    self.conn.execute(&sql, params.as_slice())?;

    let row = ValueRow {
      id: self.conn.last_insert_rowid(),
      entity_id,
      attribute_id,
      partition,
      value: value.clone(),
      audit,
    };
    self.audit::<ValueRow>(AuditTable::Value(partition)).record(AuditAction::Insert, &row)?;
    Ok(row)
  }

  fn update_value_row(&self, row: &mut ValueRow, value: StoredValue) -> Result<()> {
    if row.value == value {
      return Ok(());
    }
    row.value = value;
    self.touch(&mut row.audit);

    let column = encode_stored(&row.value);
    let modify_date = encode_dt(row.audit.modify_date);
    match &row.value {
      StoredValue::Blob(b) => {
        let sql = format!(
          "UPDATE {} SET value = ?2, file_name = ?3, mime_type = ?4, modify_date = ?5,
             modify_user = ?6
           WHERE id = ?1",
          row.partition.table()
        );
        self.conn.execute(&sql, rusqlite::params![
          row.id,
          column,
          b.file_name,
          b.mime_type,
          modify_date,
          row.audit.modify_user,
        ])?;
      }
      _ => {
        let sql = format!(
          "UPDATE {} SET value = ?2, modify_date = ?3, modify_user = ?4 WHERE id = ?1",
          row.partition.table()
        );
        self.conn.execute(&sql, rusqlite::params![
          row.id,
          column,
          modify_date,
          row.audit.modify_user
        ])?;
      }
    }
    self.audit::<ValueRow>(AuditTable::Value(row.partition)).record(AuditAction::Update, row)?;
    Ok(())
  }

  fn delete_value_row(&self, row: &ValueRow) -> Result<()> {
    self.audit::<ValueRow>(AuditTable::Value(row.partition)).record(AuditAction::Delete, row)?;
    let sql = format!("DELETE FROM {} WHERE id = ?1", row.partition.table());
    self.conn.execute(&sql, rusqlite::params![row.id])?;
    Ok(())
  }
}
