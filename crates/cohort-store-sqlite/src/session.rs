//! [`Session`]: one unit of work over one open SQLite transaction.
//!
//! All store operations are implemented synchronously on `Session`, spread
//! over the `metadata`, `entities` and `values` modules. [`crate::SqliteStore`]
//! opens a transaction on its connection thread, runs one operation (or a
//! caller-supplied batch) through a `Session`, and commits only on success.

use chrono::{DateTime, Utc};
use cohort_core::{
  audit::{AuditStamp, AuditTable, Auditable, Revision},
  schema::{Attribute, Choice, Schema},
};
use rusqlite::{Connection, OptionalExtension as _};

use crate::{
  AuditLog, Error, Result,
  encode::{RawAttribute, RawChoice, RawSchema},
};

/// A unit of work. Every change made through it, history rows included, is
/// committed or rolled back together by the caller that opened it.
pub struct Session<'c> {
  pub(crate) conn: &'c Connection,
  actor:           &'c str,
  at:              DateTime<Utc>,
}

impl<'c> Session<'c> {
  /// Wrap an open transaction. `actor` is stamped into audit columns and
  /// history rows; all of them share the session's start time.
  pub fn new(conn: &'c Connection, actor: &'c str) -> Self {
    Self { conn, actor, at: Utc::now() }
  }

  pub fn actor(&self) -> &str { self.actor }

  /// Audit columns for a row inserted in this session.
  pub(crate) fn stamp(&self) -> AuditStamp { AuditStamp::new(self.at, self.actor) }

  /// Bump the modification columns of a row updated in this session.
  pub(crate) fn touch(&self, stamp: &mut AuditStamp) { stamp.touch(self.at, self.actor) }

  pub(crate) fn audit<T: Auditable>(&self, table: AuditTable) -> AuditLog<'c, T> {
    AuditLog::new(self.conn, table, self.actor, self.at)
  }

  /// Every recorded revision of one row, oldest first.
  pub fn history<T: Auditable>(&self, table: AuditTable, id: i64) -> Result<Vec<Revision<T>>> {
    self.audit::<T>(table).history(id)
  }

  // ─── Loading ───────────────────────────────────────────────────────────────

  fn schema_row(&self, id: i64) -> Result<Option<Schema>> {
    let sql = format!("SELECT {} FROM schema WHERE id = ?1", RawSchema::COLUMNS);
    self
      .conn
      .query_row(&sql, rusqlite::params![id], RawSchema::from_row)
      .optional()?
      .map(RawSchema::into_schema)
      .transpose()
  }

  /// A schema version with every attribute and choice, or `None`.
  pub fn get_schema(&self, id: i64) -> Result<Option<Schema>> {
    let Some(mut schema) = self.schema_row(id)? else { return Ok(None) };

    let sql = format!(
      "SELECT {} FROM attribute WHERE schema_id = ?1 ORDER BY \"order\"",
      RawAttribute::COLUMNS
    );
    let mut stmt = self.conn.prepare(&sql)?;
    let raw = stmt
      .query_map(rusqlite::params![id], RawAttribute::from_row)?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    let mut attributes = raw
      .into_iter()
      .map(RawAttribute::into_attribute)
      .collect::<Result<Vec<_>>>()?;

    let sql = format!(
      "SELECT {} FROM choice
       WHERE attribute_id IN (SELECT id FROM attribute WHERE schema_id = ?1)
       ORDER BY attribute_id, \"order\"",
      RawChoice::COLUMNS
    );
    let mut stmt = self.conn.prepare(&sql)?;
    let choices = stmt
      .query_map(rusqlite::params![id], RawChoice::from_row)?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    for raw in choices {
      let choice = raw.into_choice()?;
      if let Some(attribute) = attributes.iter_mut().find(|a| a.id == choice.attribute_id) {
        attribute.choices.insert(choice.name.clone(), choice);
      }
    }

    schema.attributes = attributes.into_iter().map(|a| (a.name.clone(), a)).collect();
    Ok(Some(schema))
  }

  pub(crate) fn load_schema(&self, id: i64) -> Result<Schema> {
    self.get_schema(id)?.ok_or(Error::SchemaNotFound(id))
  }

  /// The schema version that currently holds attribute `id`.
  pub(crate) fn schema_of_attribute(&self, id: i64) -> Result<Schema> {
    let schema_id: i64 = self
      .conn
      .query_row(
        "SELECT schema_id FROM attribute WHERE id = ?1",
        rusqlite::params![id],
        |r| r.get(0),
      )
      .optional()?
      .ok_or_else(|| Error::AttributeNotFound(id.to_string()))?;
    self.load_schema(schema_id)
  }

  /// An attribute with its choices.
  pub(crate) fn load_attribute(&self, id: i64) -> Result<Attribute> {
    self
      .schema_of_attribute(id)?
      .attributes
      .into_values()
      .find(|a| a.id == id)
      .ok_or_else(|| Error::AttributeNotFound(id.to_string()))
  }

  pub(crate) fn load_choice(&self, id: i64) -> Result<Choice> {
    let sql = format!("SELECT {} FROM choice WHERE id = ?1", RawChoice::COLUMNS);
    self
      .conn
      .query_row(&sql, rusqlite::params![id], RawChoice::from_row)
      .optional()?
      .ok_or(Error::ChoiceNotFound(id))?
      .into_choice()
  }
}
