//! [`AuditLog`]: writes and reads the history table parallel to one live
//! table.
//!
//! Every insert, material update and delete of an [`Auditable`] record goes
//! through [`AuditLog::record`] on the same connection (and therefore in the
//! same transaction) as the change itself. A failed history write fails the
//! operation, which rolls the whole transaction back.

use std::marker::PhantomData;

use chrono::{DateTime, Utc};
use cohort_core::audit::{AuditAction, AuditTable, Auditable, Revision};
use rusqlite::{Connection, OptionalExtension as _};

use crate::{
  Result,
  encode::{decode_code, decode_dt, encode_dt},
};

/// History writer and reader for records of type `T` in `table`.
pub struct AuditLog<'c, T> {
  conn:    &'c Connection,
  table:   AuditTable,
  actor:   &'c str,
  at:      DateTime<Utc>,
  _record: PhantomData<fn() -> T>,
}

impl<'c, T: Auditable> AuditLog<'c, T> {
  pub fn new(conn: &'c Connection, table: AuditTable, actor: &'c str, at: DateTime<Utc>) -> Self {
    Self { conn, table, actor, at, _record: PhantomData }
  }

  /// The newest revision number and snapshot recorded for `id`.
  fn latest(&self, id: i64) -> Result<Option<(u32, serde_json::Value)>> {
    let sql = format!(
      "SELECT revision, snapshot FROM {} WHERE id = ?1 ORDER BY revision DESC LIMIT 1",
      self.table.history_name()
    );
    let row: Option<(u32, String)> = self
      .conn
      .query_row(&sql, rusqlite::params![id], |r| Ok((r.get(0)?, r.get(1)?)))
      .optional()?;
    row
      .map(|(revision, snapshot)| Ok((revision, serde_json::from_str(&snapshot)?)))
      .transpose()
  }

  /// Whether saving `record` would change anything recorded so far.
  pub fn is_material(&self, record: &T) -> Result<bool> {
    let snapshot = record.snapshot()?;
    Ok(match self.latest(record.audit_id())? {
      Some((_, previous)) => previous != snapshot,
      None => true,
    })
  }

  /// Append a snapshot of `record` as its next revision.
  ///
  /// An update that leaves the snapshot unchanged writes nothing and returns
  /// `None`. Inserts and deletes are always recorded.
  pub fn record(&self, action: AuditAction, record: &T) -> Result<Option<u32>> {
    let id = record.audit_id();
    let snapshot = record.snapshot()?;
    let latest = self.latest(id)?;

    if action == AuditAction::Update
      && let Some((_, previous)) = &latest
      && *previous == snapshot
    {
      return Ok(None);
    }

    let revision = latest.map_or(1, |(revision, _)| revision + 1);
    let sql = format!(
      "INSERT INTO {} (id, revision, operation, snapshot, recorded_at, recorded_by)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
      self.table.history_name()
    );
    let operation: &'static str = action.into();
    self.conn.execute(&sql, rusqlite::params![
      id,
      revision,
      operation,
      snapshot.to_string(),
      encode_dt(self.at),
      self.actor,
    ])?;

    tracing::debug!(
      table = self.table.history_name(),
      id,
      revision,
      %action,
      "history recorded"
    );
    Ok(Some(revision))
  }

  /// Every revision of `id`, oldest first.
  pub fn history(&self, id: i64) -> Result<Vec<Revision<T>>> {
    let sql = format!(
      "SELECT revision, operation, snapshot, recorded_at, recorded_by
       FROM {} WHERE id = ?1 ORDER BY revision",
      self.table.history_name()
    );
    let mut stmt = self.conn.prepare(&sql)?;
    let rows = stmt
      .query_map(rusqlite::params![id], |r| {
        Ok((
          r.get::<_, u32>(0)?,
          r.get::<_, String>(1)?,
          r.get::<_, String>(2)?,
          r.get::<_, String>(3)?,
          r.get::<_, String>(4)?,
        ))
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;

    rows
      .into_iter()
      .map(|(revision, operation, snapshot, recorded_at, recorded_by)| {
        Ok(Revision {
          id,
          revision,
          action: decode_code("operation", &operation)?,
          recorded_at: decode_dt(&recorded_at)?,
          recorded_by,
          data: serde_json::from_str(&snapshot)?,
        })
      })
      .collect()
  }
}
