//! Encoding and decoding helpers between the domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Audit timestamps are RFC 3339 strings, dates are `YYYY-MM-DD`, datetimes
//! ISO 8601 without an offset. Decimals are stored as text so their scale
//! survives. Enumerations use their lowercase codes; categories are a JSON
//! array.

use std::{collections::BTreeSet, str::FromStr};

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use cohort_core::{
  audit::AuditStamp,
  context::Context,
  entity::{Entity, ValueRow},
  schema::{Attribute, Choice, Schema},
  value::{BlobInfo, StoredValue, ValuePartition},
};
use rusqlite::{Row, types::Value as SqlValue};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── NaiveDate / NaiveDateTime ───────────────────────────────────────────────

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

pub fn encode_date(d: NaiveDate) -> String { d.format(DATE_FORMAT).to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

pub fn encode_datetime(dt: NaiveDateTime) -> String { dt.format(DATETIME_FORMAT).to_string() }

pub fn decode_datetime(s: &str) -> Result<NaiveDateTime> {
  NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── Decimal ─────────────────────────────────────────────────────────────────

pub fn encode_decimal(n: &BigDecimal) -> String { n.to_string() }

pub fn decode_decimal(s: &str) -> Result<BigDecimal> { Ok(BigDecimal::from_str(s)?) }

// ─── Codes ───────────────────────────────────────────────────────────────────

/// Parse a strum-coded enumeration column.
pub fn decode_code<T: FromStr>(column: &'static str, s: &str) -> Result<T> {
  s.parse()
    .map_err(|_| Error::UnknownCode { column, value: s.to_owned() })
}

// ─── Categories ──────────────────────────────────────────────────────────────

pub fn encode_categories(categories: &BTreeSet<String>) -> Result<String> {
  Ok(serde_json::to_string(categories)?)
}

pub fn decode_categories(s: &str) -> Result<BTreeSet<String>> { Ok(serde_json::from_str(s)?) }

// ─── Stored values ───────────────────────────────────────────────────────────

/// The `value` column of a value partition.
pub fn encode_stored(value: &StoredValue) -> SqlValue {
  match value {
    StoredValue::Text(s) => SqlValue::Text(s.clone()),
    StoredValue::Number(n) => SqlValue::Text(encode_decimal(n)),
    StoredValue::Datetime(dt) => SqlValue::Text(encode_datetime(*dt)),
    StoredValue::Choice(id) => SqlValue::Integer(*id),
    StoredValue::Blob(b) => SqlValue::Text(b.path.clone()),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// The four audit columns, which every live table ends with.
pub struct RawAudit {
  pub create_date: String,
  pub create_user: String,
  pub modify_date: String,
  pub modify_user: String,
}

impl RawAudit {
  fn from_row(row: &Row<'_>, first: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      create_date: row.get(first)?,
      create_user: row.get(first + 1)?,
      modify_date: row.get(first + 2)?,
      modify_user: row.get(first + 3)?,
    })
  }

  fn into_stamp(self) -> Result<AuditStamp> {
    Ok(AuditStamp {
      create_date: decode_dt(&self.create_date)?,
      create_user: self.create_user,
      modify_date: decode_dt(&self.modify_date)?,
      modify_user: self.modify_user,
    })
  }
}

/// Raw values read directly from a `schema` row.
pub struct RawSchema {
  pub id:             i64,
  pub name:           String,
  pub title:          String,
  pub description:    Option<String>,
  pub storage:        String,
  pub publish_date:   Option<String>,
  pub retract_date:   Option<String>,
  pub is_association: bool,
  pub categories:     String,
  pub audit:          RawAudit,
}

impl RawSchema {
  pub const COLUMNS: &'static str = "id, name, title, description, storage, publish_date, retract_date,
     is_association, categories, create_date, create_user, modify_date, modify_user";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:             row.get(0)?,
      name:           row.get(1)?,
      title:          row.get(2)?,
      description:    row.get(3)?,
      storage:        row.get(4)?,
      publish_date:   row.get(5)?,
      retract_date:   row.get(6)?,
      is_association: row.get(7)?,
      categories:     row.get(8)?,
      audit:          RawAudit::from_row(row, 9)?,
    })
  }

  /// The schema header; attributes are loaded separately.
  pub fn into_schema(self) -> Result<Schema> {
    Ok(Schema {
      id:             self.id,
      name:           self.name,
      title:          self.title,
      description:    self.description,
      storage:        decode_code("storage", &self.storage)?,
      publish_date:   self.publish_date.as_deref().map(decode_date).transpose()?,
      retract_date:   self.retract_date.as_deref().map(decode_date).transpose()?,
      is_association: self.is_association,
      categories:     decode_categories(&self.categories)?,
      attributes:     Default::default(),
      audit:          self.audit.into_stamp()?,
    })
  }
}

/// Raw values read directly from an `attribute` row.
pub struct RawAttribute {
  pub id:                  i64,
  pub schema_id:           i64,
  pub parent_attribute_id: Option<i64>,
  pub name:                String,
  pub title:               String,
  pub description:         Option<String>,
  pub kind:                String,
  pub flags:               [bool; 6],
  pub widget:              Option<String>,
  pub value_min:           Option<i64>,
  pub value_max:           Option<i64>,
  pub collection_min:      Option<i64>,
  pub collection_max:      Option<i64>,
  pub pattern:             Option<String>,
  pub decimal_places:      Option<u32>,
  pub order:               i64,
  pub audit:               RawAudit,
}

impl RawAttribute {
  pub const COLUMNS: &'static str = "id, schema_id, parent_attribute_id, name, title, description, type,
     is_collection, is_required, is_private, is_readonly, is_system, is_shuffled,
     widget, value_min, value_max, collection_min, collection_max, pattern,
     decimal_places, \"order\", create_date, create_user, modify_date, modify_user";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                  row.get(0)?,
      schema_id:           row.get(1)?,
      parent_attribute_id: row.get(2)?,
      name:                row.get(3)?,
      title:               row.get(4)?,
      description:         row.get(5)?,
      kind:                row.get(6)?,
      flags:               [
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
        row.get(12)?,
      ],
      widget:              row.get(13)?,
      value_min:           row.get(14)?,
      value_max:           row.get(15)?,
      collection_min:      row.get(16)?,
      collection_max:      row.get(17)?,
      pattern:             row.get(18)?,
      decimal_places:      row.get(19)?,
      order:               row.get(20)?,
      audit:               RawAudit::from_row(row, 21)?,
    })
  }

  /// The attribute without its choices.
  pub fn into_attribute(self) -> Result<Attribute> {
    let [is_collection, is_required, is_private, is_readonly, is_system, is_shuffled] = self.flags;
    Ok(Attribute {
      id: self.id,
      schema_id: self.schema_id,
      parent_attribute_id: self.parent_attribute_id,
      name: self.name,
      title: self.title,
      description: self.description,
      kind: decode_code("type", &self.kind)?,
      is_collection,
      is_required,
      is_private,
      is_readonly,
      is_system,
      is_shuffled,
      widget: self.widget.as_deref().map(|w| decode_code("widget", w)).transpose()?,
      value_min: self.value_min,
      value_max: self.value_max,
      collection_min: self.collection_min,
      collection_max: self.collection_max,
      pattern: self.pattern,
      decimal_places: self.decimal_places,
      order: self.order,
      choices: Default::default(),
      audit: self.audit.into_stamp()?,
    })
  }
}

/// Raw values read directly from a `choice` row.
pub struct RawChoice {
  pub id:           i64,
  pub attribute_id: i64,
  pub name:         String,
  pub title:        String,
  pub order:        i64,
  pub audit:        RawAudit,
}

impl RawChoice {
  pub const COLUMNS: &'static str =
    "id, attribute_id, name, title, \"order\", create_date, create_user, modify_date, modify_user";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:           row.get(0)?,
      attribute_id: row.get(1)?,
      name:         row.get(2)?,
      title:        row.get(3)?,
      order:        row.get(4)?,
      audit:        RawAudit::from_row(row, 5)?,
    })
  }

  pub fn into_choice(self) -> Result<Choice> {
    Ok(Choice {
      id:           self.id,
      attribute_id: self.attribute_id,
      name:         self.name,
      title:        self.title,
      order:        self.order,
      audit:        self.audit.into_stamp()?,
    })
  }
}

/// Raw values read directly from an `entity` row.
pub struct RawEntity {
  pub id:           i64,
  pub schema_id:    i64,
  pub state:        Option<String>,
  pub not_done:     bool,
  pub collect_date: String,
  pub audit:        RawAudit,
}

impl RawEntity {
  pub const COLUMNS: &'static str = "id, schema_id, state, not_done, collect_date,
     create_date, create_user, modify_date, modify_user";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:           row.get(0)?,
      schema_id:    row.get(1)?,
      state:        row.get(2)?,
      not_done:     row.get(3)?,
      collect_date: row.get(4)?,
      audit:        RawAudit::from_row(row, 5)?,
    })
  }

  pub fn into_entity(self) -> Result<Entity> {
    Ok(Entity {
      id:           self.id,
      schema_id:    self.schema_id,
      state:        self.state.as_deref().map(|s| decode_code("state", s)).transpose()?,
      not_done:     self.not_done,
      collect_date: decode_date(&self.collect_date)?,
      audit:        self.audit.into_stamp()?,
    })
  }
}

/// Raw values read directly from a `context` row.
pub struct RawContext {
  pub id:        i64,
  pub entity_id: i64,
  pub external:  String,
  pub key:       i64,
  pub audit:     RawAudit,
}

impl RawContext {
  pub const COLUMNS: &'static str =
    "id, entity_id, external, \"key\", create_date, create_user, modify_date, modify_user";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:        row.get(0)?,
      entity_id: row.get(1)?,
      external:  row.get(2)?,
      key:       row.get(3)?,
      audit:     RawAudit::from_row(row, 4)?,
    })
  }

  pub fn into_context(self) -> Result<Context> {
    Ok(Context {
      id:        self.id,
      entity_id: self.entity_id,
      external:  self.external,
      key:       self.key,
      audit:     self.audit.into_stamp()?,
    })
  }
}

/// Raw values read from one of the `value_*` partitions. `value` is text in
/// every partition except `value_choice`, where it is the choice id.
pub struct RawValue {
  pub id:           i64,
  pub entity_id:    i64,
  pub attribute_id: i64,
  pub value:        SqlValue,
  pub audit:        RawAudit,
  /// `(file_name, mime_type)`, for blobs only.
  pub file:         Option<(String, String)>,
}

impl RawValue {
  /// Column list for `partition`; blobs append their file metadata.
  pub fn columns(partition: ValuePartition) -> &'static str {
    match partition {
      ValuePartition::Blob => {
        "id, entity_id, attribute_id, value, create_date, create_user, modify_date, modify_user,
         file_name, mime_type"
      }
      _ => "id, entity_id, attribute_id, value, create_date, create_user, modify_date, modify_user",
    }
  }

  pub fn from_row(partition: ValuePartition, row: &Row<'_>) -> rusqlite::Result<Self> {
    let file = match partition {
      ValuePartition::Blob => Some((row.get(8)?, row.get(9)?)),
      _ => None,
    };
    Ok(Self {
      id: row.get(0)?,
      entity_id: row.get(1)?,
      attribute_id: row.get(2)?,
      value: row.get(3)?,
      audit: RawAudit::from_row(row, 4)?,
      file,
    })
  }

  pub fn into_value_row(self, partition: ValuePartition) -> Result<ValueRow> {
    let value = match (partition, self.value) {
      (ValuePartition::String | ValuePartition::Text, SqlValue::Text(s)) => StoredValue::Text(s),
      (ValuePartition::Number, SqlValue::Text(s)) => StoredValue::Number(decode_decimal(&s)?),
      (ValuePartition::Datetime, SqlValue::Text(s)) => StoredValue::Datetime(decode_datetime(&s)?),
      (ValuePartition::Choice, SqlValue::Integer(id)) => StoredValue::Choice(id),
      (ValuePartition::Blob, SqlValue::Text(path)) => {
        let (file_name, mime_type) = self.file.unwrap_or_default();
        StoredValue::Blob(BlobInfo { path, file_name, mime_type })
      }
      (partition, other) => {
        return Err(Error::UnknownCode {
          column: partition.table(),
          value:  format!("{other:?}"),
        });
      }
    };
    Ok(ValueRow {
      id: self.id,
      entity_id: self.entity_id,
      attribute_id: self.attribute_id,
      partition,
      value,
      audit: self.audit.into_stamp()?,
    })
  }
}
