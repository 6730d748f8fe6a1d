//! SQL schema for the Cohort SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

use cohort_core::audit::AuditTable;

/// Live tables; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS schema (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    name           TEXT    NOT NULL,
    title          TEXT    NOT NULL,
    description    TEXT,
    storage        TEXT    NOT NULL DEFAULT 'eav',  -- 'eav' | 'table' | 'resource'
    publish_date   TEXT,                            -- YYYY-MM-DD; NULL while a draft
    retract_date   TEXT,
    is_association INTEGER NOT NULL DEFAULT 0,
    categories     TEXT    NOT NULL DEFAULT '[]',   -- JSON array of names
    create_date    TEXT    NOT NULL,
    create_user    TEXT    NOT NULL,
    modify_date    TEXT    NOT NULL,
    modify_user    TEXT    NOT NULL,
    CHECK (retract_date IS NULL OR publish_date IS NOT NULL),
    CHECK (publish_date IS NULL OR retract_date IS NULL OR publish_date <= retract_date)
);

-- One version per (name, publish date), compared case-insensitively, and at
-- most one draft per name (NULL publish dates never collide in a plain index).
CREATE UNIQUE INDEX IF NOT EXISTS schema_name_version_uq
    ON schema(name COLLATE NOCASE, publish_date);
CREATE UNIQUE INDEX IF NOT EXISTS schema_name_draft_uq
    ON schema(name COLLATE NOCASE) WHERE publish_date IS NULL;

CREATE TABLE IF NOT EXISTS attribute (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    schema_id           INTEGER NOT NULL REFERENCES schema(id),
    parent_attribute_id INTEGER REFERENCES attribute(id),
    name                TEXT    NOT NULL,
    title               TEXT    NOT NULL,
    description         TEXT,
    type                TEXT    NOT NULL,
    is_collection       INTEGER NOT NULL DEFAULT 0,
    is_required         INTEGER NOT NULL DEFAULT 0,
    is_private          INTEGER NOT NULL DEFAULT 0,
    is_readonly         INTEGER NOT NULL DEFAULT 0,
    is_system           INTEGER NOT NULL DEFAULT 0,
    is_shuffled         INTEGER NOT NULL DEFAULT 0,
    widget              TEXT,
    value_min           INTEGER,
    value_max           INTEGER,
    collection_min      INTEGER,
    collection_max      INTEGER,
    pattern             TEXT,
    decimal_places      INTEGER,
    "order"             INTEGER NOT NULL,
    create_date         TEXT    NOT NULL,
    create_user         TEXT    NOT NULL,
    modify_date         TEXT    NOT NULL,
    modify_user         TEXT    NOT NULL,
    CHECK (type IN ('number', 'choice', 'date', 'datetime', 'string', 'text', 'section', 'blob')),
    CHECK (value_min IS NULL OR value_max IS NULL OR value_min <= value_max),
    CHECK (collection_min IS NULL OR collection_max IS NULL OR collection_min < collection_max),
    CHECK (decimal_places IS NULL OR type = 'number')
);

CREATE UNIQUE INDEX IF NOT EXISTS attribute_name_uq
    ON attribute(schema_id, name COLLATE NOCASE);
-- SQLite cannot defer this check to commit; reorders park every row at a
-- large offset first and then renumber.
CREATE UNIQUE INDEX IF NOT EXISTS attribute_order_uq
    ON attribute(schema_id, "order");
CREATE INDEX IF NOT EXISTS attribute_parent_idx ON attribute(parent_attribute_id);

CREATE TABLE IF NOT EXISTS choice (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    attribute_id INTEGER NOT NULL REFERENCES attribute(id),
    name         TEXT    NOT NULL,
    title        TEXT    NOT NULL,
    "order"      INTEGER NOT NULL,
    create_date  TEXT    NOT NULL,
    create_user  TEXT    NOT NULL,
    modify_date  TEXT    NOT NULL,
    modify_user  TEXT    NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS choice_name_uq  ON choice(attribute_id, name);
CREATE UNIQUE INDEX IF NOT EXISTS choice_order_uq ON choice(attribute_id, "order");

CREATE TABLE IF NOT EXISTS entity (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    schema_id    INTEGER NOT NULL REFERENCES schema(id),
    state        TEXT,
    not_done     INTEGER NOT NULL DEFAULT 0,
    collect_date TEXT    NOT NULL,
    create_date  TEXT    NOT NULL,
    create_user  TEXT    NOT NULL,
    modify_date  TEXT    NOT NULL,
    modify_user  TEXT    NOT NULL
);

CREATE INDEX IF NOT EXISTS entity_schema_idx ON entity(schema_id);

CREATE TABLE IF NOT EXISTS context (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_id   INTEGER NOT NULL REFERENCES entity(id),
    external    TEXT    NOT NULL,
    "key"       INTEGER NOT NULL,
    create_date TEXT    NOT NULL,
    create_user TEXT    NOT NULL,
    modify_date TEXT    NOT NULL,
    modify_user TEXT    NOT NULL,
    UNIQUE (entity_id, external, "key")
);

CREATE INDEX IF NOT EXISTS context_external_idx ON context(external, "key");

CREATE TABLE IF NOT EXISTS value_string (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_id    INTEGER NOT NULL REFERENCES entity(id),
    attribute_id INTEGER NOT NULL REFERENCES attribute(id),
    value        TEXT    NOT NULL,
    create_date  TEXT    NOT NULL,
    create_user  TEXT    NOT NULL,
    modify_date  TEXT    NOT NULL,
    modify_user  TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS value_text (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_id    INTEGER NOT NULL REFERENCES entity(id),
    attribute_id INTEGER NOT NULL REFERENCES attribute(id),
    value        TEXT    NOT NULL,
    create_date  TEXT    NOT NULL,
    create_user  TEXT    NOT NULL,
    modify_date  TEXT    NOT NULL,
    modify_user  TEXT    NOT NULL
);

-- Decimal text keeps the declared scale ("30", "1.50").
CREATE TABLE IF NOT EXISTS value_number (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_id    INTEGER NOT NULL REFERENCES entity(id),
    attribute_id INTEGER NOT NULL REFERENCES attribute(id),
    value        TEXT    NOT NULL,
    create_date  TEXT    NOT NULL,
    create_user  TEXT    NOT NULL,
    modify_date  TEXT    NOT NULL,
    modify_user  TEXT    NOT NULL
);

-- Dates are stored at midnight and truncated on read.
CREATE TABLE IF NOT EXISTS value_datetime (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_id    INTEGER NOT NULL REFERENCES entity(id),
    attribute_id INTEGER NOT NULL REFERENCES attribute(id),
    value        TEXT    NOT NULL,
    create_date  TEXT    NOT NULL,
    create_user  TEXT    NOT NULL,
    modify_date  TEXT    NOT NULL,
    modify_user  TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS value_choice (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_id    INTEGER NOT NULL REFERENCES entity(id),
    attribute_id INTEGER NOT NULL REFERENCES attribute(id),
    value        INTEGER NOT NULL REFERENCES choice(id),
    create_date  TEXT    NOT NULL,
    create_user  TEXT    NOT NULL,
    modify_date  TEXT    NOT NULL,
    modify_user  TEXT    NOT NULL
);

-- `value` is the file's storage path.
CREATE TABLE IF NOT EXISTS value_blob (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_id    INTEGER NOT NULL REFERENCES entity(id),
    attribute_id INTEGER NOT NULL REFERENCES attribute(id),
    value        TEXT    NOT NULL,
    file_name    TEXT    NOT NULL,
    mime_type    TEXT    NOT NULL,
    create_date  TEXT    NOT NULL,
    create_user  TEXT    NOT NULL,
    modify_date  TEXT    NOT NULL,
    modify_user  TEXT    NOT NULL
);

CREATE INDEX IF NOT EXISTS value_string_key_idx   ON value_string(entity_id, attribute_id);
CREATE INDEX IF NOT EXISTS value_text_key_idx     ON value_text(entity_id, attribute_id);
CREATE INDEX IF NOT EXISTS value_number_key_idx   ON value_number(entity_id, attribute_id);
CREATE INDEX IF NOT EXISTS value_datetime_key_idx ON value_datetime(entity_id, attribute_id);
CREATE INDEX IF NOT EXISTS value_choice_key_idx   ON value_choice(entity_id, attribute_id);
CREATE INDEX IF NOT EXISTS value_blob_key_idx     ON value_blob(entity_id, attribute_id);
"#;

/// DDL for the history table parallel to `table`.
///
/// `snapshot` holds the row's column values as JSON; revisions are numbered
/// per live-row id starting at 1.
pub fn history_ddl(table: AuditTable) -> String {
  let history = table.history_name();
  format!(
    "CREATE TABLE IF NOT EXISTS {history} (
         history_id  INTEGER PRIMARY KEY AUTOINCREMENT,
         id          INTEGER NOT NULL,
         revision    INTEGER NOT NULL,
         operation   TEXT    NOT NULL,  -- 'insert' | 'update' | 'delete'
         snapshot    TEXT    NOT NULL,
         recorded_at TEXT    NOT NULL,
         recorded_by TEXT    NOT NULL,
         UNIQUE (id, revision)
     );"
  )
}

/// The complete DDL: live tables followed by every history table.
pub fn full_schema() -> String {
  let mut sql = String::from(SCHEMA);
  for table in AuditTable::ALL {
    sql.push_str(&history_ddl(table));
    sql.push('\n');
  }
  sql.push_str("PRAGMA user_version = 1;\n");
  sql
}
