//! Integration tests for `SqliteStore` against an in-memory database.

mod metadata;
mod values;

use chrono::NaiveDate;
use cohort_core::{
  entity::{Entity, NewEntity},
  schema::{AttributeType, NewAttribute, NewSchema, Schema},
  store::DataStore,
};

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
  NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

/// "Demographics": `age` (0 to 120, whole years), `initials` (private) and a
/// `vitals` section holding `weight`.
fn demographics() -> NewSchema {
  let mut age = NewAttribute::new("age", "Age", AttributeType::Number);
  age.decimal_places = Some(0);
  age.value_min = Some(0);
  age.value_max = Some(120);

  let mut initials = NewAttribute::new("initials", "Initials", AttributeType::String);
  initials.is_private = true;

  let mut weight = NewAttribute::new("weight", "Weight (kg)", AttributeType::Number);
  weight.decimal_places = Some(1);

  NewSchema::new("Demographics", "Demographics")
    .with_attribute(age)
    .with_attribute(initials)
    .with_attribute(NewAttribute::new("vitals", "Vitals", AttributeType::Section).with_child(weight))
}

/// "Symptoms": a collection choice attribute `signs`.
fn symptoms() -> NewSchema {
  NewSchema::new("Symptoms", "Symptoms").with_attribute(
    NewAttribute::new("signs", "Signs", AttributeType::Choice)
      .collection()
      .with_choice("001", "Fever")
      .with_choice("002", "Cough")
      .with_choice("003", "Rash"),
  )
}

/// Create `input` and publish it on `on`.
async fn published(s: &SqliteStore, input: NewSchema, on: NaiveDate) -> Schema {
  let draft = s.create_schema(input).await.unwrap();
  s.publish_schema(draft.id, on).await.unwrap()
}

async fn entity_of(s: &SqliteStore, schema: &Schema) -> Entity {
  s.create_entity(NewEntity::new(schema.id, date(2021, 5, 1)))
    .await
    .unwrap()
}

/// Live row count of `table` for one entity.
async fn live_rows(s: &SqliteStore, table: &'static str, entity_id: i64) -> i64 {
  s.unit_of_work(move |session| {
    let sql = format!("SELECT COUNT(*) FROM {table} WHERE entity_id = ?1");
    Ok(session.conn.query_row(&sql, rusqlite::params![entity_id], |r| r.get(0))?)
  })
  .await
  .unwrap()
}
