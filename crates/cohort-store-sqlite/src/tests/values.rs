use bigdecimal::BigDecimal;
use cohort_core::{
  Error as CoreError,
  audit::{AuditAction, AuditTable},
  entity::{EntityState, NewEntity, ValueRow},
  error::Violation,
  schema::{AttributeType, NewAttribute, NewSchema, Widget},
  store::DataStore,
  value::{BlobInfo, Value, ValuePartition},
};

use super::{date, demographics, entity_of, live_rows, published, store, symptoms};
use crate::{Error, SqliteStore};

/// One attribute of every value-bearing kind.
fn kitchen_sink() -> NewSchema {
  let mut amount = NewAttribute::new("amount", "Amount", AttributeType::Number);
  amount.decimal_places = Some(2);
  let mut consented = NewAttribute::new("consented", "Consented", AttributeType::Number);
  consented.widget = Some(Widget::Checkbox);
  let mut code = NewAttribute::new("code", "Code", AttributeType::String);
  code.value_min = Some(3);
  code.pattern = Some("[A-Z0-9]+".into());

  NewSchema::new("Intake", "Intake")
    .with_attribute(code)
    .with_attribute(NewAttribute::new("notes", "Notes", AttributeType::Text))
    .with_attribute(amount)
    .with_attribute(consented)
    .with_attribute(NewAttribute::new("visit_date", "Visit date", AttributeType::Date))
    .with_attribute(NewAttribute::new("seen_at", "Seen at", AttributeType::Datetime))
    .with_attribute(
      NewAttribute::new("sex", "Sex", AttributeType::Choice)
        .with_choice("F", "Female")
        .with_choice("M", "Male"),
    )
    .with_attribute(NewAttribute::new("scan", "Scan", AttributeType::Blob))
    .with_attribute(NewAttribute::new("extra", "Extra", AttributeType::Section))
}

async fn set(s: &SqliteStore, entity_id: i64, name: &str, value: impl Into<Option<Value>>) {
  s.set_value(entity_id, name.into(), value.into()).await.unwrap();
}

async fn get(s: &SqliteStore, entity_id: i64, name: &str) -> Option<Value> {
  s.get_value(entity_id, name.into()).await.unwrap()
}

fn decimal(s: &str) -> BigDecimal { s.parse().unwrap() }

// ─── Round trips ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn every_kind_round_trips() {
  let s = store().await;
  let schema = published(&s, kitchen_sink(), date(2020, 1, 1)).await;
  let e = entity_of(&s, &schema).await.id;

  let seen_at = date(2021, 3, 4).and_hms_opt(13, 5, 7).unwrap();
  let scan = BlobInfo {
    path:      "uploads/2021/scan-17.pdf".into(),
    file_name: "scan.pdf".into(),
    mime_type: "application/pdf".into(),
  };
  let cases = [
    ("code", Value::from("AB12")),
    ("notes", Value::Text("Patient arrived late.".into())),
    ("amount", Value::Number(decimal("12.50"))),
    ("consented", Value::Boolean(true)),
    ("visit_date", Value::Date(date(2021, 3, 4))),
    ("seen_at", Value::DateTime(seen_at)),
    ("sex", Value::choice("F")),
    ("scan", Value::Blob(scan)),
  ];
  for (name, value) in cases {
    set(&s, e, name, value.clone()).await;
    assert_eq!(get(&s, e, name).await, Some(value), "{name}");
  }

  set(&s, e, "consented", Value::Boolean(false)).await;
  assert_eq!(get(&s, e, "consented").await, Some(Value::Boolean(false)));

  let all = s.entity_values(e).await.unwrap();
  assert_eq!(all.len(), 8);
  assert_eq!(all["sex"], Value::choice("F"));
}

#[tokio::test]
async fn numbers_round_to_declared_places() {
  let s = store().await;
  let schema = published(&s, kitchen_sink(), date(2020, 1, 1)).await;
  let e = entity_of(&s, &schema).await.id;

  set(&s, e, "amount", Value::Number(decimal("3.14159"))).await;
  assert_eq!(get(&s, e, "amount").await, Some(Value::Number(decimal("3.14"))));
}

#[tokio::test]
async fn interchangeable_variants_are_normalized() {
  let s = store().await;
  let schema = published(&s, kitchen_sink(), date(2020, 1, 1)).await;
  let e = entity_of(&s, &schema).await.id;

  set(&s, e, "notes", Value::from("plain string")).await;
  assert_eq!(get(&s, e, "notes").await, Some(Value::Text("plain string".into())));

  let at = date(2021, 3, 4).and_hms_opt(9, 30, 0).unwrap();
  set(&s, e, "visit_date", Value::DateTime(at)).await;
  assert_eq!(get(&s, e, "visit_date").await, Some(Value::Date(date(2021, 3, 4))));

  let err = s
    .set_value(e, "amount".into(), Some(Value::from("lots")))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::ValueMismatch { .. })));
}

// ─── Scalars ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn scalar_updates_in_place_with_history() {
  let s = store().await;
  let schema = published(&s, demographics(), date(2020, 1, 1)).await;
  let e = entity_of(&s, &schema).await.id;

  set(&s, e, "age", Value::from(30_i64)).await;
  set(&s, e, "age", Value::from(31_i64)).await;
  // Writing the same value again records nothing.
  set(&s, e, "age", Value::from(31_i64)).await;

  assert_eq!(live_rows(&s, "value_number", e).await, 1);
  let row_id: i64 = s
    .unit_of_work(move |session| {
      Ok(session.conn.query_row(
        "SELECT id FROM value_number WHERE entity_id = ?1",
        rusqlite::params![e],
        |r| r.get(0),
      )?)
    })
    .await
    .unwrap();

  let history = s
    .history::<ValueRow>(AuditTable::Value(ValuePartition::Number), row_id)
    .await
    .unwrap();
  let revisions: Vec<_> = history.iter().map(|r| (r.revision, r.action)).collect();
  assert_eq!(revisions, [(1, AuditAction::Insert), (2, AuditAction::Update)]);
}

#[tokio::test]
async fn demographics_age_end_to_end() {
  let s = store().await;
  let schema = published(&s, demographics(), date(2020, 1, 1)).await;
  let e = entity_of(&s, &schema).await.id;

  set(&s, e, "age", Value::from(30_i64)).await;
  assert_eq!(get(&s, e, "age").await, Some(Value::from(30_i64)));

  let err = s.set_value(e, "age".into(), Some(Value::from(200_i64))).await.unwrap_err();
  assert!(err.is_constraint());
  match err {
    Error::Core(CoreError::Constraint(c)) => {
      assert_eq!(c.schema, "Demographics");
      assert_eq!(c.attribute, "age");
      assert_eq!(c.violation, Violation::Max);
      assert_eq!(c.violation.operator(), ">=");
      assert_eq!(c.limit, "120");
      assert_eq!(c.value, "200");
    }
    other => panic!("unexpected error {other:?}"),
  }
  assert_eq!(get(&s, e, "age").await, Some(Value::from(30_i64)));

  set(&s, e, "age", None::<Value>).await;
  assert_eq!(get(&s, e, "age").await, None);
  assert_eq!(live_rows(&s, "value_number", e).await, 0);
}

#[tokio::test]
async fn string_minimum_is_a_character_count() {
  let s = store().await;
  let schema = published(&s, kitchen_sink(), date(2020, 1, 1)).await;
  let e = entity_of(&s, &schema).await.id;

  let err = s.set_value(e, "code".into(), Some(Value::from("AB"))).await.unwrap_err();
  match err {
    Error::Core(CoreError::Constraint(c)) => assert_eq!(c.violation, Violation::Min),
    other => panic!("unexpected error {other:?}"),
  }
  set(&s, e, "code", Value::from("ABC")).await;
  assert_eq!(get(&s, e, "code").await, Some(Value::from("ABC")));

  let err = s.set_value(e, "code".into(), Some(Value::from("abc"))).await.unwrap_err();
  match err {
    Error::Core(CoreError::Constraint(c)) => assert_eq!(c.violation, Violation::Pattern),
    other => panic!("unexpected error {other:?}"),
  }
}

#[tokio::test]
async fn delete_of_absent_value_is_a_no_op() {
  let s = store().await;
  let schema = published(&s, demographics(), date(2020, 1, 1)).await;
  let e = entity_of(&s, &schema).await.id;

  s.delete_value(e, "age".into()).await.unwrap();
  s.delete_value(e, "age".into()).await.unwrap();
  assert_eq!(live_rows(&s, "value_number", e).await, 0);
  assert!(s.entity_values(e).await.unwrap().is_empty());
}

#[tokio::test]
async fn unknown_and_section_attributes_are_rejected() {
  let s = store().await;
  let schema = published(&s, kitchen_sink(), date(2020, 1, 1)).await;
  let e = entity_of(&s, &schema).await.id;

  let err = s.get_value(e, "missing".into()).await.unwrap_err();
  assert!(matches!(err, Error::AttributeNotFound(_)));

  let err = s.set_value(e, "extra".into(), Some(Value::from("x"))).await.unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::AttributeDefinition { .. })));
}

// ─── Choices and collections ─────────────────────────────────────────────────

#[tokio::test]
async fn unknown_choice_names_value_and_valid_set() {
  let s = store().await;
  let schema = published(&s, kitchen_sink(), date(2020, 1, 1)).await;
  let e = entity_of(&s, &schema).await.id;

  let err = s.set_value(e, "sex".into(), Some(Value::choice("X"))).await.unwrap_err();
  match err {
    Error::Core(CoreError::Constraint(c)) => {
      assert_eq!(c.violation, Violation::Choice);
      assert_eq!(c.value, "X");
      assert_eq!(c.limit, "{F, M}");
    }
    other => panic!("unexpected error {other:?}"),
  }
}

#[tokio::test]
async fn symptoms_signs_end_to_end() {
  let s = store().await;
  let schema = published(&s, symptoms(), date(2020, 1, 1)).await;
  let e = entity_of(&s, &schema).await.id;

  set(&s, e, "signs", Value::choices(["001", "003"])).await;
  let Some(Value::Collection(items)) = get(&s, e, "signs").await else {
    panic!("expected a collection");
  };
  let mut codes: Vec<String> = items.iter().map(ToString::to_string).collect();
  codes.sort();
  assert_eq!(codes, ["001", "003"]);
}

#[tokio::test]
async fn collections_are_replaced_wholesale() {
  let s = store().await;
  let schema = published(&s, symptoms(), date(2020, 1, 1)).await;
  let e = entity_of(&s, &schema).await.id;

  set(&s, e, "signs", Value::choices(["001", "002", "003"])).await;
  assert_eq!(live_rows(&s, "value_choice", e).await, 3);

  set(&s, e, "signs", Value::choices(["001", "002"])).await;
  assert_eq!(live_rows(&s, "value_choice", e).await, 2);
  assert_eq!(get(&s, e, "signs").await, Some(Value::choices(["001", "002"])));

  // A bad element leaves the previous answer untouched.
  let err = s
    .set_value(e, "signs".into(), Some(Value::choices(["001", "009"])))
    .await
    .unwrap_err();
  assert!(err.is_constraint());
  assert_eq!(live_rows(&s, "value_choice", e).await, 2);

  set(&s, e, "signs", Value::Collection(Vec::new())).await;
  assert_eq!(get(&s, e, "signs").await, None);
}

// ─── Entities ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn entities_bind_only_to_published_schemas() {
  let s = store().await;
  let draft = s.create_schema(demographics()).await.unwrap();

  let err = s
    .create_entity(NewEntity::new(draft.id, date(2020, 5, 1)))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::InvalidEntitySchema { .. })));

  let schema = s.publish_schema(draft.id, date(2020, 1, 1)).await.unwrap();
  let existing = entity_of(&s, &schema).await;
  set(&s, existing.id, "age", Value::from(44_i64)).await;

  s.retract_schema(schema.id, date(2021, 1, 1)).await.unwrap();
  let err = s
    .create_entity(NewEntity::new(schema.id, date(2021, 5, 1)))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::InvalidEntitySchema { .. })));

  assert_eq!(s.get_entity(existing.id).await.unwrap(), Some(existing.clone()));
  assert_eq!(get(&s, existing.id, "age").await, Some(Value::from(44_i64)));
}

#[tokio::test]
async fn update_entity_keeps_schema_binding() {
  let s = store().await;
  let schema = published(&s, demographics(), date(2020, 1, 1)).await;
  let entity = entity_of(&s, &schema).await;

  let mut edited = entity.clone();
  edited.state = Some(EntityState::Complete);
  edited.schema_id = 999;
  let saved = s.update_entity(edited).await.unwrap();
  assert_eq!(saved.state, Some(EntityState::Complete));
  assert_eq!(saved.schema_id, schema.id);
  assert_eq!(s.get_entity(entity.id).await.unwrap(), Some(saved));
}

#[tokio::test]
async fn delete_entity_removes_its_values() {
  let s = store().await;
  let schema = published(&s, demographics(), date(2020, 1, 1)).await;
  let e = entity_of(&s, &schema).await.id;
  set(&s, e, "age", Value::from(30_i64)).await;
  set(&s, e, "initials", Value::from("JD")).await;

  s.delete_entity(e).await.unwrap();
  assert!(s.get_entity(e).await.unwrap().is_none());
  assert_eq!(live_rows(&s, "value_number", e).await, 0);
  assert_eq!(live_rows(&s, "value_string", e).await, 0);

  let err = s.get_value(e, "age".into()).await.unwrap_err();
  assert!(matches!(err, Error::EntityNotFound(_)));
}
