use cohort_core::{
  Error as CoreError,
  schema::{AttributeType, NewAttribute, NewChoice, NewSchema, SchemaStatus, Storage},
  store::DataStore,
  value::Value,
};

use super::{date, demographics, entity_of, published, store, symptoms};
use crate::{Error, SqliteStore};

/// `(name, order)` of every attribute, walked in pre-order.
async fn layout(s: &SqliteStore, schema_id: i64) -> Vec<(String, i64)> {
  let schema = s.get_schema(schema_id).await.unwrap().unwrap();
  schema.iterlist().map(|a| (a.name.clone(), a.order)).collect()
}

// ─── Schemas ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_schema_numbers_attributes_in_preorder() {
  let s = store().await;
  let schema = s.create_schema(demographics()).await.unwrap();

  assert_eq!(schema.status(), SchemaStatus::Draft);
  assert_eq!(schema.storage, Storage::Eav);
  let names: Vec<_> = schema.iterlist().map(|a| (a.name.as_str(), a.order)).collect();
  assert_eq!(names, [("age", 0), ("initials", 1), ("vitals", 2), ("weight", 3)]);

  let vitals = schema.attribute("vitals").unwrap();
  let weight = schema.attribute("weight").unwrap();
  assert_eq!(weight.parent_attribute_id, Some(vitals.id));
  assert_eq!(weight.schema_id, schema.id);
}

#[tokio::test]
async fn get_schema_missing_returns_none() {
  let s = store().await;
  assert!(s.get_schema(999).await.unwrap().is_none());
}

#[tokio::test]
async fn invalid_names_fail_before_persisting() {
  let s = store().await;

  let err = s.create_schema(NewSchema::new("2020form", "Bad")).await.unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::NameValidation { .. })));

  let input = NewSchema::new("Visit", "Visit")
    .with_attribute(NewAttribute::new("select", "Select", AttributeType::String));
  let err = s.create_schema(input).await.unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::NameValidation { .. })));

  assert!(s.list_schemas().await.unwrap().is_empty());
}

#[tokio::test]
async fn attribute_names_are_unique_ignoring_case() {
  let s = store().await;
  let schema = s.create_schema(demographics()).await.unwrap();

  let err = s
    .add_attribute(schema.id, None, NewAttribute::new("AGE", "Age again", AttributeType::Number))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::NameValidation { .. })));

  let schema = s.get_schema(schema.id).await.unwrap().unwrap();
  let mut lowered: Vec<_> = schema.attributes.keys().map(|n| n.to_lowercase()).collect();
  let before = lowered.len();
  lowered.dedup();
  assert_eq!(lowered.len(), before);
}

#[tokio::test]
async fn only_one_draft_per_name() {
  let s = store().await;
  s.create_schema(demographics()).await.unwrap();

  let err = s
    .create_schema(NewSchema::new("DEMOGRAPHICS", "Again"))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Integrity(_)), "got {err:?}");
}

#[tokio::test]
async fn find_schema_prefers_newest_published_version() {
  let s = store().await;
  let v1 = published(&s, demographics(), date(2020, 1, 1)).await;
  let v2 = s.copy_schema(v1.id).await.unwrap();
  let v2 = s.publish_schema(v2.id, date(2021, 1, 1)).await.unwrap();

  let found = s.find_schema("demographics".into(), None).await.unwrap().unwrap();
  assert_eq!(found.id, v2.id);

  let found = s
    .find_schema("Demographics".into(), Some(date(2020, 1, 1)))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(found.id, v1.id);

  s.retract_schema(v2.id, date(2022, 1, 1)).await.unwrap();
  let found = s.find_schema("Demographics".into(), None).await.unwrap().unwrap();
  assert_eq!(found.id, v1.id);

  assert!(s.find_schema("Nothing".into(), None).await.unwrap().is_none());
}

#[tokio::test]
async fn copy_is_an_independent_draft() {
  let s = store().await;
  let original = published(&s, symptoms(), date(2020, 1, 1)).await;
  let copy = s.copy_schema(original.id).await.unwrap();

  assert_ne!(copy.id, original.id);
  assert!(copy.publish_date.is_none());
  assert!(copy.retract_date.is_none());
  assert_eq!(copy.name, original.name);

  let signs = &copy.attributes["signs"];
  let original_signs = &original.attributes["signs"];
  assert_ne!(signs.id, original_signs.id);
  assert_eq!(signs.title, original_signs.title);
  let codes: Vec<_> = signs.iterchoices().map(|c| (c.name.clone(), c.title.clone())).collect();
  let original_codes: Vec<_> =
    original_signs.iterchoices().map(|c| (c.name.clone(), c.title.clone())).collect();
  assert_eq!(codes, original_codes);

  let mut edited = signs.clone();
  edited.title = "Presenting signs".into();
  s.update_attribute(edited).await.unwrap();
  let fever = signs.choices["001"].clone();
  s.update_choice(cohort_core::schema::Choice { title: "Pyrexia".into(), ..fever })
    .await
    .unwrap();

  let original = s.get_schema(original.id).await.unwrap().unwrap();
  assert_eq!(original.attributes["signs"].title, "Signs");
  assert_eq!(original.attributes["signs"].choices["001"].title, "Fever");
}

#[tokio::test]
async fn lifecycle_transitions_are_checked() {
  let s = store().await;
  let draft = s.create_schema(demographics()).await.unwrap();

  let err = s.retract_schema(draft.id, date(2020, 1, 1)).await.unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::Lifecycle { .. })));

  let schema = s.publish_schema(draft.id, date(2020, 1, 1)).await.unwrap();
  assert_eq!(schema.status(), SchemaStatus::Published);

  let err = s.publish_schema(draft.id, date(2020, 2, 1)).await.unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::Lifecycle { .. })));

  let err = s.retract_schema(draft.id, date(2019, 12, 31)).await.unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::Lifecycle { .. })));

  let mut renamed = schema.clone();
  renamed.name = "Demography".into();
  let err = s.update_schema(renamed).await.unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::Lifecycle { .. })));

  let mut retitled = schema.clone();
  retitled.title = "Patient demographics".into();
  retitled.categories.insert("baseline".into());
  let saved = s.update_schema(retitled).await.unwrap();
  assert_eq!(saved.title, "Patient demographics");
  assert_eq!(saved.publish_date, Some(date(2020, 1, 1)));

  let reloaded = s.get_schema(schema.id).await.unwrap().unwrap();
  assert!(reloaded.categories.contains("baseline"));

  let retracted = s.retract_schema(schema.id, date(2021, 1, 1)).await.unwrap();
  assert_eq!(retracted.status(), SchemaStatus::Retracted);
}

#[tokio::test]
async fn list_schemas_summarises_every_version() {
  let s = store().await;
  let v1 = published(&s, demographics(), date(2020, 1, 1)).await;
  let v2 = s.copy_schema(v1.id).await.unwrap();
  let mut v2 = s.publish_schema(v2.id, date(2021, 6, 1)).await.unwrap();
  v2.title = "Demographics (rev. 2)".into();
  let v2 = s.update_schema(v2).await.unwrap();
  let mut draft = s.copy_schema(v2.id).await.unwrap();
  draft.title = "Demographics (work in progress)".into();
  s.update_schema(draft).await.unwrap();
  s.create_schema(symptoms()).await.unwrap();

  let summaries = s.list_schemas().await.unwrap();
  assert_eq!(summaries.len(), 2);

  let demo = &summaries[0];
  assert_eq!(demo.name, "Demographics");
  assert_eq!(demo.title, "Demographics (rev. 2)");
  assert!(demo.has_private);
  assert!(!demo.has_rand);
  assert_eq!(demo.versions, [date(2020, 1, 1), date(2021, 6, 1)]);

  let symptoms = &summaries[1];
  assert_eq!(symptoms.name, "Symptoms");
  assert!(!symptoms.has_private);
  assert!(symptoms.versions.is_empty());
}

#[tokio::test]
async fn delete_schema_refused_while_entities_exist() {
  let s = store().await;
  let schema = published(&s, demographics(), date(2020, 1, 1)).await;
  entity_of(&s, &schema).await;

  let err = s.delete_schema(schema.id).await.unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::Lifecycle { .. })));

  let draft = s.create_schema(symptoms()).await.unwrap();
  s.delete_schema(draft.id).await.unwrap();
  assert!(s.get_schema(draft.id).await.unwrap().is_none());
}

// ─── Attributes ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn add_attribute_appends_subtree() {
  let s = store().await;
  let schema = s.create_schema(demographics()).await.unwrap();
  let vitals = schema.attributes["vitals"].id;

  let added = s
    .add_attribute(
      schema.id,
      Some(vitals),
      NewAttribute::new("height", "Height (cm)", AttributeType::Number),
    )
    .await
    .unwrap();
  assert_eq!(added.parent_attribute_id, Some(vitals));
  assert_eq!(added.order, 4);

  let age = schema.attributes["age"].id;
  let err = s
    .add_attribute(schema.id, Some(age), NewAttribute::new("bmi", "BMI", AttributeType::Number))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::AttributeDefinition { .. })));

  // A child added to a section that is not last lands inside it.
  let id = |name: &str| schema.attributes[name].id;
  let ids = vec![id("vitals"), id("weight"), added.id, id("age"), id("initials")];
  s.reorder_attributes(schema.id, ids).await.unwrap();
  let pulse = s
    .add_attribute(
      schema.id,
      Some(vitals),
      NewAttribute::new("pulse", "Pulse", AttributeType::Number),
    )
    .await
    .unwrap();
  assert_eq!(pulse.order, 3);
  assert_eq!(layout(&s, schema.id).await, [
    ("vitals".to_string(), 0),
    ("weight".to_string(), 1),
    ("height".to_string(), 2),
    ("pulse".to_string(), 3),
    ("age".to_string(), 4),
    ("initials".to_string(), 5),
  ]);
}

#[tokio::test]
async fn update_attribute_keeps_structure() {
  let s = store().await;
  let schema = s.create_schema(demographics()).await.unwrap();
  let mut weight = schema.attributes["weight"].clone();
  weight.title = "Body weight".into();
  weight.value_max = Some(400);
  weight.order = 99;
  weight.parent_attribute_id = None;

  let saved = s.update_attribute(weight).await.unwrap();
  assert_eq!(saved.title, "Body weight");
  assert_eq!(saved.value_max, Some(400));
  assert_eq!(saved.order, 3);
  assert_eq!(saved.parent_attribute_id, Some(schema.attributes["vitals"].id));

  let mut clash = saved.clone();
  clash.name = "Age".into();
  let err = s.update_attribute(clash).await.unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::NameValidation { .. })));
}

#[tokio::test]
async fn stored_values_pin_type_and_collection_mode() {
  let s = store().await;
  let schema = published(&s, demographics(), date(2020, 1, 1)).await;
  let e = entity_of(&s, &schema).await.id;
  s.set_value(e, "age".into(), Some(Value::from(42_i64))).await.unwrap();
  let age = schema.attributes["age"].clone();

  let mut retyped = age.clone();
  retyped.kind = AttributeType::String;
  retyped.decimal_places = None;
  let err = s.update_attribute(retyped).await.unwrap_err();
  assert!(matches!(
    err,
    Error::Core(CoreError::AttributeDefinition { ref reason, .. }) if reason.contains("stored values")
  ));

  let mut collected = age.clone();
  collected.is_collection = true;
  let err = s.update_attribute(collected).await.unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::AttributeDefinition { .. })));

  let mut retitled = age.clone();
  retitled.title = "Age (years)".into();
  s.update_attribute(retitled).await.unwrap();
  assert_eq!(s.get_value(e, "age".into()).await.unwrap(), Some(Value::from(42_i64)));
  assert_eq!(s.entity_values(e).await.unwrap()["age"], Value::from(42_i64));

  // Nothing stored yet, so the type is still open.
  let mut initials = schema.attributes["initials"].clone();
  initials.kind = AttributeType::Text;
  let saved = s.update_attribute(initials).await.unwrap();
  assert_eq!(saved.kind, AttributeType::Text);
}

#[tokio::test]
async fn reorder_attributes_renumbers_in_one_pass() {
  let s = store().await;
  let schema = s.create_schema(demographics()).await.unwrap();
  let id = |name: &str| schema.attributes[name].id;
  let ids = vec![id("vitals"), id("weight"), id("age"), id("initials")];

  s.reorder_attributes(schema.id, ids.clone()).await.unwrap();

  let reordered = s.get_schema(schema.id).await.unwrap().unwrap();
  for (position, id) in ids.iter().enumerate() {
    assert_eq!(reordered.attribute_by_id(*id).unwrap().order, position as i64);
  }
  let walked: Vec<_> = reordered.iterlist().map(|a| a.id).collect();
  assert_eq!(walked, ids);
}

#[tokio::test]
async fn reorder_keeps_sections_ahead_of_their_children() {
  let s = store().await;
  let schema = s.create_schema(demographics()).await.unwrap();
  let mut ids: Vec<i64> = schema.iterlist().map(|a| a.id).collect();
  ids.reverse();

  let err = s.reorder_attributes(schema.id, ids).await.unwrap_err();
  assert!(matches!(err, Error::IncompleteOrder { .. }));

  let schema = s.get_schema(schema.id).await.unwrap().unwrap();
  let names: Vec<_> = schema.iterlist().map(|a| a.name.as_str()).collect();
  assert_eq!(names, ["age", "initials", "vitals", "weight"]);
}

#[tokio::test]
async fn reorder_requires_the_complete_sequence() {
  let s = store().await;
  let schema = s.create_schema(demographics()).await.unwrap();
  let ids: Vec<i64> = schema.iterlist().map(|a| a.id).collect();

  let err = s.reorder_attributes(schema.id, ids[1..].to_vec()).await.unwrap_err();
  assert!(matches!(err, Error::IncompleteOrder { .. }));

  let mut doubled = ids.clone();
  doubled[0] = ids[1];
  let err = s.reorder_attributes(schema.id, doubled).await.unwrap_err();
  assert!(matches!(err, Error::IncompleteOrder { .. }));

  // Nothing moved.
  let schema = s.get_schema(schema.id).await.unwrap().unwrap();
  let orders: Vec<_> = schema.iterlist().map(|a| a.order).collect();
  assert_eq!(orders, [0, 1, 2, 3]);
}

#[tokio::test]
async fn reparent_within_schema() {
  let s = store().await;
  let schema = s.create_schema(demographics()).await.unwrap();
  let vitals = schema.attributes["vitals"].id;
  let age = schema.attributes["age"].id;

  let moved = s.reparent_attribute(age, Some(vitals)).await.unwrap();
  assert_eq!(moved.parent_attribute_id, Some(vitals));
  assert_eq!(moved.schema_id, schema.id);
  assert_eq!(moved.order, 3);
  assert_eq!(layout(&s, schema.id).await, [
    ("initials".to_string(), 0),
    ("vitals".to_string(), 1),
    ("weight".to_string(), 2),
    ("age".to_string(), 3),
  ]);

  let weight = schema.attributes["weight"].id;
  let moved = s.reparent_attribute(weight, None).await.unwrap();
  assert_eq!(moved.parent_attribute_id, None);
  assert_eq!(layout(&s, schema.id).await, [
    ("initials".to_string(), 0),
    ("vitals".to_string(), 1),
    ("age".to_string(), 2),
    ("weight".to_string(), 3),
  ]);

  let moved = s.reparent_attribute(age, None).await.unwrap();
  assert_eq!(moved.parent_attribute_id, None);
  assert_eq!(layout(&s, schema.id).await, [
    ("initials".to_string(), 0),
    ("vitals".to_string(), 1),
    ("weight".to_string(), 2),
    ("age".to_string(), 3),
  ]);

  let err = s.reparent_attribute(vitals, Some(age)).await.unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::InvalidReparent { .. })));
}

#[tokio::test]
async fn reparent_across_schemas_moves_the_subtree() {
  let s = store().await;
  let source = s.create_schema(demographics()).await.unwrap();
  let target = s
    .create_schema(
      NewSchema::new("Vitals", "Vitals")
        .with_attribute(NewAttribute::new("measures", "Measures", AttributeType::Section)),
    )
    .await
    .unwrap();
  let vitals = source.attributes["vitals"].id;
  let measures = target.attributes["measures"].id;

  let moved = s.reparent_attribute(vitals, Some(measures)).await.unwrap();
  assert_eq!(moved.schema_id, target.id);
  assert_eq!(moved.parent_attribute_id, Some(measures));

  let target = s.get_schema(target.id).await.unwrap().unwrap();
  let weight = target.attribute("weight").expect("weight moved with its section");
  assert_eq!(weight.schema_id, target.id);
  assert_eq!(weight.parent_attribute_id, Some(vitals));
  for attribute in target.attributes.values() {
    if let Some(parent) = attribute.parent_attribute_id {
      assert_eq!(target.attribute_by_id(parent).unwrap().schema_id, attribute.schema_id);
    }
  }

  let walked: Vec<_> = target.iterlist().map(|a| (a.name.as_str(), a.order)).collect();
  assert_eq!(walked, [("measures", 0), ("vitals", 1), ("weight", 2)]);

  let source = s.get_schema(source.id).await.unwrap().unwrap();
  assert!(source.attribute("vitals").is_none());
  assert!(source.attribute("weight").is_none());
  let walked: Vec<_> = source.iterlist().map(|a| (a.name.as_str(), a.order)).collect();
  assert_eq!(walked, [("age", 0), ("initials", 1)]);
}

#[tokio::test]
async fn delete_attribute_removes_descendants() {
  let s = store().await;
  let schema = s.create_schema(demographics()).await.unwrap();
  s.delete_attribute(schema.attributes["age"].id).await.unwrap();

  assert_eq!(layout(&s, schema.id).await, [
    ("initials".to_string(), 0),
    ("vitals".to_string(), 1),
    ("weight".to_string(), 2),
  ]);

  s.delete_attribute(schema.attributes["vitals"].id).await.unwrap();

  let schema = s.get_schema(schema.id).await.unwrap().unwrap();
  let walked: Vec<_> = schema.iterlist().map(|a| (a.name.as_str(), a.order)).collect();
  assert_eq!(walked, [("initials", 0)]);
}

// ─── Choices ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn choices_append_and_reorder() {
  let s = store().await;
  let schema = s.create_schema(symptoms()).await.unwrap();
  let signs = schema.attributes["signs"].id;

  let nausea = s.add_choice(signs, NewChoice::new("004", "Nausea")).await.unwrap();
  assert_eq!(nausea.order, 3);

  let err = s.add_choice(signs, NewChoice::new("001", "Fever again")).await.unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::NameValidation { .. })));

  let schema = s.get_schema(schema.id).await.unwrap().unwrap();
  let mut ids: Vec<i64> = schema.attributes["signs"].iterchoices().map(|c| c.id).collect();
  ids.rotate_left(1);
  s.reorder_choices(signs, ids).await.unwrap();

  let schema = s.get_schema(schema.id).await.unwrap().unwrap();
  let codes: Vec<_> =
    schema.attributes["signs"].iterchoices().map(|c| c.name.as_str()).collect();
  assert_eq!(codes, ["002", "003", "004", "001"]);

  s.delete_choice(nausea.id).await.unwrap();
  let schema = s.get_schema(schema.id).await.unwrap().unwrap();
  assert!(!schema.attributes["signs"].choices.contains_key("004"));
}

#[tokio::test]
async fn choices_only_on_choice_attributes() {
  let s = store().await;
  let schema = s.create_schema(demographics()).await.unwrap();
  let err = s
    .add_choice(schema.attributes["age"].id, NewChoice::new("1", "One"))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::AttributeDefinition { .. })));
}
