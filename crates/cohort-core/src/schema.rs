//! Schema metadata: versioned form definitions.
//!
//! A [`Schema`] is one version of a data-collection form. Its fields are
//! [`Attribute`]s, which may nest under `section` attributes, and choice-typed
//! attributes carry an ordered set of [`Choice`] codes. Inputs to a store are
//! the `New*` types; the persisted types carry ids, order and audit columns.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
  Error, Result,
  audit::{AuditStamp, AuditTable, Auditable},
  constraint, naming,
};

// ─── Enumerations ────────────────────────────────────────────────────────────

/// How entities of a schema are physically stored.
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Storage {
  /// Answers live in the type-sharded value tables.
  #[default]
  Eav,
  /// Answers live in a dedicated flat table owned by another module.
  Table,
  /// The schema describes an external resource; no answers are stored.
  Resource,
}

/// The data type of an attribute.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  EnumIter,
  IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AttributeType {
  Number,
  Choice,
  Date,
  Datetime,
  String,
  Text,
  /// A grouping of child attributes; holds no value itself.
  Section,
  Blob,
}

impl AttributeType {
  /// Types whose `value_min`/`value_max` are character-length bounds.
  pub fn is_length_bounded(self) -> bool { matches!(self, Self::String | Self::Text) }

  pub fn is_temporal(self) -> bool { matches!(self, Self::Date | Self::Datetime) }
}

/// How a rendering layer should present an attribute.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Widget {
  Input,
  Textarea,
  Radio,
  Select,
  Checkbox,
  Date,
  Datetime,
  File,
}

impl Widget {
  /// Whether this widget can render an attribute of `kind`.
  ///
  /// A `checkbox` on a scalar number turns it into a boolean flag.
  pub fn supports(self, kind: AttributeType, is_collection: bool) -> bool {
    use AttributeType as T;
    match self {
      Self::Input => matches!(kind, T::String | T::Number),
      Self::Textarea => matches!(kind, T::String | T::Text),
      Self::Radio => kind == T::Choice && !is_collection,
      Self::Select => kind == T::Choice,
      Self::Checkbox => match kind {
        T::Choice => is_collection,
        T::Number => !is_collection,
        _ => false,
      },
      Self::Date => kind == T::Date,
      Self::Datetime => kind == T::Datetime,
      Self::File => kind == T::Blob,
    }
  }
}

/// Where a schema version is in its draft → published → retracted lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaStatus {
  Draft,
  Published,
  Retracted,
}

// ─── Choice ──────────────────────────────────────────────────────────────────

/// One permissible answer of a choice attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
  pub id:           i64,
  pub attribute_id: i64,
  /// Short code stored with answers, e.g. `"001"`.
  pub name:         String,
  pub title:        String,
  pub order:        i64,
  #[serde(default)]
  pub audit:        AuditStamp,
}

impl Choice {
  /// Shallow copy of the defining properties.
  pub fn to_new(&self) -> NewChoice {
    NewChoice { name: self.name.clone(), title: self.title.clone() }
  }
}

impl Auditable for Choice {
  fn audit_table(&self) -> AuditTable { AuditTable::Choice }

  fn audit_id(&self) -> i64 { self.id }
}

/// Input for a new choice; its order is its position among its siblings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewChoice {
  pub name:  String,
  pub title: String,
}

impl NewChoice {
  pub fn new(name: impl Into<String>, title: impl Into<String>) -> Self {
    Self { name: name.into(), title: title.into() }
  }
}

// ─── Attribute ───────────────────────────────────────────────────────────────

/// A persisted field definition within one schema version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
  pub id:                  i64,
  pub schema_id:           i64,
  /// The enclosing section, if any. Always in the same schema.
  pub parent_attribute_id: Option<i64>,
  pub name:                String,
  pub title:               String,
  pub description:         Option<String>,
  #[serde(rename = "type")]
  pub kind:                AttributeType,
  pub is_collection:       bool,
  pub is_required:         bool,
  pub is_private:          bool,
  pub is_readonly:         bool,
  pub is_system:           bool,
  pub is_shuffled:         bool,
  pub widget:              Option<Widget>,
  pub value_min:           Option<i64>,
  pub value_max:           Option<i64>,
  pub collection_min:      Option<i64>,
  pub collection_max:      Option<i64>,
  pub pattern:             Option<String>,
  pub decimal_places:      Option<u32>,
  /// Position in the schema-wide pre-order; unique per schema.
  pub order:               i64,
  /// Keyed by choice code.
  #[serde(default)]
  pub choices:             BTreeMap<String, Choice>,
  #[serde(default)]
  pub audit:               AuditStamp,
}

impl Attribute {
  /// Rename, enforcing the naming rules before anything is persisted.
  pub fn set_name(&mut self, name: impl Into<String>) -> Result<()> {
    let name = name.into();
    naming::validate_attribute_name(&name)?;
    self.name = name;
    Ok(())
  }

  pub fn is_section(&self) -> bool { self.kind == AttributeType::Section }

  /// A scalar number rendered as a checkbox reads back as a boolean.
  pub fn is_boolean_flag(&self) -> bool {
    self.kind == AttributeType::Number
      && !self.is_collection
      && self.widget == Some(Widget::Checkbox)
  }

  /// Choices sorted by their order.
  pub fn iterchoices(&self) -> impl Iterator<Item = &Choice> + Clone + '_ {
    let mut choices: Vec<&Choice> = self.choices.values().collect();
    choices.sort_by_key(|c| c.order);
    choices.into_iter()
  }

  pub fn choice_by_id(&self, id: i64) -> Option<&Choice> {
    self.choices.values().find(|c| c.id == id)
  }

  /// Shallow copy of the defining properties: no ids, order, choices,
  /// children, or audit columns.
  pub fn to_new(&self) -> NewAttribute {
    NewAttribute {
      name:           self.name.clone(),
      title:          self.title.clone(),
      description:    self.description.clone(),
      kind:           self.kind,
      is_collection:  self.is_collection,
      is_required:    self.is_required,
      is_private:     self.is_private,
      is_readonly:    self.is_readonly,
      is_system:      self.is_system,
      is_shuffled:    self.is_shuffled,
      widget:         self.widget,
      value_min:      self.value_min,
      value_max:      self.value_max,
      collection_min: self.collection_min,
      collection_max: self.collection_max,
      pattern:        self.pattern.clone(),
      decimal_places: self.decimal_places,
      choices:        Vec::new(),
      children:       Vec::new(),
    }
  }

  /// Check the attribute's own properties (name, bounds, widget, type
  /// settings). Sibling uniqueness is the schema's concern.
  pub fn validate(&self) -> Result<()> { self.to_new().validate_shallow() }
}

impl Auditable for Attribute {
  const DERIVED: &'static [&'static str] = &["choices"];

  fn audit_table(&self) -> AuditTable { AuditTable::Attribute }

  fn audit_id(&self) -> i64 { self.id }
}

/// Input for a new attribute, possibly with nested children and choices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAttribute {
  pub name:           String,
  pub title:          String,
  #[serde(default)]
  pub description:    Option<String>,
  #[serde(rename = "type")]
  pub kind:           AttributeType,
  #[serde(default)]
  pub is_collection:  bool,
  #[serde(default)]
  pub is_required:    bool,
  #[serde(default)]
  pub is_private:     bool,
  #[serde(default)]
  pub is_readonly:    bool,
  #[serde(default)]
  pub is_system:      bool,
  #[serde(default)]
  pub is_shuffled:    bool,
  #[serde(default)]
  pub widget:         Option<Widget>,
  #[serde(default)]
  pub value_min:      Option<i64>,
  #[serde(default)]
  pub value_max:      Option<i64>,
  #[serde(default)]
  pub collection_min: Option<i64>,
  #[serde(default)]
  pub collection_max: Option<i64>,
  #[serde(default)]
  pub pattern:        Option<String>,
  #[serde(default)]
  pub decimal_places: Option<u32>,
  #[serde(default)]
  pub choices:        Vec<NewChoice>,
  /// Only sections may have children.
  #[serde(default)]
  pub children:       Vec<NewAttribute>,
}

impl NewAttribute {
  /// Convenience constructor with every optional property unset.
  pub fn new(
    name: impl Into<String>,
    title: impl Into<String>,
    kind: AttributeType,
  ) -> Self {
    Self {
      name: name.into(),
      title: title.into(),
      description: None,
      kind,
      is_collection: false,
      is_required: false,
      is_private: false,
      is_readonly: false,
      is_system: false,
      is_shuffled: false,
      widget: None,
      value_min: None,
      value_max: None,
      collection_min: None,
      collection_max: None,
      pattern: None,
      decimal_places: None,
      choices: Vec::new(),
      children: Vec::new(),
    }
  }

  pub fn collection(mut self) -> Self {
    self.is_collection = true;
    self
  }

  pub fn with_choice(mut self, name: impl Into<String>, title: impl Into<String>) -> Self {
    self.choices.push(NewChoice::new(name, title));
    self
  }

  pub fn with_child(mut self, child: NewAttribute) -> Self {
    self.children.push(child);
    self
  }

  /// Validate this attribute and its whole subtree.
  pub fn validate(&self) -> Result<()> {
    self.validate_shallow()?;
    self.validate_choices()?;
    for child in &self.children {
      child.validate()?;
    }
    Ok(())
  }

  fn definition_error(&self, reason: impl Into<String>) -> Error {
    Error::AttributeDefinition { attribute: self.name.clone(), reason: reason.into() }
  }

  pub(crate) fn validate_shallow(&self) -> Result<()> {
    naming::validate_attribute_name(&self.name)?;

    if let (Some(min), Some(max)) = (self.value_min, self.value_max)
      && min > max
    {
      return Err(self.definition_error(format!("value_min {min} exceeds value_max {max}")));
    }
    if let (Some(min), Some(max)) = (self.collection_min, self.collection_max)
      && min >= max
    {
      return Err(self.definition_error(format!(
        "collection_min {min} must be less than collection_max {max}"
      )));
    }
    if (self.collection_min.is_some() || self.collection_max.is_some()) && !self.is_collection {
      return Err(self.definition_error("collection bounds on a scalar attribute"));
    }
    if self.decimal_places.is_some() && self.kind != AttributeType::Number {
      return Err(self.definition_error("decimal_places applies only to numbers"));
    }
    if let Some(widget) = self.widget
      && !widget.supports(self.kind, self.is_collection)
    {
      let shape = if self.is_collection { "collection" } else { "scalar" };
      return Err(self.definition_error(format!(
        "widget {widget} cannot render a {shape} {}",
        self.kind
      )));
    }
    if self.kind == AttributeType::Section {
      if self.is_collection {
        return Err(self.definition_error("sections cannot be collections"));
      }
      if self.value_min.is_some() || self.value_max.is_some() || self.pattern.is_some() {
        return Err(self.definition_error("sections hold no value to constrain"));
      }
    }
    if self.kind.is_temporal() {
      for bound in [self.value_min, self.value_max].into_iter().flatten() {
        if constraint::epoch(bound).is_none() {
          return Err(self.definition_error(format!("{bound} is not a representable timestamp")));
        }
      }
    }
    if let Some(pattern) = &self.pattern {
      constraint::compile_pattern(&self.name, pattern)?;
    }
    Ok(())
  }

  fn validate_choices(&self) -> Result<()> {
    if self.kind != AttributeType::Choice && !self.choices.is_empty() {
      return Err(self.definition_error("only choice attributes may have choices"));
    }
    if self.kind != AttributeType::Section && !self.children.is_empty() {
      return Err(self.definition_error("only sections may have children"));
    }
    let mut seen = HashSet::new();
    for choice in &self.choices {
      naming::validate_choice_name(&choice.name)?;
      if !seen.insert(choice.name.as_str()) {
        return Err(self.definition_error(format!("duplicate choice code {:?}", choice.name)));
      }
    }
    Ok(())
  }

  /// This attribute followed by all its descendants, in pre-order.
  pub fn iterlist(&self) -> impl Iterator<Item = &NewAttribute> + '_ {
    let mut stack = vec![self];
    std::iter::from_fn(move || {
      let next = stack.pop()?;
      stack.extend(next.children.iter().rev());
      Some(next)
    })
  }
}

// ─── Schema ──────────────────────────────────────────────────────────────────

/// One persisted version of a form definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
  pub id:             i64,
  pub name:           String,
  pub title:          String,
  pub description:    Option<String>,
  pub storage:        Storage,
  /// `None` while the schema is a draft.
  pub publish_date:   Option<NaiveDate>,
  pub retract_date:   Option<NaiveDate>,
  pub is_association: bool,
  pub categories:     BTreeSet<String>,
  /// Every attribute of this version at any depth, keyed by name.
  #[serde(default)]
  pub attributes:     BTreeMap<String, Attribute>,
  #[serde(default)]
  pub audit:          AuditStamp,
}

impl Schema {
  /// Rename, enforcing the naming rules before anything is persisted.
  pub fn set_name(&mut self, name: impl Into<String>) -> Result<()> {
    let name = name.into();
    naming::validate_schema_name(&name)?;
    self.name = name;
    Ok(())
  }

  pub fn status(&self) -> SchemaStatus {
    match (self.publish_date, self.retract_date) {
      (None, _) => SchemaStatus::Draft,
      (Some(_), None) => SchemaStatus::Published,
      (Some(_), Some(_)) => SchemaStatus::Retracted,
    }
  }

  /// Only currently published versions accept new entities.
  pub fn accepts_entities(&self) -> bool { self.status() == SchemaStatus::Published }

  pub fn attribute(&self, name: &str) -> Option<&Attribute> { self.attributes.get(name) }

  /// Case-insensitive lookup, matching how name uniqueness is enforced.
  pub fn attribute_ignore_case(&self, name: &str) -> Option<&Attribute> {
    self
      .attributes
      .values()
      .find(|a| a.name.eq_ignore_ascii_case(name))
  }

  pub fn attribute_by_id(&self, id: i64) -> Option<&Attribute> {
    self.attributes.values().find(|a| a.id == id)
  }

  pub fn has_private(&self) -> bool { self.attributes.values().any(|a| a.is_private) }

  /// Shallow copy of the header: no attributes, dates, or audit columns.
  pub fn to_new(&self) -> NewSchema {
    NewSchema {
      name:           self.name.clone(),
      title:          self.title.clone(),
      description:    self.description.clone(),
      storage:        self.storage,
      is_association: self.is_association,
      categories:     self.categories.clone(),
      attributes:     Vec::new(),
    }
  }

  /// Deep copy into the input for a new draft version. Publish and retract
  /// dates, ids, and audit columns never carry over.
  pub fn to_draft(&self) -> NewSchema {
    fn copy(schema: &Schema, attribute: &Attribute) -> NewAttribute {
      let mut new = attribute.to_new();
      new.choices = attribute.iterchoices().map(Choice::to_new).collect();
      new.children = schema
        .children_of(Some(attribute.id))
        .map(|child| copy(schema, child))
        .collect();
      new
    }

    let mut draft = self.to_new();
    draft.attributes = self.itertraverse().map(|a| copy(self, a)).collect();
    draft
  }

  /// Work out the effect of moving `attribute_id` (in `self`) under
  /// `new_parent_id` in `target`, which may be `self` or another schema.
  ///
  /// `None` as the new parent moves the attribute to the top level of its
  /// current schema.
  pub fn plan_reparent(
    &self,
    attribute_id: i64,
    target: &Schema,
    new_parent_id: Option<i64>,
  ) -> Result<Reparent> {
    let attribute = self.attribute_by_id(attribute_id).ok_or_else(|| Error::InvalidReparent {
      attribute: attribute_id.to_string(),
      reason:    format!("not an attribute of schema {:?}", self.name),
    })?;
    let invalid = |reason: String| Error::InvalidReparent {
      attribute: attribute.name.clone(),
      reason,
    };

    let subtree: Vec<i64> = std::iter::once(attribute.id)
      .chain(self.descendants_of(attribute.id).map(|a| a.id))
      .collect();

    let schema_id = match new_parent_id {
      None => self.id,
      Some(parent_id) => {
        let parent = target
          .attribute_by_id(parent_id)
          .ok_or_else(|| invalid(format!("no attribute {parent_id} in {:?}", target.name)))?;
        if !parent.is_section() {
          return Err(invalid(format!("{:?} is not a section", parent.name)));
        }
        if target.id == self.id && subtree.contains(&parent_id) {
          return Err(invalid(format!("{:?} is inside the moved subtree", parent.name)));
        }
        target.id
      }
    };

    if schema_id != self.id {
      for moved in &subtree {
        if let Some(a) = self.attribute_by_id(*moved)
          && target.attribute_ignore_case(&a.name).is_some()
        {
          return Err(invalid(format!("{:?} already defines {:?}", target.name, a.name)));
        }
      }
    }

    Ok(Reparent {
      attribute_id,
      parent_attribute_id: new_parent_id,
      schema_id,
      subtree,
    })
  }
}

impl Auditable for Schema {
  const DERIVED: &'static [&'static str] = &["attributes"];

  fn audit_table(&self) -> AuditTable { AuditTable::Schema }

  fn audit_id(&self) -> i64 { self.id }
}

/// The new state produced by [`Schema::plan_reparent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reparent {
  pub attribute_id:        i64,
  pub parent_attribute_id: Option<i64>,
  /// The schema every attribute in `subtree` belongs to afterwards.
  pub schema_id:           i64,
  /// The moved attribute and all its descendants, pre-order.
  pub subtree:             Vec<i64>,
}

/// Input for a new schema draft, with its attributes nested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSchema {
  pub name:           String,
  pub title:          String,
  #[serde(default)]
  pub description:    Option<String>,
  #[serde(default)]
  pub storage:        Storage,
  #[serde(default)]
  pub is_association: bool,
  #[serde(default)]
  pub categories:     BTreeSet<String>,
  #[serde(default)]
  pub attributes:     Vec<NewAttribute>,
}

impl NewSchema {
  pub fn new(name: impl Into<String>, title: impl Into<String>) -> Self {
    Self {
      name:           name.into(),
      title:          title.into(),
      description:    None,
      storage:        Storage::default(),
      is_association: false,
      categories:     BTreeSet::new(),
      attributes:     Vec::new(),
    }
  }

  pub fn with_attribute(mut self, attribute: NewAttribute) -> Self {
    self.attributes.push(attribute);
    self
  }

  /// Every attribute at any depth, in pre-order (the order they are numbered).
  pub fn iterlist(&self) -> impl Iterator<Item = &NewAttribute> + '_ {
    self.attributes.iter().flat_map(NewAttribute::iterlist)
  }

  /// Check names, definitions, and case-insensitive name uniqueness across
  /// the whole tree.
  pub fn validate(&self) -> Result<()> {
    naming::validate_schema_name(&self.name)?;
    let mut seen = HashSet::new();
    for attribute in &self.attributes {
      attribute.validate()?;
    }
    for attribute in self.iterlist() {
      if !seen.insert(attribute.name.to_ascii_lowercase()) {
        return Err(Error::NameValidation {
          name:   attribute.name.clone(),
          reason: format!("duplicate attribute name in schema {:?}", self.name),
        });
      }
    }
    Ok(())
  }
}

// ─── Summaries ───────────────────────────────────────────────────────────────

/// Per-name metadata for listing forms, derived across all versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSummary {
  pub name:        String,
  /// Title of the newest version.
  pub title:       String,
  /// Some version has a private (identifying) attribute.
  pub has_private: bool,
  /// Some entity of this form is linked to a randomization stratum.
  pub has_rand:    bool,
  /// Publish dates of all published versions, oldest first.
  pub versions:    Vec<NaiveDate>,
}
