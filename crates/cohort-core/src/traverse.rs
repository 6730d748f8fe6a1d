//! Ordered traversal of a schema's attribute tree.
//!
//! Attributes are stored flat (keyed by name) with parent links; these
//! iterators recover the tree. Each call builds a fresh iterator, so a
//! traversal can be restarted any number of times.

use std::{collections::HashMap, ops::Deref};

use crate::schema::{Attribute, Choice, Schema};

/// Direct children of one node, sorted by order.
pub type Children<'s> = std::vec::IntoIter<&'s Attribute>;

/// Lazy pre-order walk over a subtree, sections included.
#[derive(Clone)]
pub struct PreOrder<'s> {
  children: HashMap<Option<i64>, Vec<&'s Attribute>>,
  stack:    Vec<&'s Attribute>,
}

impl<'s> PreOrder<'s> {
  fn new(schema: &'s Schema, root: Option<i64>) -> Self {
    let mut children: HashMap<Option<i64>, Vec<&'s Attribute>> = HashMap::new();
    for attribute in schema.attributes.values() {
      children
        .entry(attribute.parent_attribute_id)
        .or_default()
        .push(attribute);
    }
    for siblings in children.values_mut() {
      siblings.sort_by_key(|a| a.order);
    }
    let mut stack: Vec<&'s Attribute> = children.get(&root).cloned().unwrap_or_default();
    stack.reverse();
    Self { children, stack }
  }
}

impl<'s> Iterator for PreOrder<'s> {
  type Item = &'s Attribute;

  fn next(&mut self) -> Option<Self::Item> {
    let next = self.stack.pop()?;
    if let Some(kids) = self.children.get(&Some(next.id)) {
      self.stack.extend(kids.iter().rev());
    }
    Some(next)
  }
}

impl Schema {
  /// Direct children of `parent` (`None` for the top level), by order.
  pub fn children_of(&self, parent: Option<i64>) -> Children<'_> {
    let mut children: Vec<&Attribute> = self
      .attributes
      .values()
      .filter(|a| a.parent_attribute_id == parent)
      .collect();
    children.sort_by_key(|a| a.order);
    children.into_iter()
  }

  /// All attributes below `id`, pre-order, not including `id` itself.
  pub fn descendants_of(&self, id: i64) -> PreOrder<'_> { PreOrder::new(self, Some(id)) }

  /// Top-level attributes, by order.
  pub fn itertraverse(&self) -> Children<'_> { self.children_of(None) }

  /// Every attribute, sections included, in pre-order. This is the sequence
  /// `order` values follow, so renumbering after a structural edit walks it.
  pub fn iterlist(&self) -> PreOrder<'_> { PreOrder::new(self, None) }

  /// Every value-bearing attribute, in pre-order, recursing through sections.
  pub fn iterleafs(&self) -> impl Iterator<Item = &Attribute> + Clone + '_ {
    self.iterlist().filter(|a| !a.is_section())
  }

  /// A view of one attribute that can walk its own subtree.
  pub fn node(&self, name: &str) -> Option<AttributeNode<'_>> {
    self
      .attributes
      .get(name)
      .map(|attribute| AttributeNode { schema: self, attribute })
  }
}

/// An attribute together with the schema it belongs to.
#[derive(Debug, Clone, Copy)]
pub struct AttributeNode<'s> {
  schema:    &'s Schema,
  attribute: &'s Attribute,
}

impl<'s> AttributeNode<'s> {
  pub fn schema(&self) -> &'s Schema { self.schema }

  pub fn parent(&self) -> Option<AttributeNode<'s>> {
    let parent_id = self.attribute.parent_attribute_id?;
    self
      .schema
      .attribute_by_id(parent_id)
      .map(|attribute| AttributeNode { schema: self.schema, attribute })
  }

  pub fn itertraverse(&self) -> Children<'s> { self.schema.children_of(Some(self.attribute.id)) }

  pub fn iterlist(&self) -> PreOrder<'s> { self.schema.descendants_of(self.attribute.id) }

  pub fn iterleafs(&self) -> impl Iterator<Item = &'s Attribute> + Clone + 's {
    self.iterlist().filter(|a| !a.is_section())
  }

  pub fn iterchoices(&self) -> impl Iterator<Item = &'s Choice> + Clone + 's {
    self.attribute.iterchoices()
  }
}

impl Deref for AttributeNode<'_> {
  type Target = Attribute;

  fn deref(&self) -> &Attribute { self.attribute }
}

#[cfg(test)]
mod tests {
  use crate::schema::tests::sample_schema;

  fn names<'a>(it: impl Iterator<Item = &'a crate::schema::Attribute>) -> Vec<&'a str> {
    it.map(|a| a.name.as_str()).collect()
  }

  #[test]
  fn itertraverse_yields_direct_children_in_order() {
    let schema = sample_schema();
    assert_eq!(names(schema.itertraverse()), ["intro", "notes"]);
    let intro = schema.node("intro").unwrap();
    assert_eq!(names(intro.itertraverse()), ["age", "vitals"]);
  }

  #[test]
  fn traversal_is_restartable() {
    let schema = sample_schema();
    let walk = schema.iterlist();
    let first = names(walk.clone());
    let second = names(walk);
    assert_eq!(first, second);
    assert_eq!(first.len(), 5);
  }

  #[test]
  fn iterlist_is_full_preorder() {
    let schema = sample_schema();
    assert_eq!(names(schema.iterlist()), ["intro", "age", "vitals", "weight", "notes"]);
    let vitals = schema.node("vitals").unwrap();
    assert_eq!(names(vitals.iterlist()), ["weight"]);
  }

  #[test]
  fn iterleafs_skips_sections() {
    let schema = sample_schema();
    assert_eq!(names(schema.iterleafs()), ["age", "weight", "notes"]);
    let intro = schema.node("intro").unwrap();
    assert_eq!(names(intro.iterleafs()), ["age", "weight"]);
  }

  #[test]
  fn leaf_has_no_children_and_knows_parent() {
    let schema = sample_schema();
    let weight = schema.node("weight").unwrap();
    assert_eq!(weight.itertraverse().count(), 0);
    assert_eq!(weight.parent().unwrap().name, "vitals");
    assert!(schema.node("intro").unwrap().parent().is_none());
  }

  #[test]
  fn order_not_name_drives_sequence() {
    let mut schema = sample_schema();
    schema.attributes.get_mut("notes").unwrap().order = -1;
    assert_eq!(names(schema.itertraverse()), ["notes", "intro"]);
  }
}
