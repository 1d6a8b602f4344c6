//! Typed attribute values and the nested tree an entity stores them in

use crate::entity::cast::is_falsy;
use crate::entity::collection::EntityCollection;
use crate::entity::resource::Entity;
use crate::entity::wrapper::ValueWrapper;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::borrow::Cow;

/// One node of an entity's attribute tree.
#[derive(Debug, Clone)]
pub enum Attribute {
    /// Primitive, array or plain object leaf
    Json(Value),
    /// Intermediate node created by a dotted cast path
    Tree(AttributeTree),
    Entity(Box<Entity>),
    Collection(Box<EntityCollection>),
    Wrapper(Box<dyn ValueWrapper>),
}

impl Default for Attribute {
    fn default() -> Self {
        Attribute::Json(Value::Null)
    }
}

impl Attribute {
    pub fn null() -> Self {
        Self::default()
    }

    /// Absence and explicit null are the same thing
    pub fn is_null(&self) -> bool {
        matches!(self, Attribute::Json(Value::Null))
    }

    /// `null`, `false`, `0`, `""` count as falsy; nodes that are objects never do
    pub fn is_falsy(&self) -> bool {
        match self {
            Attribute::Json(value) => is_falsy(value),
            _ => false,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Attribute::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_json().and_then(Value::as_str)
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_json().and_then(Value::as_i64)
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_json().and_then(Value::as_f64)
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_json().and_then(Value::as_bool)
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        self.as_json().and_then(Value::as_array)
    }

    pub fn as_object(&self) -> Option<&Map<String, Value>> {
        self.as_json().and_then(Value::as_object)
    }

    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Attribute::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    pub fn as_entity_mut(&mut self) -> Option<&mut Entity> {
        match self {
            Attribute::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&EntityCollection> {
        match self {
            Attribute::Collection(collection) => Some(collection),
            _ => None,
        }
    }

    pub fn as_collection_mut(&mut self) -> Option<&mut EntityCollection> {
        match self {
            Attribute::Collection(collection) => Some(collection),
            _ => None,
        }
    }

    pub fn as_wrapper(&self) -> Option<&dyn ValueWrapper> {
        match self {
            Attribute::Wrapper(wrapper) => Some(wrapper.as_ref()),
            _ => None,
        }
    }

    /// Downcast a wrapper node to its concrete type
    pub fn wrapper<T: ValueWrapper>(&self) -> Option<&T> {
        self.as_wrapper().and_then(|wrapper| wrapper.downcast_ref::<T>())
    }

    /// True for entity, collection and wrapper nodes
    pub fn is_instance(&self) -> bool {
        matches!(
            self,
            Attribute::Entity(_) | Attribute::Collection(_) | Attribute::Wrapper(_)
        )
    }

    /// Plain JSON projection, including local identity keys of nested entities
    pub fn to_json(&self) -> Value {
        self.project(true)
    }

    /// Plain JSON projection without local identity keys
    pub fn to_payload(&self) -> Value {
        self.project(false)
    }

    pub(crate) fn project(&self, with_key: bool) -> Value {
        match self {
            Attribute::Json(value) => value.clone(),
            Attribute::Tree(tree) => tree.project(with_key),
            Attribute::Entity(entity) => entity.project(with_key),
            Attribute::Collection(collection) => collection.project_items(with_key),
            Attribute::Wrapper(wrapper) => wrapper.to_json(),
        }
    }

    pub fn into_json(self) -> Value {
        match self {
            Attribute::Json(value) => value,
            other => other.to_json(),
        }
    }

    /// Nested lookup below this node
    pub fn lookup(&self, path: &str) -> Option<Cow<'_, Attribute>> {
        match self {
            Attribute::Tree(tree) => tree.lookup(path),
            Attribute::Json(value) => crate::query::path::lookup(value, path)
                .map(|found| Cow::Owned(Attribute::Json(found.clone()))),
            Attribute::Entity(entity) => entity.lookup(path),
            Attribute::Collection(collection) => {
                let (head, rest) = split_first(path);
                let item = collection.get(head.parse::<usize>().ok()?)?;
                match rest {
                    Some(rest) => item.lookup(rest),
                    None => Some(Cow::Owned(Attribute::Entity(Box::new(item.clone())))),
                }
            }
            Attribute::Wrapper(_) => None,
        }
    }

    /// Store `value` below this node, turning leaves into intermediate nodes as needed
    pub(crate) fn insert(&mut self, path: &str, value: Attribute) {
        match self {
            Attribute::Tree(tree) => tree.insert(path, value),
            Attribute::Entity(entity) => {
                entity.set(path, value);
            }
            Attribute::Collection(collection) => {
                let (head, rest) = split_first(path);
                let Ok(index) = head.parse::<usize>() else {
                    return;
                };
                match rest {
                    Some(rest) => {
                        collection.item_mut_or_insert(index).set(rest, value);
                    }
                    None => {
                        collection.add(value, Some(index));
                    }
                }
            }
            Attribute::Json(Value::Object(map)) => {
                let mut tree = AttributeTree::from_json_map(std::mem::take(map));
                tree.insert(path, value);
                *self = Attribute::Tree(tree);
            }
            _ => {
                let mut tree = AttributeTree::default();
                tree.insert(path, value);
                *self = Attribute::Tree(tree);
            }
        }
    }
}

impl PartialEq<Value> for Attribute {
    fn eq(&self, other: &Value) -> bool {
        match self {
            Attribute::Json(value) => value == other,
            _ => self.to_payload() == *other,
        }
    }
}

impl From<Value> for Attribute {
    fn from(value: Value) -> Self {
        Attribute::Json(value)
    }
}

impl From<&Value> for Attribute {
    fn from(value: &Value) -> Self {
        Attribute::Json(value.clone())
    }
}

impl From<Entity> for Attribute {
    fn from(entity: Entity) -> Self {
        Attribute::Entity(Box::new(entity))
    }
}

impl From<EntityCollection> for Attribute {
    fn from(collection: EntityCollection) -> Self {
        Attribute::Collection(Box::new(collection))
    }
}

impl From<Box<dyn ValueWrapper>> for Attribute {
    fn from(wrapper: Box<dyn ValueWrapper>) -> Self {
        Attribute::Wrapper(wrapper)
    }
}

impl From<&str> for Attribute {
    fn from(value: &str) -> Self {
        Attribute::Json(Value::from(value))
    }
}

impl From<String> for Attribute {
    fn from(value: String) -> Self {
        Attribute::Json(Value::from(value))
    }
}

impl From<i64> for Attribute {
    fn from(value: i64) -> Self {
        Attribute::Json(Value::from(value))
    }
}

impl From<i32> for Attribute {
    fn from(value: i32) -> Self {
        Attribute::Json(Value::from(value))
    }
}

impl From<f64> for Attribute {
    fn from(value: f64) -> Self {
        Attribute::Json(Value::from(value))
    }
}

impl From<bool> for Attribute {
    fn from(value: bool) -> Self {
        Attribute::Json(Value::from(value))
    }
}

/// Nested mapping from path segment to attribute, in insertion order
#[derive(Debug, Clone, Default)]
pub struct AttributeTree(IndexMap<String, Attribute>);

impl AttributeTree {
    pub fn new() -> Self {
        Self::default()
    }

    fn from_json_map(map: Map<String, Value>) -> Self {
        Self(
            map.into_iter()
                .map(|(key, value)| (key, Attribute::Json(value)))
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn lookup(&self, path: &str) -> Option<Cow<'_, Attribute>> {
        let (head, rest) = split_first(path);
        let node = self.0.get(head)?;
        match rest {
            Some(rest) => node.lookup(rest),
            None => Some(Cow::Borrowed(node)),
        }
    }

    /// Borrow a stored node, walking intermediate tree nodes only
    pub fn node(&self, path: &str) -> Option<&Attribute> {
        let (head, rest) = split_first(path);
        let node = self.0.get(head)?;
        match (rest, node) {
            (None, node) => Some(node),
            (Some(rest), Attribute::Tree(tree)) => tree.node(rest),
            (Some(rest), Attribute::Entity(entity)) => entity.attributes().node(rest),
            _ => None,
        }
    }

    pub fn node_mut(&mut self, path: &str) -> Option<&mut Attribute> {
        let (head, rest) = split_first(path);
        let node = self.0.get_mut(head)?;
        match (rest, node) {
            (None, node) => Some(node),
            (Some(rest), Attribute::Tree(tree)) => tree.node_mut(rest),
            (Some(rest), Attribute::Entity(entity)) => entity.attributes_mut().node_mut(rest),
            _ => None,
        }
    }

    pub fn insert(&mut self, path: &str, value: Attribute) {
        let (head, rest) = split_first(path);
        match rest {
            None => {
                self.0.insert(head.to_string(), value);
            }
            Some(rest) => self
                .0
                .entry(head.to_string())
                .or_insert_with(|| Attribute::Tree(AttributeTree::default()))
                .insert(rest, value),
        }
    }

    /// Detach the node stored at `path`
    pub fn remove(&mut self, path: &str) -> Option<Attribute> {
        let (head, rest) = split_first(path);
        match rest {
            None => self.0.shift_remove(head),
            Some(rest) => match self.0.get_mut(head)? {
                Attribute::Tree(tree) => tree.remove(rest),
                Attribute::Entity(entity) => entity.attributes_mut().remove(rest),
                _ => None,
            },
        }
    }

    pub fn to_json(&self) -> Value {
        self.project(true)
    }

    pub(crate) fn project(&self, with_key: bool) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(key, node)| (key.clone(), node.project(with_key)))
                .collect(),
        )
    }
}

pub(crate) fn split_first(path: &str) -> (&str, Option<&str>) {
    match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    }
}
