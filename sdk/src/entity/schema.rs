//! Per-type entity declarations: casts, fillable paths, defaults and scope

use crate::entity::attribute::{Attribute, AttributeTree};
use crate::entity::cast::{self, CastKind, Casts};
use crate::entity::types::{EntityError, EntityResult};
use crate::query::{AttributePath, QueryBuilder};
use crate::query::path::{assign, lookup};
use crate::transport::SharedTransport;
use dashmap::DashMap;
use indexmap::IndexSet;
use serde_json::{Map, Value};
use std::any::{TypeId, type_name};
use std::sync::{Arc, LazyLock};

/// Declares an entity type.
///
/// ```ignore
/// struct User;
///
/// impl Model for User {
///     fn define() -> Definition {
///         Definition::new("User")
///             .path("/users")
///             .cast("id", CastKind::Id)
///             .cast("name", CastKind::String)
///             .cast("address", CastKind::entity::<Address>())
///     }
/// }
/// ```
pub trait Model: 'static {
    fn define() -> Definition;

    /// Built once per type and shared by every instance
    fn schema() -> Arc<Schema>
    where
        Self: Sized,
    {
        schema_of::<Self>()
    }

    fn try_schema() -> EntityResult<Arc<Schema>>
    where
        Self: Sized,
    {
        try_schema_of::<Self>()
    }
}

static SCHEMAS: LazyLock<DashMap<TypeId, Arc<Schema>>> = LazyLock::new(DashMap::new);

/// Look up or build the schema of a model type.
///
/// # Panics
///
/// Panics when the model declares a malformed path or defaults that nest the
/// type within itself. Declarations are static program text, so this is a
/// programming error rather than a runtime one.
pub fn schema_of<M: Model>() -> Arc<Schema> {
    match try_schema_of::<M>() {
        Ok(schema) => schema,
        Err(e) => panic!("invalid model definition for {}: {e}", type_name::<M>()),
    }
}

/// Fallible form of [`schema_of`].
///
/// Nested model types are resolved right after the outer one is registered,
/// so a malformed nested declaration surfaces on first use of the outer type
/// instead of on the first nested write.
pub fn try_schema_of<M: Model>() -> EntityResult<Arc<Schema>> {
    let id = TypeId::of::<M>();
    if let Some(schema) = SCHEMAS.get(&id) {
        return Ok(schema.value().clone());
    }
    // Built outside the map lock; registering before the nested walk ends cycles
    let built = Arc::new(M::define().build()?);
    let schema = SCHEMAS.entry(id).or_insert(built).value().clone();
    for kind in schema.casts().values() {
        let _ = kind.nested_schema();
    }
    if defaults_nest_within(&schema) {
        SCHEMAS.remove(&id);
        return Err(EntityError::configuration(format!(
            "defaults of '{}' nest an instance of the type within itself",
            schema.name()
        )));
    }
    Ok(schema)
}

/// Whether following defaulted entity casts from `root` leads back to `root`.
/// Every fresh instance of such a type would carry an endless chain of
/// nested defaults.
fn defaults_nest_within(root: &Arc<Schema>) -> bool {
    let mut pending = vec![root.clone()];
    let mut seen: Vec<Arc<Schema>> = Vec::new();
    while let Some(schema) = pending.pop() {
        for (path, kind) in schema.casts() {
            if !kind.is_entity_cast() || schema.default_for(path).is_none() {
                continue;
            }
            let Some(nested) = kind.nested_schema() else {
                continue;
            };
            if Arc::ptr_eq(&nested, root) {
                return true;
            }
            if !seen.iter().any(|known| Arc::ptr_eq(known, &nested)) {
                seen.push(nested.clone());
                pending.push(nested);
            }
        }
    }
    false
}

/// Builder for a [`Schema`]
#[derive(Debug)]
pub struct Definition {
    name: String,
    path: String,
    primary_key: String,
    casts: Casts,
    fillable: IndexSet<String>,
    defaults: Value,
    scope: QueryBuilder,
    error: Option<EntityError>,
}

impl Definition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: String::new(),
            primary_key: "id".to_string(),
            casts: Casts::new(),
            fillable: IndexSet::new(),
            defaults: Value::Object(Map::new()),
            scope: QueryBuilder::new(),
            error: None,
        }
    }

    /// Remote resource path, e.g. `/users`
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn primary_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        if self.check(&key) {
            self.primary_key = key;
        }
        self
    }

    /// Declare a cast; the path becomes fillable too
    pub fn cast(mut self, path: impl Into<String>, kind: CastKind) -> Self {
        let path = path.into();
        if self.check(&path) {
            self.fillable.insert(path.clone());
            self.casts.insert(path, kind);
        }
        self
    }

    pub fn fillable<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for path in paths {
            let path = path.into();
            if self.check(&path) {
                self.fillable.insert(path);
            }
        }
        self
    }

    /// Default value for one path, used at construction and by `get`
    pub fn default_value(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        let path = path.into();
        if self.check(&path) {
            assign(&mut self.defaults, &path, value.into());
        }
        self
    }

    /// Merge a nested defaults tree
    pub fn defaults(mut self, defaults: Value) -> Self {
        if let Value::Object(map) = defaults {
            for (key, value) in map {
                if self.check(&key) {
                    assign(&mut self.defaults, &key, value);
                }
            }
        }
        self
    }

    /// Condition applied to every collection query of this type
    pub fn scope(mut self, path: &str, value: impl Into<Value>) -> Self {
        self.scope.append(path, value);
        self
    }

    fn check(&mut self, path: &str) -> bool {
        match AttributePath::parse(path) {
            Ok(_) => true,
            Err(e) => {
                self.error.get_or_insert(e);
                false
            }
        }
    }

    pub fn build(self) -> EntityResult<Schema> {
        if let Some(error) = self.error {
            return Err(error);
        }
        if self.name.is_empty() {
            return Err(EntityError::configuration("model name is empty"));
        }
        Ok(Schema {
            name: self.name,
            path: self.path,
            primary_key: self.primary_key,
            casts: self.casts,
            fillable: self.fillable,
            defaults: self.defaults,
            scope: self.scope,
        })
    }
}

/// How a write to a path is routed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fillability<'p> {
    /// Declared on this type
    Direct,
    /// Accepted by the nested entity cast at `prefix`
    Entity { prefix: &'p str, rest: &'p str },
    /// Addresses one element of the collection cast at `prefix`
    CollectionItem {
        prefix: &'p str,
        index: usize,
        rest: Option<&'p str>,
    },
    Denied,
}

/// Immutable declaration of an entity type
#[derive(Debug, Clone)]
pub struct Schema {
    name: String,
    path: String,
    primary_key: String,
    casts: Casts,
    fillable: IndexSet<String>,
    defaults: Value,
    scope: QueryBuilder,
}

impl Schema {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn casts(&self) -> &Casts {
        &self.casts
    }

    pub fn cast_for(&self, path: &str) -> Option<&CastKind> {
        self.casts.get(path)
    }

    pub fn fillable(&self) -> impl Iterator<Item = &str> {
        self.fillable.iter().map(String::as_str)
    }

    pub fn is_fillable(&self, path: &str) -> bool {
        self.fillable.contains(path)
    }

    pub fn defaults(&self) -> &Value {
        &self.defaults
    }

    pub fn default_for(&self, path: &str) -> Option<&Value> {
        lookup(&self.defaults, path)
    }

    pub fn scope(&self) -> &QueryBuilder {
        &self.scope
    }

    /// Decide whether and how a write to `path` is accepted
    pub fn fillability<'p>(&self, path: &'p str) -> Fillability<'p> {
        if self.is_fillable(path) {
            return Fillability::Direct;
        }
        for (dot, _) in path.match_indices('.') {
            let (prefix, rest) = (&path[..dot], &path[dot + 1..]);
            match self.casts.get(prefix) {
                Some(CastKind::Entity(nested)) => {
                    if nested().accepts(rest) {
                        return Fillability::Entity { prefix, rest };
                    }
                }
                Some(CastKind::Collection(nested)) => {
                    let (head, tail) = match rest.split_once('.') {
                        Some((head, tail)) => (head, Some(tail)),
                        None => (rest, None),
                    };
                    let Ok(index) = head.parse::<usize>() else {
                        continue;
                    };
                    if tail.is_none_or(|tail| nested().accepts(tail)) {
                        return Fillability::CollectionItem {
                            prefix,
                            index,
                            rest: tail,
                        };
                    }
                }
                _ => {}
            }
        }
        Fillability::Denied
    }

    pub fn accepts(&self, path: &str) -> bool {
        self.fillability(path) != Fillability::Denied
    }

    /// Fresh attribute tree with every cast default resolved.
    ///
    /// Entity casts without a default stay absent and are materialized on
    /// first write, so self-referencing types do not recurse. Defaulted entity
    /// casts never lead back to their own type; registration rejects that.
    pub(crate) fn pristine(&self, transport: &SharedTransport) -> AttributeTree {
        let mut tree = AttributeTree::new();
        for (path, kind) in &self.casts {
            let default = self.default_for(path).cloned();
            if kind.is_entity_cast() && default.is_none() {
                continue;
            }
            let raw = Attribute::Json(default.unwrap_or(Value::Null));
            tree.insert(path, cast::cast(transport, kind, raw));
        }
        tree
    }

    /// Plain shape of this type with defaults resolved; nested entities are
    /// expanded down to `depth` levels and become null below that.
    pub(crate) fn shape(&self, transport: &SharedTransport, depth: usize) -> Value {
        let mut out = Value::Object(Map::new());
        for (path, kind) in &self.casts {
            let value = match kind {
                CastKind::Entity(nested) if depth > 0 => nested().shape(transport, depth - 1),
                CastKind::Entity(_) => Value::Null,
                _ => {
                    let raw = Attribute::Json(self.default_for(path).cloned().unwrap_or(Value::Null));
                    cast::cast(transport, kind, raw).to_payload()
                }
            };
            assign(&mut out, path, value);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Address;

    impl Model for Address {
        fn define() -> Definition {
            Definition::new("Address")
                .cast("city", CastKind::String)
                .cast("zip", CastKind::String)
        }
    }

    struct Tag;

    impl Model for Tag {
        fn define() -> Definition {
            Definition::new("Tag").cast("label", CastKind::String)
        }
    }

    struct Node;

    impl Model for Node {
        fn define() -> Definition {
            Definition::new("Node")
                .path("/nodes")
                .cast("id", CastKind::Id)
                .cast("parent", CastKind::entity::<Node>())
                .cast("address", CastKind::entity::<Address>())
                .cast("tags", CastKind::collection::<Tag>())
                .cast("meta.score", CastKind::Decimal)
                .fillable(["note", "note"])
                .default_value("meta.score", 1.5)
        }
    }

    #[test]
    fn test_definition_collects_fillable_in_order() {
        let schema = Node::schema();
        let fillable: Vec<_> = schema.fillable().collect();
        assert_eq!(
            fillable,
            vec!["id", "parent", "address", "tags", "meta.score", "note"]
        );
        assert_eq!(schema.primary_key(), "id");
        assert_eq!(schema.path(), "/nodes");
        assert_eq!(schema.default_for("meta.score"), Some(&json!(1.5)));
    }

    #[test]
    fn test_schema_is_shared() {
        assert!(Arc::ptr_eq(&Node::schema(), &Node::schema()));
    }

    #[test]
    fn test_invalid_path_is_rejected() {
        let err = Definition::new("Broken").cast("a..b", CastKind::String).build();
        assert!(matches!(err, Err(EntityError::InvalidPath { .. })));
        assert!(Definition::new("").build().is_err());

        let err = Definition::new("Broken")
            .defaults(json!({ "a..b": 1, "ok": 2 }))
            .build();
        assert!(matches!(err, Err(EntityError::InvalidPath { .. })));
    }

    struct Malformed;

    impl Model for Malformed {
        fn define() -> Definition {
            Definition::new("Malformed").default_value("x..y", 1)
        }
    }

    struct HoldsMalformed;

    impl Model for HoldsMalformed {
        fn define() -> Definition {
            Definition::new("HoldsMalformed").cast("inner", CastKind::entity::<Malformed>())
        }
    }

    #[test]
    fn test_try_schema_reports_malformed_definition() {
        assert!(matches!(
            Malformed::try_schema(),
            Err(EntityError::InvalidPath { .. })
        ));
    }

    #[test]
    #[should_panic(expected = "invalid model definition")]
    fn test_nested_definition_is_checked_with_outer_type() {
        HoldsMalformed::schema();
    }

    struct Chain;

    impl Model for Chain {
        fn define() -> Definition {
            Definition::new("Chain")
                .cast("name", CastKind::String)
                .cast("parent", CastKind::entity::<Chain>())
                .default_value("parent.name", "root")
        }
    }

    struct Shelf;

    impl Model for Shelf {
        fn define() -> Definition {
            Definition::new("Shelf")
                .cast("label", CastKind::String)
                .cast("parent", CastKind::entity::<Shelf>())
                .cast("address", CastKind::entity::<Address>())
                .default_value("address.city", "Porto")
        }
    }

    #[test]
    fn test_self_referencing_default_is_rejected() {
        assert!(matches!(
            Chain::try_schema(),
            Err(EntityError::Configuration { .. })
        ));
        // Not left behind half registered
        assert!(Chain::try_schema().is_err());
    }

    #[test]
    fn test_defaults_on_other_nested_types_are_accepted() {
        let schema = Shelf::try_schema().unwrap();
        let transport: SharedTransport = Arc::new(crate::testing::MemoryTransport::new());
        let tree = schema.pristine(&transport);
        assert!(tree.node("parent").is_none());
        assert_eq!(
            tree.lookup("address.city").map(|value| value.to_json()),
            Some(json!("Porto"))
        );
    }

    #[test]
    fn test_fillability_routes_nested_writes() {
        let schema = Node::schema();
        assert_eq!(schema.fillability("note"), Fillability::Direct);
        assert_eq!(
            schema.fillability("address.city"),
            Fillability::Entity {
                prefix: "address",
                rest: "city"
            }
        );
        assert_eq!(
            schema.fillability("parent.address.zip"),
            Fillability::Entity {
                prefix: "parent",
                rest: "address.zip"
            }
        );
        assert_eq!(
            schema.fillability("tags.2.label"),
            Fillability::CollectionItem {
                prefix: "tags",
                index: 2,
                rest: Some("label")
            }
        );
        assert_eq!(schema.fillability("address.country"), Fillability::Denied);
        assert_eq!(schema.fillability("tags.x.label"), Fillability::Denied);
        assert_eq!(schema.fillability("secret"), Fillability::Denied);
    }
}
