//! Entity: a typed, path-addressable record bound to a remote resource

use crate::entity::attribute::{Attribute, AttributeTree};
use crate::entity::cast::{self, is_falsy, to_js_string};
use crate::entity::collection::EntityCollection;
use crate::entity::schema::{Fillability, Model, Schema};
use crate::entity::types::{EntityError, EntityResult, LifecycleState};
use crate::entity::wrapper::ValueWrapper;
use crate::query::QueryBuilder;
use crate::query::path::{assign, lookup};
use crate::transport::{ApiResponse, SharedTransport, ValidationFeedback};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// Field carrying the local identity key in JSON projections
pub const KEY_FIELD: &str = "$key";

enum Request {
    Get(String),
    Post(String, Value),
}

impl Request {
    fn path(&self) -> &str {
        match self {
            Request::Get(path) | Request::Post(path, _) => path,
        }
    }
}

/// A hydrated instance of a declared model.
///
/// Attributes are addressed by dot paths and coerced through the casts of the
/// model's [`Schema`] on every write. Lifecycle operations take `&mut self`, so
/// at most one of them can be in flight per instance.
#[derive(Clone)]
pub struct Entity {
    key: Uuid,
    schema: Arc<Schema>,
    transport: SharedTransport,
    attributes: AttributeTree,
    response: ApiResponse,
    state: LifecycleState,
    query: QueryBuilder,
}

impl Entity {
    /// Build an instance: pristine typed tree first, then `fill(attributes)`
    pub fn new(schema: Arc<Schema>, transport: SharedTransport, attributes: &Value) -> Self {
        let pristine = schema.pristine(&transport);
        let mut entity = Self {
            key: Uuid::new_v4(),
            schema,
            transport,
            attributes: pristine,
            response: ApiResponse::default(),
            state: LifecycleState::Idle,
            query: QueryBuilder::new(),
        };
        entity.fill(attributes);
        entity
    }

    pub fn of<M: Model>(transport: SharedTransport, attributes: &Value) -> Self {
        Self::new(M::schema(), transport, attributes)
    }

    pub fn empty(schema: Arc<Schema>, transport: SharedTransport) -> Self {
        Self::new(schema, transport, &Value::Null)
    }

    /// Process-local identity, never sent to the server
    pub fn key(&self) -> Uuid {
        self.key
    }

    pub fn name(&self) -> &str {
        self.schema.name()
    }

    pub fn definition(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn is_a<M: Model>(&self) -> bool {
        Arc::ptr_eq(&self.schema, &M::schema())
    }

    pub fn transport(&self) -> &SharedTransport {
        &self.transport
    }

    pub fn attributes(&self) -> &AttributeTree {
        &self.attributes
    }

    pub(crate) fn attributes_mut(&mut self) -> &mut AttributeTree {
        &mut self.attributes
    }

    pub fn response(&self) -> &ApiResponse {
        &self.response
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.state
    }

    /// Extra conditions sent with `find_or_fail`
    pub fn query(&self) -> &QueryBuilder {
        &self.query
    }

    pub fn query_mut(&mut self) -> &mut QueryBuilder {
        &mut self.query
    }

    /// Sparse patch: every fillable path is read from `attributes`; a falsy
    /// incoming value never replaces a value that is already present.
    pub fn fill(&mut self, attributes: &Value) -> &mut Self {
        if attributes.is_null() {
            return self;
        }
        let schema = self.schema.clone();
        for path in schema.fillable() {
            let value = lookup(attributes, path).cloned().unwrap_or(Value::Null);
            if is_falsy(&value) && self.filled(path) {
                continue;
            }
            self.set(path, value);
        }
        self
    }

    /// Coerce and store `value`; writes to paths that are not fillable are ignored
    pub fn set(&mut self, path: &str, value: impl Into<Attribute>) -> &mut Self {
        let value = value.into();
        let schema = self.schema.clone();
        match schema.fillability(path) {
            Fillability::Direct => {
                let resolved = cast::resolve(&self.transport, path, schema.casts(), value);
                self.attributes.insert(path, resolved);
            }
            Fillability::Entity { prefix, rest } => {
                if let Some(nested) = self.materialize(prefix).and_then(Attribute::as_entity_mut) {
                    nested.set(rest, value);
                }
            }
            Fillability::CollectionItem {
                prefix,
                index,
                rest,
            } => {
                if let Some(collection) =
                    self.materialize(prefix).and_then(Attribute::as_collection_mut)
                {
                    match rest {
                        Some(rest) => {
                            collection.item_mut_or_insert(index).set(rest, value);
                        }
                        None => {
                            collection.add(value, Some(index));
                        }
                    }
                }
            }
            Fillability::Denied => {
                trace!(entity = %schema.name(), path, "Ignoring write to non-fillable path");
            }
        }
        self
    }

    /// Stored node at a declared nested path, created from its cast when absent
    fn materialize(&mut self, path: &str) -> Option<&mut Attribute> {
        let kind = self.schema.cast_for(path)?;
        let present = self.attributes.node(path).is_some_and(Attribute::is_instance);
        if !present {
            let resolved = cast::cast(&self.transport, kind, Attribute::null());
            self.attributes.insert(path, resolved);
        }
        self.attributes.node_mut(path)
    }

    /// Raw stored value, without any default fallback
    pub fn lookup(&self, path: &str) -> Option<Cow<'_, Attribute>> {
        self.attributes.lookup(path)
    }

    /// Stored value unless it is absent or falsy; then the declared default,
    /// then the stored value itself.
    pub fn get(&self, path: &str) -> Cow<'_, Attribute> {
        self.get_with(path, None)
    }

    /// Like [`Entity::get`] with a caller supplied fallback after the declared default
    pub fn get_or(&self, path: &str, default: impl Into<Value>) -> Cow<'_, Attribute> {
        self.get_with(path, Some(default.into()))
    }

    fn get_with(&self, path: &str, default: Option<Value>) -> Cow<'_, Attribute> {
        match self.lookup(path) {
            Some(found) if !found.is_falsy() => found,
            stored => {
                if let Some(fallback) = self.schema.default_for(path) {
                    let raw = Attribute::Json(fallback.clone());
                    return Cow::Owned(cast::resolve(
                        &self.transport,
                        path,
                        self.schema.casts(),
                        raw,
                    ));
                }
                if let Some(default) = default {
                    return Cow::Owned(Attribute::Json(default));
                }
                stored.unwrap_or_else(|| Cow::Owned(Attribute::null()))
            }
        }
    }

    /// Plain JSON of [`Entity::get`]
    pub fn value(&self, path: &str) -> Value {
        self.get(path).to_json()
    }

    /// Stored value is present and not null
    pub fn filled(&self, path: &str) -> bool {
        self.lookup(path).is_some_and(|found| !found.is_null())
    }

    pub fn entity(&self, path: &str) -> Option<&Entity> {
        self.attributes.node(path).and_then(Attribute::as_entity)
    }

    /// Nested entity at a declared path, created empty when absent
    pub fn entity_mut(&mut self, path: &str) -> Option<&mut Entity> {
        self.materialize(path).and_then(Attribute::as_entity_mut)
    }

    pub fn collection(&self, path: &str) -> Option<&EntityCollection> {
        self.attributes.node(path).and_then(Attribute::as_collection)
    }

    pub fn collection_mut(&mut self, path: &str) -> Option<&mut EntityCollection> {
        self.materialize(path).and_then(Attribute::as_collection_mut)
    }

    pub fn wrapper<T: ValueWrapper>(&self, path: &str) -> Option<&T> {
        self.attributes.node(path).and_then(Attribute::wrapper::<T>)
    }

    /// Plain shape of this type with defaults resolved, expanding nested
    /// entities `depth` levels deep
    pub fn schema(&self, depth: usize) -> Value {
        self.schema.shape(&self.transport, depth)
    }

    /// Projection including `$key` at every level
    pub fn to_json(&self) -> Value {
        self.project(true)
    }

    /// Projection sent to the server
    pub fn to_payload(&self) -> Value {
        self.project(false)
    }

    /// Walks the declared cast paths only; fillable paths without a cast stay local
    pub(crate) fn project(&self, with_key: bool) -> Value {
        let mut out = Value::Object(Map::new());
        for path in self.schema.casts().keys() {
            assign(&mut out, path, self.get(path).project(with_key));
        }
        if with_key {
            if let Value::Object(map) = &mut out {
                map.insert(KEY_FIELD.to_string(), Value::String(self.key.to_string()));
            }
        }
        out
    }

    /// Remote identity; falsy values count as unset
    pub fn primary_key_value(&self) -> Option<Value> {
        self.lookup(self.schema.primary_key())
            .map(|found| found.to_payload())
            .filter(|value| !is_falsy(value))
    }

    /// Fill from another entity's projection
    pub fn merge(&mut self, other: &Entity) -> &mut Self {
        let attributes = other.to_json();
        self.fill(&attributes)
    }

    /// Same type and attributes under a new local key
    pub fn replicate(&self) -> Entity {
        let mut copy = Entity::new(self.schema.clone(), self.transport.clone(), &self.to_json());
        copy.query = self.query.clone();
        copy
    }

    fn clear_primary_key(&mut self) {
        let primary_key = self.schema.primary_key().to_string();
        let cleared = cast::resolve(
            &self.transport,
            &primary_key,
            self.schema.casts(),
            Attribute::null(),
        );
        self.attributes.insert(&primary_key, cleared);
    }

    fn resource_path(&self, id: Option<&Value>) -> String {
        let base = self.schema.path().trim_end_matches('/');
        match id {
            Some(id) => format!("{base}/{}", to_js_string(id)),
            None => base.to_string(),
        }
    }

    fn ensure_idle(&self) -> EntityResult<()> {
        if self.state.is_idle() {
            Ok(())
        } else {
            Err(EntityError::busy(self.name(), self.state))
        }
    }

    fn require_primary_key(&self, operation: &str) -> EntityResult<Value> {
        self.primary_key_value().ok_or_else(|| {
            EntityError::precondition(
                self.name(),
                format!("{operation} requires a primary key value"),
            )
        })
    }

    async fn dispatch(&mut self, state: LifecycleState, request: Request) -> EntityResult<()> {
        self.ensure_idle()?;
        self.response.reset();
        self.state = state;
        debug!(entity = %self.name(), %state, path = request.path(), "Dispatching request");

        let result = match &request {
            Request::Get(path) => self.transport.get(path, &self.query).await,
            Request::Post(path, body) => {
                self.transport.post(path, body, &QueryBuilder::new()).await
            }
        };

        // Back to idle on every path before anything is reported
        self.state = LifecycleState::Idle;
        self.response = match result {
            Ok(response) => response,
            Err(e) => {
                let error = EntityError::from(e);
                self.response = ApiResponse::unreachable(&error.to_string());
                return Err(error);
            }
        };

        if self.response.failed() {
            return Err(EntityError::remote(
                self.name(),
                self.response.status(),
                self.response.message(),
            ));
        }
        Ok(())
    }

    fn fill_from_response(&mut self) {
        let data = self.response.data().clone();
        self.fill(&data);
    }

    /// Load `{path}/{id}` and fill from the answer
    pub async fn find_or_fail(&mut self, id: impl Into<Value>) -> EntityResult<()> {
        let id = id.into();
        if is_falsy(&id) {
            return Err(EntityError::precondition(self.name(), "find_or_fail requires an id"));
        }
        self.ensure_idle()?;
        let path = self.resource_path(Some(&id));
        self.dispatch(LifecycleState::Fetching, Request::Get(path)).await?;
        self.fill_from_response();
        Ok(())
    }

    /// Fill with `attributes`, POST the payload and fill from the answer
    pub async fn create(&mut self, attributes: &Value) -> EntityResult<()> {
        self.ensure_idle()?;
        self.fill(attributes);
        let body = self.to_payload();
        let path = self.resource_path(None);
        self.dispatch(LifecycleState::Creating, Request::Post(path, body)).await?;
        self.fill_from_response();
        Ok(())
    }

    pub async fn update(&mut self) -> EntityResult<()> {
        let id = self.require_primary_key("update")?;
        self.ensure_idle()?;
        let body = self.spoofed_payload("PUT");
        let path = self.resource_path(Some(&id));
        self.dispatch(LifecycleState::Updating, Request::Post(path, body)).await?;
        self.fill_from_response();
        Ok(())
    }

    pub async fn delete(&mut self) -> EntityResult<()> {
        let id = self.require_primary_key("delete")?;
        self.ensure_idle()?;
        let body = self.spoofed_payload("DELETE");
        let path = self.resource_path(Some(&id));
        self.dispatch(LifecycleState::Deleting, Request::Post(path, body)).await
    }

    /// Update when a primary key is set, create otherwise. Failures are logged
    /// and reported as `false`.
    pub async fn save(&mut self) -> bool {
        let result = if self.primary_key_value().is_some() {
            self.update().await
        } else {
            self.create(&Value::Null).await
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(entity = %self.name(), error = %e, "Save failed");
                false
            }
        }
    }

    /// Save a copy without primary key, patched with `attributes`
    pub async fn duplicate(&self, attributes: &Value) -> (Entity, bool) {
        let mut copy = self.replicate();
        copy.clear_primary_key();
        copy.fill(attributes);
        let saved = copy.save().await;
        (copy, saved)
    }

    fn spoofed_payload(&self, method: &str) -> Value {
        let mut body = self.to_payload();
        if let Value::Object(map) = &mut body {
            map.insert("_method".to_string(), Value::String(method.to_string()));
        }
        body
    }

    /// Cancel requests in flight on the shared transport
    pub fn abort(&mut self) -> &mut Self {
        self.transport.abort();
        self.state = LifecycleState::Idle;
        self
    }

    /// Back to the pristine typed tree with an empty response
    pub fn reset(&mut self) -> &mut Self {
        self.attributes = self.schema.pristine(&self.transport);
        self.response.reset();
        self.state = LifecycleState::Idle;
        self
    }

    pub fn is_fetching(&self) -> bool {
        self.state == LifecycleState::Fetching
    }

    pub fn is_creating(&self) -> bool {
        self.state == LifecycleState::Creating
    }

    pub fn is_updating(&self) -> bool {
        self.state == LifecycleState::Updating
    }

    pub fn is_deleting(&self) -> bool {
        self.state == LifecycleState::Deleting
    }

    pub fn is_saving(&self) -> bool {
        self.state.is_saving()
    }

    pub fn failed(&self) -> bool {
        self.response.failed()
    }

    pub fn failed_message(&self) -> &str {
        self.response.message()
    }

    pub fn failed_code(&self) -> u16 {
        self.response.status()
    }

    pub fn failed_by_session_expire(&self) -> bool {
        self.response.failed_by_session_expire()
    }

    pub fn fail(&self, path: &str) -> bool {
        self.response.fail(path)
    }

    pub fn state(&self, path: &str) -> Option<bool> {
        self.response.state(path)
    }

    pub fn feedback(&self, path: &str) -> String {
        self.response.feedback(path)
    }

    pub fn validation(&self, path: &str) -> Option<ValidationFeedback> {
        self.response.validation(path)
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("type", &self.schema.name())
            .field("key", &self.key)
            .field("state", &self.state)
            .field("attributes", &self.attributes.to_json())
            .finish()
    }
}
