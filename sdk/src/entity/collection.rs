//! Ordered, paginated sequences of entities of one collector type

use crate::entity::attribute::Attribute;
use crate::entity::cast::to_js_string;
use crate::entity::pagination::{Pagination, page_number};
use crate::entity::resource::Entity;
use crate::entity::schema::{Model, Schema};
use crate::entity::types::{EntityError, EntityResult};
use crate::query::QueryBuilder;
use crate::transport::{ApiResponse, SharedTransport};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Positional access layered over a sequence.
///
/// Reads never fail: an unoccupied index yields a usable empty item. Writes
/// replace an occupied index and append otherwise.
pub trait IndexAccess {
    type Item: Clone;

    fn at(&self, index: usize) -> Cow<'_, Self::Item>;

    fn set_at(&mut self, index: usize, value: Attribute) -> &mut Self::Item;
}

/// `{value, text}` option produced by [`EntityCollection::pluck`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub value: Value,
    pub text: Value,
}

/// Outcome of saving one element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveOutcome {
    pub index: usize,
    pub failed: bool,
    pub response: ApiResponse,
}

/// Aggregated outcome of [`EntityCollection::save_each_one`], in element order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveReport {
    pub responses: Vec<SaveOutcome>,
    pub ok: bool,
    pub message: String,
}

impl SaveReport {
    pub fn failed(&self) -> impl Iterator<Item = &SaveOutcome> {
        self.responses.iter().filter(|outcome| outcome.failed)
    }
}

#[derive(Clone)]
pub struct EntityCollection {
    transport: SharedTransport,
    collector: Arc<Schema>,
    path: String,
    elements: Vec<Entity>,
    pagination: Pagination,
    query: QueryBuilder,
    loading: bool,
}

impl EntityCollection {
    /// Empty collection whose query starts with the collector's scope
    pub fn new(collector: Arc<Schema>, transport: SharedTransport) -> Self {
        let mut query = QueryBuilder::new();
        query.extend_from(collector.scope());
        Self {
            transport,
            path: collector.path().to_string(),
            collector,
            elements: Vec::new(),
            pagination: Pagination::default(),
            query,
            loading: false,
        }
    }

    pub fn of<M: Model>(transport: SharedTransport) -> Self {
        Self::new(M::schema(), transport)
    }

    pub fn from_items(collector: Arc<Schema>, transport: SharedTransport, items: &Value) -> Self {
        let mut collection = Self::new(collector, transport);
        collection.set_items(items);
        collection
    }

    /// Load from another endpoint than the collector's resource path
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.pagination.set_per_page(per_page);
        self
    }

    pub fn collector(&self) -> &Arc<Schema> {
        &self.collector
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn pagination(&self) -> &Pagination {
        &self.pagination
    }

    pub fn pagination_mut(&mut self) -> &mut Pagination {
        &mut self.pagination
    }

    pub fn query(&self) -> &QueryBuilder {
        &self.query
    }

    pub fn query_mut(&mut self) -> &mut QueryBuilder {
        &mut self.query
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn items(&self) -> &[Entity] {
        &self.elements
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entity> {
        self.elements.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Entity> {
        self.elements.iter_mut()
    }

    pub fn get(&self, index: usize) -> Option<&Entity> {
        self.elements.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Entity> {
        self.elements.get_mut(index)
    }

    fn blank(&self) -> Entity {
        Entity::empty(self.collector.clone(), self.transport.clone())
    }

    fn materialize(&self, item: Attribute) -> Entity {
        Entity::new(
            self.collector.clone(),
            self.transport.clone(),
            &item.into_json(),
        )
    }

    /// Replace every element with entities materialized from `items`
    pub fn set_items(&mut self, items: &Value) -> &mut Self {
        self.elements.clear();
        if let Value::Array(items) = items {
            for item in items {
                self.add(item, None);
            }
        }
        self
    }

    /// Materialize `item`; an occupied `index` is replaced, anything else appends
    pub fn add(&mut self, item: impl Into<Attribute>, index: Option<usize>) -> &mut Entity {
        let entity = self.materialize(item.into());
        match index {
            Some(index) if index < self.elements.len() => {
                self.elements[index] = entity;
                &mut self.elements[index]
            }
            _ => {
                let index = self.elements.len();
                self.elements.push(entity);
                &mut self.elements[index]
            }
        }
    }

    /// Append an entity of the collector type as is; anything else goes through `add`
    pub fn push(&mut self, item: impl Into<Attribute>) -> &mut Entity {
        match item.into() {
            Attribute::Entity(entity) if Arc::ptr_eq(entity.definition(), &self.collector) => {
                let index = self.elements.len();
                self.elements.push(*entity);
                &mut self.elements[index]
            }
            other => self.add(other, None),
        }
    }

    pub(crate) fn item_mut_or_insert(&mut self, index: usize) -> &mut Entity {
        if index >= self.elements.len() {
            return self.add(Value::Null, None);
        }
        &mut self.elements[index]
    }

    /// Element at `index`, or a fresh empty entity of the collector type
    pub fn find_by_index(&self, index: usize) -> Cow<'_, Entity> {
        match self.elements.get(index) {
            Some(entity) => Cow::Borrowed(entity),
            None => Cow::Owned(self.blank()),
        }
    }

    pub fn first(&self) -> Cow<'_, Entity> {
        self.find_by_index(0)
    }

    /// Element whose primary key equals `id`, or a fresh empty entity
    pub fn find_by_primary_key(&self, id: &Value) -> Cow<'_, Entity> {
        match self.position_by_primary_key(id) {
            Some(index) => Cow::Borrowed(&self.elements[index]),
            None => Cow::Owned(self.blank()),
        }
    }

    fn position_by_primary_key(&self, id: &Value) -> Option<usize> {
        let wanted = to_js_string(id);
        self.elements.iter().position(|entity| {
            entity
                .primary_key_value()
                .is_some_and(|pk| to_js_string(&pk) == wanted)
        })
    }

    fn position_by_key(&self, key: Uuid) -> Option<usize> {
        self.elements.iter().position(|entity| entity.key() == key)
    }

    /// Remove the element matching `entity` by primary key, or by local key
    /// when `entity` has no primary key yet. Returns whether anything was removed.
    pub fn remove(&mut self, entity: &Entity) -> bool {
        let position = match entity.primary_key_value() {
            Some(pk) => self.position_by_primary_key(&pk),
            None => self.position_by_key(entity.key()),
        };
        match position {
            Some(index) => {
                self.elements.remove(index);
                true
            }
            None => false,
        }
    }

    /// Remove the element with the same local key, failing when it is not a member
    pub fn take(&mut self, entity: &Entity) -> EntityResult<Entity> {
        match self.position_by_key(entity.key()) {
            Some(index) => Ok(self.elements.remove(index)),
            None => Err(EntityError::resource_not_exists(self.collector.name())),
        }
    }

    /// Membership by local key
    pub fn exists(&self, entity: &Entity) -> bool {
        self.position_by_key(entity.key()).is_some()
    }

    pub fn has_index(&self, index: usize) -> bool {
        index < self.elements.len()
    }

    pub fn offset(&self, index: usize) -> EntityResult<&Entity> {
        self.elements
            .get(index)
            .ok_or_else(|| EntityError::offset_not_exists(index))
    }

    pub fn delete_at(&mut self, index: usize) -> EntityResult<Entity> {
        if !self.has_index(index) {
            return Err(EntityError::offset_not_exists(index));
        }
        Ok(self.elements.remove(index))
    }

    /// `{value, text}` pairs read from each element, optionally led by an empty option
    pub fn pluck(
        &self,
        text_path: &str,
        value_path: &str,
        empty_text: Option<&str>,
        empty_value: Value,
    ) -> Vec<Choice> {
        self.pluck_with(|entity| entity.value(text_path), value_path, empty_text, empty_value)
    }

    /// Like [`EntityCollection::pluck`] with the text computed per element
    pub fn pluck_with<F>(
        &self,
        text: F,
        value_path: &str,
        empty_text: Option<&str>,
        empty_value: Value,
    ) -> Vec<Choice>
    where
        F: Fn(&Entity) -> Value,
    {
        let mut choices = Vec::with_capacity(self.elements.len() + 1);
        if let Some(empty_text) = empty_text.filter(|t| !t.is_empty()) {
            choices.push(Choice {
                value: empty_value,
                text: Value::String(empty_text.to_string()),
            });
        }
        choices.extend(self.elements.iter().map(|entity| Choice {
            value: entity.value(value_path),
            text: text(entity),
        }));
        choices
    }

    /// Fetch one page and replace the elements with it.
    ///
    /// `page` and `per_page` keep their current values when `None`.
    pub async fn paginate(
        &mut self,
        page: Option<u32>,
        per_page: Option<u32>,
        sort_by: &str,
        sort_desc: bool,
    ) -> EntityResult<&mut Self> {
        if let Some(per_page) = per_page {
            self.pagination.set_per_page(per_page);
        }
        if let Some(page) = page {
            self.pagination.set_current_page(page);
        }
        self.pagination.set_sort_by(sort_by).set_sort_desc(sort_desc);

        self.query
            .page(self.pagination.current_page())
            .per_page(self.pagination.per_page());
        if let Some(field) = self.pagination.sort_by() {
            self.query.sort_by(field, self.pagination.sort_desc());
        }

        let query = self.query.clone();
        let response = self.load(&query).await?;
        let data = response.data();
        if let Some(meta) = data.get("meta").filter(|meta| meta.is_object()) {
            self.pagination.fill(meta);
        }
        if let Some(items) = data.get("data").filter(|items| items.is_array()) {
            self.set_items(items);
        }
        Ok(self)
    }

    /// Paginate from route-style parameters:
    /// `currentPage`, `perPage`, `sortBy` (default `id`) and `sortDesc` (`"true"`)
    pub async fn paginate_from_query(&mut self, params: &Value) -> EntityResult<&mut Self> {
        let per_page = page_number(params, &["perPage", "per_page"]);
        let page = page_number(params, &["currentPage", "page"]);
        let sort_by = params
            .get("sortBy")
            .and_then(Value::as_str)
            .filter(|field| !field.is_empty())
            .unwrap_or("id")
            .to_string();
        let sort_desc = matches!(params.get("sortDesc"), Some(Value::String(s)) if s == "true")
            || matches!(params.get("sortDesc"), Some(Value::Bool(true)));
        self.paginate(page, per_page, &sort_by, sort_desc).await
    }

    /// Load options for a select input: the collection's conditions plus
    /// `key=true` and an optional search term.
    pub async fn dropdown(&mut self, search: Option<&str>, key: &str) -> EntityResult<&mut Self> {
        let mut query = QueryBuilder::new();
        query.where_path(key, true, false).extend_from(&self.query);
        if let Some(search) = search {
            query.query(search);
        }

        let response = self.load(&query).await?;
        if let Value::Array(_) = response.data() {
            self.set_items(response.data());
        }
        Ok(self)
    }

    async fn load(&mut self, query: &QueryBuilder) -> EntityResult<ApiResponse> {
        self.loading = true;
        debug!(collection = %self.collector.name(), path = %self.path, %query, "Loading collection");
        let result = self.transport.get(&self.path, query).await;
        self.loading = false;

        let response = result?;
        if response.failed() {
            return Err(EntityError::remote(
                self.collector.name(),
                response.status(),
                response.message(),
            ));
        }
        Ok(response)
    }

    /// Delete the element with primary key `id` remotely and drop it locally
    pub async fn delete_from_primary_key(&mut self, id: &Value) -> EntityResult<&mut Self> {
        let Some(index) = self.position_by_primary_key(id) else {
            return Err(EntityError::precondition(
                self.collector.name(),
                format!("no element with primary key {}", to_js_string(id)),
            ));
        };
        self.loading = true;
        let result = self.elements[index].delete().await;
        self.loading = false;
        result?;
        self.elements.remove(index);
        Ok(self)
    }

    /// Delete `entity` remotely when it has a primary key, then drop it locally
    pub async fn delete_from_entity(&mut self, entity: &mut Entity) -> EntityResult<&mut Self> {
        if entity.primary_key_value().is_some() {
            self.loading = true;
            let result = entity.delete().await;
            self.loading = false;
            result?;
        }
        self.remove(entity);
        Ok(self)
    }

    /// Save every element concurrently
    pub async fn save_each_one(&mut self) -> SaveReport {
        self.loading = true;
        let responses = join_all(self.elements.iter_mut().enumerate().map(
            |(index, entity)| async move {
                let saved = entity.save().await;
                SaveOutcome {
                    index,
                    failed: !saved,
                    response: entity.response().clone(),
                }
            },
        ))
        .await;
        self.loading = false;

        let ok = !responses.iter().any(|outcome| outcome.failed);
        if !ok {
            warn!(
                collection = %self.collector.name(),
                failed = responses.iter().filter(|outcome| outcome.failed).count(),
                "Some elements were not saved"
            );
        }
        SaveReport {
            responses,
            ok,
            message: if ok {
                "All resources saved.".to_string()
            } else {
                "There was an error saving your changes.".to_string()
            },
        }
    }

    pub fn to_json_items(&self) -> Value {
        self.project_items(true)
    }

    pub(crate) fn project_items(&self, with_key: bool) -> Value {
        Value::Array(
            self.elements
                .iter()
                .map(|entity| entity.project(with_key))
                .collect(),
        )
    }

    pub fn to_json(&self) -> Value {
        json!({
            "meta": self.pagination.to_json(),
            "items": self.to_json_items(),
        })
    }

    /// Drop the elements and go back to the scoped query and first page
    pub fn reset(&mut self) -> &mut Self {
        self.elements.clear();
        self.pagination.reset();
        self.query.reset().extend_from(self.collector.scope());
        self
    }

    pub fn abort(&mut self) -> &mut Self {
        self.transport.abort();
        self.loading = false;
        self
    }
}

impl IndexAccess for EntityCollection {
    type Item = Entity;

    fn at(&self, index: usize) -> Cow<'_, Entity> {
        self.find_by_index(index)
    }

    fn set_at(&mut self, index: usize, value: Attribute) -> &mut Entity {
        self.add(value, Some(index))
    }
}

impl<'a> IntoIterator for &'a EntityCollection {
    type Item = &'a Entity;
    type IntoIter = std::slice::Iter<'a, Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}

impl fmt::Debug for EntityCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityCollection")
            .field("collector", &self.collector.name())
            .field("path", &self.path)
            .field("len", &self.elements.len())
            .field("pagination", &self.pagination)
            .finish()
    }
}
