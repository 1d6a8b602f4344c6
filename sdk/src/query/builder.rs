//! Fluent filter/sort/paging accumulator serialized as a bracket-notation query string

use super::path::{assign, to_dot_path, to_query_key};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::fmt;

/// Ordered multi-map from query key to one or many values.
///
/// Keys are stored in bracket notation (`sort[by]`), the form they take on the
/// wire. Insertion order is preserved across keys and across repeated values
/// of the same key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryBuilder {
    entries: Vec<(String, Value)>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a flat `a[b]=1&a[b]=2` query string. Values stay strings.
    pub fn parse(query: &str) -> Self {
        let mut builder = Self::new();
        for pair in query.trim_start_matches('?').split('&') {
            if pair.is_empty() {
                continue;
            }
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = decode_component(key);
            if key.is_empty() {
                continue;
            }
            builder
                .entries
                .push((key, Value::String(decode_component(value))));
        }
        builder
    }

    /// Build from a nested mapping, the inverse of [`QueryBuilder::to_json`].
    pub fn from_json(tree: &Value) -> Self {
        let mut builder = Self::new();
        if let Value::Object(map) = tree {
            builder.where_all(map);
        }
        builder
    }

    /// Check whether a dot path is present
    pub fn has(&self, path: &str) -> bool {
        let key = to_query_key(path);
        self.entries.iter().any(|(k, _)| *k == key)
    }

    /// All values stored under a dot path, in insertion order
    pub fn values(&self, path: &str) -> Vec<&Value> {
        let key = to_query_key(path);
        self.entries
            .iter()
            .filter(|(k, _)| *k == key)
            .map(|(_, v)| v)
            .collect()
    }

    /// First value stored under a dot path
    pub fn first(&self, path: &str) -> Option<&Value> {
        let key = to_query_key(path);
        self.entries.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    /// Remove every value stored under a dot path
    pub fn remove(&mut self, path: &str) -> &mut Self {
        let key = to_query_key(path);
        self.entries.retain(|(k, _)| *k != key);
        self
    }

    /// Add a condition.
    ///
    /// With `unique_key == false` an already present path gets one more value
    /// (repeatable key); with `unique_key == true` every previous value of the
    /// path is replaced. Arrays contribute one value per element and nested
    /// objects are flattened into dot paths.
    pub fn where_path(&mut self, path: &str, value: impl Into<Value>, unique_key: bool) -> &mut Self {
        if path.is_empty() {
            return self;
        }
        match value.into() {
            Value::Object(map) => {
                for (key, nested) in map {
                    self.where_path(&format!("{path}.{key}"), nested, unique_key);
                }
            }
            Value::Array(items) => {
                if unique_key {
                    self.remove(path);
                }
                let key = to_query_key(path);
                self.entries
                    .extend(items.into_iter().map(|item| (key.clone(), item)));
            }
            scalar => {
                if unique_key {
                    self.remove(path);
                }
                self.entries.push((to_query_key(path), scalar));
            }
        }
        self
    }

    /// Shorthand for a repeatable condition
    pub fn append(&mut self, path: &str, value: impl Into<Value>) -> &mut Self {
        self.where_path(path, value, false)
    }

    /// Shorthand for a unique condition
    pub fn replace(&mut self, path: &str, value: impl Into<Value>) -> &mut Self {
        self.where_path(path, value, true)
    }

    /// Add every key of a mapping as a repeatable condition
    pub fn where_all(&mut self, conditions: &Map<String, Value>) -> &mut Self {
        for (path, value) in conditions {
            self.where_path(path, value.clone(), false);
        }
        self
    }

    /// Append every entry of another builder
    pub fn extend_from(&mut self, other: &QueryBuilder) -> &mut Self {
        self.entries.extend(other.entries.iter().cloned());
        self
    }

    pub fn with(&mut self, relation: &str) -> &mut Self {
        self.where_path("with", relation, false)
    }

    pub fn with_many<I, S>(&mut self, relations: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for relation in relations {
            self.with(relation.as_ref());
        }
        self
    }

    /// Free text search; empty input is ignored
    pub fn query(&mut self, search: &str) -> &mut Self {
        if search.is_empty() {
            return self;
        }
        self.where_path("q", search, false)
    }

    pub fn sort_by(&mut self, field: &str, descending: bool) -> &mut Self {
        self.where_path("sort.by", field, true);
        self.where_path("sort.order", if descending { "desc" } else { "asc" }, true)
    }

    pub fn page(&mut self, page: u32) -> &mut Self {
        self.where_path("page", page, true)
    }

    pub fn per_page(&mut self, per_page: u32) -> &mut Self {
        self.where_path("pagination.per_page", per_page, true)
    }

    pub fn reset(&mut self) -> &mut Self {
        self.entries.clear();
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Raw `(bracket key, value)` pairs in insertion order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Fold the multi-map into a nested tree; repeated keys become arrays.
    pub fn to_json(&self) -> Value {
        let mut flat: IndexMap<String, Value> = IndexMap::new();
        for (key, value) in &self.entries {
            let path = to_dot_path(key);
            match flat.get_mut(&path) {
                Some(Value::Array(values)) => values.push(value.clone()),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value.clone()]);
                }
                None => {
                    flat.insert(path, value.clone());
                }
            }
        }

        let mut out = Value::Object(Map::new());
        for (path, value) in flat {
            assign(&mut out, &path, value);
        }
        out
    }

    /// URL-encoded `key=value` pairs joined by `&`
    pub fn to_query_string(&self) -> String {
        self.entries
            .iter()
            .map(|(key, value)| {
                format!(
                    "{}={}",
                    urlencoding::encode(key),
                    urlencoding::encode(&scalar_to_string(value))
                )
            })
            .collect::<Vec<_>>()
            .join("&")
    }
}

impl fmt::Display for QueryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_query_string())
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .unwrap_or(spaced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_repeatable_key_coalesces_into_array() {
        let mut query = QueryBuilder::new();
        query.where_path("a.b", 1, false).where_path("a.b", 2, false);
        assert_eq!(query.to_json(), json!({ "a": { "b": [1, 2] } }));
    }

    #[test]
    fn test_unique_key_replaces() {
        let mut query = QueryBuilder::new();
        query.where_path("a.b", 1, true).where_path("a.b", 2, true);
        assert_eq!(query.to_json(), json!({ "a": { "b": 2 } }));
    }

    #[test]
    fn test_mapping_recurses_per_key() {
        let mut query = QueryBuilder::new();
        let conditions = json!({ "status": "open", "owner": { "id": 7 } });
        query.where_all(conditions.as_object().unwrap());
        assert!(query.has("status"));
        assert!(query.has("owner.id"));
        assert_eq!(query.to_query_string(), "status=open&owner%5Bid%5D=7");
    }

    #[test]
    fn test_convenience_builders() {
        let mut query = QueryBuilder::new();
        query
            .sort_by("name", false)
            .sort_by("created_at", true)
            .page(3)
            .per_page(25)
            .with("author")
            .with("tags")
            .query("")
            .query("rust");

        assert_eq!(
            query.to_json(),
            json!({
                "sort": { "by": "created_at", "order": "desc" },
                "page": 3,
                "pagination": { "per_page": 25 },
                "with": ["author", "tags"],
                "q": "rust",
            })
        );
    }

    #[test]
    fn test_remove_and_reset() {
        let mut query = QueryBuilder::new();
        query.append("with", "a").append("with", "b").page(1);
        assert_eq!(query.values("with").len(), 2);

        query.remove("with");
        assert!(!query.has("with"));
        assert_eq!(query.len(), 1);

        query.reset();
        assert!(query.is_empty());
        assert_eq!(query.to_query_string(), "");
    }

    #[test]
    fn test_parse_query_string() {
        let query = QueryBuilder::parse("?sort%5Bby%5D=name&with=a&with=b&q=hello+world");
        assert_eq!(
            query.to_json(),
            json!({
                "sort": { "by": "name" },
                "with": ["a", "b"],
                "q": "hello world",
            })
        );
    }

    #[test]
    fn test_from_json_roundtrip() {
        let mut query = QueryBuilder::new();
        query.append("a.b", 1).append("a.b", 2).replace("c", "x");
        let rebuilt = QueryBuilder::from_json(&query.to_json());
        assert_eq!(rebuilt.to_json(), query.to_json());
    }
}
