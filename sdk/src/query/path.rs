//! Attribute paths and the dot ⇄ bracket query-key codec
//!
//! An attribute path is a dot separated address into a nested attribute
//! structure (`contact.name.first`). On the wire the same address travels as a
//! bracket-notation query key (`contact[name][first]`).

use crate::entity::types::{EntityError, EntityResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A validated dot separated attribute path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AttributePath(String);

impl AttributePath {
    /// Parse a path, rejecting empty input and empty segments (`a..b`, `.a`).
    pub fn parse(path: impl Into<String>) -> EntityResult<Self> {
        let path = path.into();
        if path.is_empty() {
            return Err(EntityError::invalid_path(&path, "path is empty"));
        }
        if path.split('.').any(str::is_empty) {
            return Err(EntityError::invalid_path(&path, "path contains an empty segment"));
        }
        Ok(Self(path))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First segment of the path
    pub fn root(&self) -> &str {
        root(&self.0)
    }

    /// Everything after the first segment, or the whole path when it has a single segment
    pub fn suffix(&self) -> &str {
        suffix(&self.0)
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    pub fn to_query_key(&self) -> String {
        to_query_key(&self.0)
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for AttributePath {
    type Error = EntityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<&str> for AttributePath {
    type Error = EntityError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<AttributePath> for String {
    fn from(path: AttributePath) -> Self {
        path.0
    }
}

impl AsRef<str> for AttributePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Convert `contact.name.first` into `contact[name][first]`.
pub fn to_query_key(path: &str) -> String {
    let mut segments = path.split('.');
    let mut key = segments.next().unwrap_or_default().to_string();
    for segment in segments {
        key.push('[');
        key.push_str(segment);
        key.push(']');
    }
    key
}

/// Convert `contact[name][first]` back into `contact.name.first`.
///
/// Every token loses its non-word characters, so the conversion is lossy for
/// segments that are not made of `[A-Za-z0-9_]` only.
pub fn to_dot_path(query_key: &str) -> String {
    query_key
        .split('[')
        .map(|token| {
            token
                .trim()
                .chars()
                .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join(".")
}

pub fn root(path: &str) -> &str {
    match path.split_once('.') {
        Some((root, _)) => root,
        None => path,
    }
}

pub fn suffix(path: &str) -> &str {
    match path.split_once('.') {
        Some((_, rest)) => rest,
        None => path,
    }
}

/// Nested lookup into a JSON tree. Numeric segments index into arrays.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Nested assignment into a JSON tree, creating intermediate objects.
///
/// Intermediate nodes that are not objects are replaced by empty objects.
pub fn assign(target: &mut Value, path: &str, value: Value) {
    let mut node = target;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let Value::Object(map) = node else {
            return;
        };
        if segments.peek().is_none() {
            map.insert(segment.to_string(), value);
            return;
        }
        node = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_key_conversion() {
        assert_eq!(to_query_key("a.b.c"), "a[b][c]");
        assert_eq!(to_query_key("page"), "page");
        assert_eq!(to_query_key("pagination.per_page"), "pagination[per_page]");
    }

    #[test]
    fn test_dot_path_conversion() {
        assert_eq!(to_dot_path("a[b][c]"), "a.b.c");
        assert_eq!(to_dot_path("sort[by]"), "sort.by");
        assert_eq!(to_dot_path("q"), "q");
    }

    #[test]
    fn test_codec_roundtrip_for_word_paths() {
        for path in ["a", "a.b", "contact.name.first", "per_page", "x1.y_2.z3"] {
            assert_eq!(to_dot_path(&to_query_key(path)), path);
        }
    }

    #[test]
    fn test_codec_is_lossy_for_non_word_segments() {
        assert_eq!(to_dot_path(&to_query_key("first-name")), "firstname");
    }

    #[test]
    fn test_root_and_suffix() {
        assert_eq!(root("a.b.c"), "a");
        assert_eq!(suffix("a.b.c"), "b.c");
        assert_eq!(root("a"), "a");
        assert_eq!(suffix("a"), "a");
        assert_eq!(suffix(suffix("a")), "a");
    }

    #[test]
    fn test_attribute_path_validation() {
        assert!(AttributePath::parse("a.b").is_ok());
        assert!(AttributePath::parse("").is_err());
        assert!(AttributePath::parse("a..b").is_err());
        assert!(AttributePath::parse(".a").is_err());

        let path = AttributePath::parse("contact.name.first").unwrap();
        assert_eq!(path.root(), "contact");
        assert_eq!(path.suffix(), "name.first");
        assert_eq!(path.depth(), 3);
        assert_eq!(path.to_query_key(), "contact[name][first]");
    }

    #[test]
    fn test_lookup_and_assign() {
        let mut tree = json!({ "contact": { "tags": ["x", "y"] } });
        assert_eq!(lookup(&tree, "contact.tags.1"), Some(&json!("y")));
        assert_eq!(lookup(&tree, "contact.missing"), None);

        assign(&mut tree, "contact.name.first", json!("Ann"));
        assert_eq!(lookup(&tree, "contact.name.first"), Some(&json!("Ann")));

        assign(&mut tree, "contact.tags.extra", json!(1));
        assert_eq!(lookup(&tree, "contact.tags.extra"), Some(&json!(1)));
    }
}
