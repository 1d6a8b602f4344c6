//! Cast declarations and the coercion rules that turn raw input into typed attributes

use crate::entity::attribute::Attribute;
use crate::entity::collection::EntityCollection;
use crate::entity::resource::Entity;
use crate::entity::schema::{Model, Schema};
use crate::entity::wrapper::{DateValue, WrapperFactory};
use crate::transport::SharedTransport;
use indexmap::IndexMap;
use serde_json::{Map, Number, Value};
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Largest integer representable without loss in an IEEE-754 double
pub const MAX_SAFE_INTEGER: i64 = 9_007_199_254_740_991;

/// Lazily resolved schema of a nested entity type.
///
/// A function pointer rather than an `Arc` so that self-referencing entity
/// types can be declared without building their schema eagerly.
pub type SchemaRef = fn() -> Arc<Schema>;

/// Ordered `path -> cast` declarations of one entity type
pub type Casts = IndexMap<String, CastKind>;

/// Target type declared for an attribute path
#[derive(Clone)]
pub enum CastKind {
    Boolean,
    String,
    Integer,
    Decimal,
    Id,
    Date,
    Array,
    Object,
    Entity(SchemaRef),
    Collection(SchemaRef),
    Wrapper(WrapperFactory),
}

impl CastKind {
    pub fn entity<M: Model>() -> Self {
        CastKind::Entity(M::schema)
    }

    pub fn collection<M: Model>() -> Self {
        CastKind::Collection(M::schema)
    }

    pub fn wrapper(factory: WrapperFactory) -> Self {
        CastKind::Wrapper(factory)
    }

    pub fn is_entity_cast(&self) -> bool {
        matches!(self, CastKind::Entity(_))
    }

    pub fn is_collection_cast(&self) -> bool {
        matches!(self, CastKind::Collection(_))
    }

    /// Dates count as wrappers
    pub fn is_value_wrapper_cast(&self) -> bool {
        matches!(self, CastKind::Date | CastKind::Wrapper(_))
    }

    /// Schema of the nested type for entity and collection casts
    pub fn nested_schema(&self) -> Option<Arc<Schema>> {
        match self {
            CastKind::Entity(schema) | CastKind::Collection(schema) => Some(schema()),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CastKind::Boolean => "boolean",
            CastKind::String => "string",
            CastKind::Integer => "integer",
            CastKind::Decimal => "decimal",
            CastKind::Id => "id",
            CastKind::Date => "date",
            CastKind::Array => "array",
            CastKind::Object => "object",
            CastKind::Entity(_) => "entity",
            CastKind::Collection(_) => "collection",
            CastKind::Wrapper(_) => "wrapper",
        }
    }
}

impl fmt::Debug for CastKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CastKind::Entity(schema) => write!(f, "Entity({})", schema().name()),
            CastKind::Collection(schema) => write!(f, "Collection({})", schema().name()),
            other => f.write_str(other.name()),
        }
    }
}

/// Resolve a raw value against the cast declared for `path`.
///
/// Undeclared paths and values that already are entity, collection or wrapper
/// instances pass through unchanged, which makes resolution idempotent.
pub fn resolve(transport: &SharedTransport, path: &str, casts: &Casts, raw: Attribute) -> Attribute {
    match casts.get(path) {
        Some(kind) => cast(transport, kind, raw),
        None => raw,
    }
}

/// Coerce a raw value into the declared target type
pub fn cast(transport: &SharedTransport, kind: &CastKind, raw: Attribute) -> Attribute {
    if raw.is_instance() {
        return raw;
    }
    trace!(cast = kind.name(), "resolving attribute");
    let raw = raw.into_json();
    match kind {
        CastKind::Boolean => Attribute::Json(Value::Bool(!is_falsy(&raw))),
        CastKind::String => Attribute::Json(Value::String(to_js_string(&raw))),
        CastKind::Integer => Attribute::Json(Value::from(to_safe_integer(&raw))),
        CastKind::Decimal => Attribute::Json(float_value(parse_float(&raw))),
        CastKind::Id => Attribute::Json(to_id(raw)),
        CastKind::Date => Attribute::Wrapper(DateValue::factory(&raw)),
        CastKind::Array => Attribute::Json(to_array(raw)),
        CastKind::Object => Attribute::Json(to_object(raw)),
        CastKind::Entity(schema) => {
            Attribute::Entity(Box::new(Entity::new(schema(), transport.clone(), &raw)))
        }
        CastKind::Collection(schema) => Attribute::Collection(Box::new(
            EntityCollection::from_items(schema(), transport.clone(), &raw),
        )),
        CastKind::Wrapper(factory) => Attribute::Wrapper(factory(&raw)),
    }
}

/// `null`, `false`, `0`, `""` are falsy
pub fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().is_none_or(|f| f == 0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

/// Textual form of a value; null becomes the empty string, containers become JSON text
pub fn to_js_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => number_to_string(n),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

fn number_to_string(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    // f64 Display prints `3` for 3.0 and `0.5` for 0.5
    n.as_f64().map(|f| f.to_string()).unwrap_or_default()
}

/// Strict numeric conversion truncated toward zero and clamped to the safe
/// integer range. Anything that is not entirely numeric becomes `0`.
pub fn to_safe_integer(value: &Value) -> i64 {
    match value {
        Value::Null => 0,
        Value::Bool(b) => i64::from(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.clamp(-MAX_SAFE_INTEGER, MAX_SAFE_INTEGER)
            } else if n.as_u64().is_some() {
                MAX_SAFE_INTEGER
            } else {
                n.as_f64().map(truncate_float).unwrap_or(0)
            }
        }
        Value::String(s) => parse_strict(s).map(truncate_float).unwrap_or(0),
        Value::Array(items) if items.len() == 1 => to_safe_integer(&items[0]),
        Value::Array(_) | Value::Object(_) => 0,
    }
}

fn truncate_float(f: f64) -> i64 {
    if f.is_nan() {
        return 0;
    }
    let max = MAX_SAFE_INTEGER as f64;
    f.trunc().clamp(-max, max) as i64
}

/// Whole-string numeric parse; surrounding whitespace is allowed
fn parse_strict(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Some(0.0);
    }
    match trimmed {
        "Infinity" | "+Infinity" => return Some(f64::INFINITY),
        "-Infinity" => return Some(f64::NEG_INFINITY),
        _ => {}
    }
    if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).ok().map(|i| i as f64);
    }
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
    {
        return None;
    }
    trimmed.parse::<f64>().ok()
}

/// Leading-prefix float parse: `"7abc"` is `7`, anything without a numeric
/// prefix is `0`. Infinite results collapse to `0`.
pub fn parse_float(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => parse_float_prefix(s),
        Value::Array(items) => return items.first().map(parse_float).unwrap_or(0.0),
        Value::Null | Value::Bool(_) | Value::Object(_) => 0.0,
    };
    if parsed.is_finite() { parsed } else { 0.0 }
}

fn parse_float_prefix(raw: &str) -> f64 {
    let s = raw.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    let int_start = end;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    let mut digits = end - int_start;
    if bytes.get(end) == Some(&b'.') {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while bytes.get(frac_end).is_some_and(u8::is_ascii_digit) {
            frac_end += 1;
        }
        if digits > 0 || frac_end > frac_start {
            digits += frac_end - frac_start;
            end = frac_end;
        }
    }
    if digits == 0 {
        return 0.0;
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while bytes.get(exp_end).is_some_and(u8::is_ascii_digit) {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }
    s[..end].parse::<f64>().unwrap_or(0.0)
}

fn float_value(f: f64) -> Value {
    Number::from_f64(f)
        .map(Value::Number)
        .unwrap_or_else(|| Value::from(0.0))
}

fn to_id(raw: Value) -> Value {
    match raw {
        Value::Null => Value::String(String::new()),
        other => other,
    }
}

fn to_array(raw: Value) -> Value {
    match raw {
        Value::Array(items) => Value::Array(items),
        Value::Null => Value::Array(Vec::new()),
        other => Value::Array(vec![other]),
    }
}

fn to_object(raw: Value) -> Value {
    match raw {
        Value::Object(map) => Value::Object(map),
        Value::Array(items) => Value::Object(
            items
                .into_iter()
                .enumerate()
                .map(|(i, item)| (i.to_string(), item))
                .collect(),
        ),
        _ => Value::Object(Map::new()),
    }
}
