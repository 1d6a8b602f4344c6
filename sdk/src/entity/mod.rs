//! Entity framework
//!
//! Models declare casts, fillable paths and defaults once through [`Model`].
//! [`Entity`] instances hydrate raw JSON into a typed attribute tree and talk
//! to the remote resource through a [`Transport`](crate::transport::Transport);
//! [`EntityCollection`] holds pages of them.

pub mod attribute;
pub mod cast;
pub mod collection;
pub mod pagination;
pub mod resource;
pub mod schema;
pub mod types;
pub mod wrapper;

// Re-export commonly used types and traits
pub use attribute::{Attribute, AttributeTree};
pub use cast::{CastKind, Casts, SchemaRef};
pub use collection::{Choice, EntityCollection, IndexAccess, SaveOutcome, SaveReport};
pub use pagination::Pagination;
pub use resource::{Entity, KEY_FIELD};
pub use schema::{Definition, Fillability, Model, Schema, schema_of, try_schema_of};
pub use types::{EntityError, EntityResult, LifecycleState};
pub use wrapper::{DateValue, NumberValue, ValueWrapper, WrapperFactory};
