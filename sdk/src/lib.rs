pub mod config;
pub mod entity;
pub mod logging;
pub mod query;
pub mod testing;
pub mod transport;

// Re-export async_trait macro for custom transports
pub use async_trait::async_trait;

pub use config::ClientConfig;
pub use logging::init_logging;

// Re-export entity framework components
pub use entity::{
    Attribute, CastKind, Choice, DateValue, Definition, Entity, EntityCollection, EntityError,
    EntityResult, IndexAccess, LifecycleState, Model, NumberValue, Pagination, SaveReport,
    Schema, ValueWrapper,
};

pub use query::{AttributePath, QueryBuilder};
pub use transport::{
    ApiResponse, HttpTransport, MemorySessionStore, SessionStore, SharedTransport, Transport,
};
