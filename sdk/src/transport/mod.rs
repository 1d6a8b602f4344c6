//! Remote transport abstraction and its HTTP implementation

pub mod http;
pub mod response;
pub mod session;

use crate::query::QueryBuilder;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub use http::HttpTransport;
pub use response::{ApiResponse, ValidationFeedback};
pub use session::{MemorySessionStore, SessionStore};

/// Sends entity and collection requests to the remote resource.
///
/// Non-2xx answers are returned as an [`ApiResponse`] with the failing status;
/// `Err` is reserved for transport failures such as connection errors or
/// cancellation.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, path: &str, query: &QueryBuilder) -> Result<ApiResponse>;

    async fn post(&self, path: &str, body: &Value, query: &QueryBuilder) -> Result<ApiResponse>;

    /// Cancel every request in flight; later requests are unaffected
    fn abort(&self);
}

pub type SharedTransport = Arc<dyn Transport>;
