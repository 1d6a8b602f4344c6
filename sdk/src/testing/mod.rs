//! Testing support for entity code
//!
//! [`MemoryTransport`] stands in for a remote REST API. Tests script it with
//! canned [`ApiResponse`](crate::transport::ApiResponse)s per route and then
//! inspect the requests entities and collections sent.
//!
//! # Usage
//!
//! ```ignore
//! use restmodel_sdk::testing::{Method, MemoryTransport};
//!
//! #[tokio::test]
//! async fn test_load_user() {
//!     let transport = Arc::new(MemoryTransport::new());
//!     transport.respond(Method::Get, "/users/1", ApiResponse::ok(json!({ "id": 1 })));
//!
//!     let mut user = Entity::of::<User>(transport.clone(), &Value::Null);
//!     user.find_or_fail(1).await?;
//!     assert_eq!(transport.request_count().await, 1);
//! }
//! ```

pub mod memory_transport;

pub use memory_transport::*;
