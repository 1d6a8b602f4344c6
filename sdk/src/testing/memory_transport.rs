// In-memory transport implementation for testing
use crate::query::QueryBuilder;
use crate::transport::{ApiResponse, Transport};
use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
        }
    }
}

/// One request seen by the transport
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub query: QueryBuilder,
}

impl RecordedRequest {
    /// `_method` field of a POST body, if any
    pub fn spoofed_method(&self) -> Option<&str> {
        self.body.as_ref()?.get("_method")?.as_str()
    }
}

/// Scripted transport answering from canned responses.
///
/// One-shot responses queued with [`MemoryTransport::respond`] are consumed
/// first, then the sticky response set with [`MemoryTransport::respond_always`].
/// Unknown routes answer 404.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    // (method, path) -> queued responses
    queued: DashMap<(Method, String), VecDeque<ApiResponse>>,
    sticky: DashMap<(Method, String), ApiResponse>,
    requests: Mutex<Vec<RecordedRequest>>,
    aborts: AtomicUsize,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a one-shot response for a route
    pub fn respond(&self, method: Method, path: &str, response: ApiResponse) -> &Self {
        self.queued
            .entry((method, path.to_string()))
            .or_default()
            .push_back(response);
        self
    }

    /// Answer every request to a route with the same response
    pub fn respond_always(&self, method: Method, path: &str, response: ApiResponse) -> &Self {
        self.sticky.insert((method, path.to_string()), response);
        self
    }

    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn last_request(&self) -> Option<RecordedRequest> {
        self.requests.lock().await.last().cloned()
    }

    pub async fn request_count(&self) -> usize {
        self.requests.lock().await.len()
    }

    pub fn abort_count(&self) -> usize {
        self.aborts.load(Ordering::SeqCst)
    }

    pub async fn clear(&self) {
        self.queued.clear();
        self.sticky.clear();
        self.requests.lock().await.clear();
    }

    async fn dispatch(&self, request: RecordedRequest) -> ApiResponse {
        let route = (request.method, request.path.clone());
        self.requests.lock().await.push(request);

        let queued = self
            .queued
            .get_mut(&route)
            .and_then(|mut responses| responses.pop_front());
        if let Some(response) = queued {
            return response;
        }
        if let Some(response) = self.sticky.get(&route) {
            return response.value().clone();
        }

        warn!(method = %route.0, path = %route.1, "No canned response for route");
        ApiResponse::new(
            404,
            json!({ "message": format!("No route for {} {}", route.0, route.1) }),
            "Not Found",
        )
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn get(&self, path: &str, query: &QueryBuilder) -> Result<ApiResponse> {
        Ok(self
            .dispatch(RecordedRequest {
                method: Method::Get,
                path: path.to_string(),
                body: None,
                query: query.clone(),
            })
            .await)
    }

    async fn post(&self, path: &str, body: &Value, query: &QueryBuilder) -> Result<ApiResponse> {
        Ok(self
            .dispatch(RecordedRequest {
                method: Method::Post,
                path: path.to_string(),
                body: Some(body.clone()),
                query: query.clone(),
            })
            .await)
    }

    fn abort(&self) {
        self.aborts.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queued_then_sticky_then_missing() {
        let transport = MemoryTransport::new();
        transport
            .respond(Method::Get, "/users/1", ApiResponse::ok(json!({ "id": 1 })))
            .respond_always(Method::Get, "/users/1", ApiResponse::ok(json!({ "id": 2 })));

        let query = QueryBuilder::new();
        let first = transport.get("/users/1", &query).await.unwrap();
        assert_eq!(first.data(), &json!({ "id": 1 }));
        let second = transport.get("/users/1", &query).await.unwrap();
        assert_eq!(second.data(), &json!({ "id": 2 }));
        let third = transport.get("/users/1", &query).await.unwrap();
        assert_eq!(third.data(), &json!({ "id": 2 }));

        let missing = transport.post("/nope", &json!({}), &query).await.unwrap();
        assert_eq!(missing.status(), 404);
        assert!(missing.failed());
    }

    #[tokio::test]
    async fn test_records_requests_and_aborts() {
        let transport = MemoryTransport::new();
        let mut query = QueryBuilder::new();
        query.page(2);

        transport
            .post("/users", &json!({ "_method": "PUT" }), &query)
            .await
            .unwrap();
        transport.abort();

        let last = transport.last_request().await.unwrap();
        assert_eq!(last.method, Method::Post);
        assert_eq!(last.spoofed_method(), Some("PUT"));
        assert_eq!(last.query.to_json(), json!({ "page": 2 }));
        assert_eq!(transport.request_count().await, 1);
        assert_eq!(transport.abort_count(), 1);
    }
}
