use super::{ApiResponse, SessionStore, Transport};
use crate::config::ClientConfig;
use crate::query::QueryBuilder;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

pub const XSRF_COOKIE: &str = "XSRF-TOKEN";
pub const XSRF_HEADER: &str = "X-XSRF-TOKEN";

/// reqwest-backed transport
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    prefix: String,
    headers: DashMap<String, String>,
    session: Option<Arc<dyn SessionStore>>,
    abort_generation: watch::Sender<u64>,
}

impl HttpTransport {
    /// Create a new transport with default configuration
    pub fn new() -> Result<Self> {
        Self::from_config(&ClientConfig::default())
    }

    /// Create a new transport with custom configuration
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .cookie_store(config.with_credentials)
            .build()
            .context("Failed to create HTTP client")?;

        let headers = DashMap::new();
        headers.insert("Accept".to_string(), "application/json".to_string());
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        let (abort_generation, _) = watch::channel(0);

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            prefix: config.prefix.trim_matches('/').to_string(),
            headers,
            session: None,
            abort_generation,
        })
    }

    /// Read the XSRF token from `session` on every request
    pub fn with_session(mut self, session: Arc<dyn SessionStore>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn set_header(&self, name: &str, value: &str) -> &Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    pub fn remove_header(&self, name: &str) -> &Self {
        self.headers.remove(name);
        self
    }

    /// Set API token for authentication
    pub fn authorization(&self, token: &str) -> &Self {
        self.set_header("Authorization", &format!("Bearer {token}"))
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.headers.get(name).map(|value| value.value().clone())
    }

    /// Absolute paths are kept, relative paths go under the prefix
    pub fn url(&self, path: &str, query: &QueryBuilder) -> String {
        let mut url = if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.starts_with('/') || self.prefix.is_empty() {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        } else {
            format!("{}/{}/{}", self.base_url, self.prefix, path)
        };
        if !query.is_empty() {
            url.push(if url.contains('?') { '&' } else { '?' });
            url.push_str(&query.to_query_string());
        }
        url
    }

    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<ApiResponse> {
        let mut request = request;
        for header in self.headers.iter() {
            request = request.header(header.key().as_str(), header.value().as_str());
        }
        if let Some(token) = self.session.as_ref().and_then(|s| s.get(XSRF_COOKIE)) {
            request = request.header(XSRF_HEADER, token);
        }

        let mut cancelled = self.abort_generation.subscribe();
        let response = tokio::select! {
            response = request.send() => response.context("Request failed")?,
            _ = cancelled.changed() => return Err(anyhow!("Request aborted")),
        };

        let status = response.status();
        let status_text = status.canonical_reason().unwrap_or_default().to_string();
        let data = if status == reqwest::StatusCode::NO_CONTENT {
            Value::Object(Map::new())
        } else {
            let text = response.text().await.context("Failed to read response body")?;
            if text.trim().is_empty() {
                Value::Object(Map::new())
            } else {
                serde_json::from_str(&text).unwrap_or_else(|e| {
                    debug!(error = %e, "Response body is not JSON");
                    Value::String(text)
                })
            }
        };

        Ok(ApiResponse::new(status.as_u16(), data, &status_text))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, path: &str, query: &QueryBuilder) -> Result<ApiResponse> {
        let url = self.url(path, query);
        debug!(%url, "GET");
        self.execute(self.client.get(&url)).await
    }

    async fn post(&self, path: &str, body: &Value, query: &QueryBuilder) -> Result<ApiResponse> {
        let url = self.url(path, query);
        debug!(%url, "POST");
        self.execute(self.client.post(&url).json(body)).await
    }

    fn abort(&self) {
        self.abort_generation.send_modify(|generation| *generation += 1);
        debug!("Aborted in-flight requests");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemorySessionStore;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    fn transport() -> HttpTransport {
        let config = ClientConfig {
            base_url: "https://api.example.com/".to_string(),
            prefix: "/api/".to_string(),
            ..ClientConfig::default()
        };
        HttpTransport::from_config(&config).unwrap()
    }

    #[test]
    fn test_url_joining() {
        let transport = transport();
        let empty = QueryBuilder::new();
        assert_eq!(transport.url("users/1", &empty), "https://api.example.com/api/users/1");
        assert_eq!(transport.url("/users/1", &empty), "https://api.example.com/users/1");
        assert_eq!(transport.url("https://other.test/x", &empty), "https://other.test/x");

        let mut query = QueryBuilder::new();
        query.sort_by("name", false);
        assert_eq!(
            transport.url("users", &query),
            "https://api.example.com/api/users?sort%5Bby%5D=name&sort%5Border%5D=asc"
        );
    }

    #[test]
    fn test_headers() {
        let transport = transport();
        assert_eq!(transport.header("Accept").as_deref(), Some("application/json"));

        transport.authorization("secret");
        assert_eq!(transport.header("Authorization").as_deref(), Some("Bearer secret"));

        transport.remove_header("Authorization");
        assert!(transport.header("Authorization").is_none());
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = ClientConfig {
            base_url: String::new(),
            ..ClientConfig::default()
        };
        assert!(HttpTransport::from_config(&config).is_err());
    }

    #[tokio::test]
    async fn test_abort_rearms() {
        let transport = transport().with_session(Arc::new(MemorySessionStore::new()));
        let mut watcher = transport.abort_generation.subscribe();
        transport.abort();
        assert!(watcher.has_changed().unwrap());
        assert_eq!(*watcher.borrow_and_update(), 1);

        // A subscription taken after the abort sees no pending cancellation
        let fresh = transport.abort_generation.subscribe();
        assert!(!fresh.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_abort_cancels_in_flight_request_only() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let (accepted_tx, mut accepted_rx) = mpsc::channel(1);

        tokio::spawn(async move {
            // First connection never gets an answer
            let (silent, _) = listener.accept().await.unwrap();
            accepted_tx.send(()).await.unwrap();

            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 8\r\nconnection: close\r\n\r\n{\"id\":1}",
                )
                .await
                .unwrap();
            drop(silent);
        });

        let config = ClientConfig {
            base_url: format!("http://{address}"),
            ..ClientConfig::default()
        };
        let transport = Arc::new(HttpTransport::from_config(&config).unwrap());

        let pending = tokio::spawn({
            let transport = transport.clone();
            async move { transport.get("/slow", &QueryBuilder::new()).await }
        });
        accepted_rx.recv().await.unwrap();
        transport.abort();

        let result = timeout(Duration::from_secs(5), pending).await.unwrap().unwrap();
        assert_eq!(result.unwrap_err().to_string(), "Request aborted");

        let response = timeout(Duration::from_secs(5), transport.get("/fast", &QueryBuilder::new()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.data(), &serde_json::json!({ "id": 1 }));
    }
}
