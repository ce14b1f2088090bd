//! Shared utilities for store client integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use graph_rag_sync::config::schema::{CircuitBreakerConfig, GraphConfig, VectorConfig};
use graph_rag_sync::resilience::{CircuitBreaker, ErrorKind, Resilience, RetryPolicy};
use graph_rag_sync::store::{GraphStoreClient, VectorStoreClient};
use graph_rag_sync::sync::{EmbedError, Embedder};

/// What the mock backend does with a request.
pub enum Reply {
    Json(u16, Value),
    Text(u16, String),
    /// Close the connection without answering.
    Drop,
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or(Value::Null)
    }

    /// The Cypher statement of a graph commit request.
    pub fn statement(&self) -> String {
        self.json()["statements"][0]["statement"]
            .as_str()
            .unwrap_or_default()
            .to_string()
    }

    pub fn parameters(&self) -> Value {
        self.json()["statements"][0]["parameters"].clone()
    }
}

/// Programmable HTTP backend on an ephemeral port. The handler gets each
/// request and its zero-based index.
pub struct MockServer {
    url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockServer {
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&RecordedRequest, usize) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler = Arc::new(handler);

        let recorded = requests.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let handler = handler.clone();
                let recorded = recorded.clone();
                tokio::spawn(async move {
                    serve(socket, handler.as_ref(), &recorded).await;
                });
            }
        });

        Self {
            url: format!("http://{addr}"),
            requests,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

async fn serve<F>(mut socket: TcpStream, handler: &F, recorded: &Mutex<Vec<RecordedRequest>>)
where
    F: Fn(&RecordedRequest, usize) -> Reply,
{
    let Some(request) = read_request(&mut socket).await else {
        return;
    };
    let reply = {
        let mut requests = recorded.lock().unwrap();
        let index = requests.len();
        requests.push(request.clone());
        handler(&request, index)
    };

    let (status, content_type, body) = match reply {
        Reply::Json(status, value) => (status, "application/json", value.to_string()),
        Reply::Text(status, text) => (status, "text/plain", text),
        Reply::Drop => return,
    };
    let response = format!(
        "HTTP/1.1 {status} Mock\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

async fn read_request(socket: &mut TcpStream) -> Option<RecordedRequest> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let read = socket.read(&mut chunk).await.ok()?;
        if read == 0 {
            return None;
        }
        buffer.extend_from_slice(&chunk[..read]);
        if let Some(position) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            break position + 4;
        }
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.parse::<usize>().ok())
        .unwrap_or(0);
    while buffer.len() < header_end + content_length {
        let read = socket.read(&mut chunk).await.ok()?;
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);
    }
    let body = String::from_utf8_lossy(&buffer[header_end..]).to_string();

    Some(RecordedRequest {
        method,
        path,
        headers,
        body,
    })
}

pub fn breaker(name: &str, failure_threshold: u32) -> Arc<CircuitBreaker> {
    Arc::new(CircuitBreaker::new(
        name,
        CircuitBreakerConfig {
            failure_threshold,
            ..CircuitBreakerConfig::default()
        },
    ))
}

/// Transport-only retry policy with millisecond delays.
pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts, 1, 5, 0.0).with_retry_on([ErrorKind::Transport])
}

pub fn graph_client(server: &MockServer, breaker: Arc<CircuitBreaker>, retry: RetryPolicy) -> GraphStoreClient {
    let config = GraphConfig {
        uri: server.url().to_string(),
        password: "secret".to_string(),
        ..GraphConfig::default()
    };
    GraphStoreClient::new(&config, Resilience::new(breaker, retry)).unwrap()
}

pub fn vector_client(server: &MockServer, breaker: Arc<CircuitBreaker>, retry: RetryPolicy) -> VectorStoreClient {
    let config = VectorConfig {
        url: server.url().to_string(),
        api_key: Some("vector-key".to_string()),
        ..VectorConfig::default()
    };
    VectorStoreClient::new(&config, Resilience::new(breaker, retry)).unwrap()
}

/// A graph commit response with one result set.
pub fn graph_rows(columns: &[&str], rows: Vec<Vec<Value>>) -> Value {
    let data: Vec<Value> = rows.into_iter().map(|row| json!({ "row": row, "meta": [] })).collect();
    json!({ "results": [{ "columns": columns, "data": data }], "errors": [] })
}

/// A successful vector store envelope.
pub fn vector_ok(result: Value) -> Value {
    json!({ "result": result, "status": "ok", "time": 0.001 })
}

/// Embeds every text as a fixed vector.
pub struct StaticEmbedder(pub Vec<f32>);

#[async_trait]
impl Embedder for StaticEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
        Ok(self.0.clone())
    }
}

pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
        Err(EmbedError::new("provider unavailable"))
    }
}
