//! HTTP seam between adapters and the network.

use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Error bodies are only previewed, so reading stops after this many bytes.
pub const ERROR_BODY_LIMIT: usize = 4096;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, TransportError>> + Send>>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Request failed: {0}")]
    Request(String),
    #[error("Response stream interrupted: {0}")]
    Body(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_body() || err.is_decode() {
            TransportError::Body(err.to_string())
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

/// A fully built streaming POST.
#[derive(Clone)]
pub struct PreparedRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Value,
    pub timeout: Duration,
}

// Header and query values carry credentials, so only their names are shown.
impl fmt::Debug for PreparedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header_names: Vec<&str> = self.headers.iter().map(|(k, _)| k.as_str()).collect();
        let query_names: Vec<&str> = self.query.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("PreparedRequest")
            .field("url", &self.url)
            .field("headers", &header_names)
            .field("query", &query_names)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl PreparedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

pub enum TransportResponse {
    Streaming(ByteStream),
    /// Non-success status with whatever body the server sent.
    Rejected { status: u16, body: String },
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportResponse::Streaming(_) => f.write_str("TransportResponse::Streaming"),
            TransportResponse::Rejected { status, body } => f
                .debug_struct("TransportResponse::Rejected")
                .field("status", status)
                .field("body", body)
                .finish(),
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: PreparedRequest) -> Result<TransportResponse, TransportError>;
}

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(insecure_tls: bool) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(insecure_tls)
            .build()?;
        Ok(Self { client })
    }

    fn request_builder(&self, request: &PreparedRequest) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .post(&request.url)
            .header("Content-Type", "application/json")
            .json(&request.body);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: PreparedRequest) -> Result<TransportResponse, TransportError> {
        debug!(url = %request.url, "Sending streaming request");
        let deadline = tokio::time::Instant::now() + request.timeout;
        let pending = self.request_builder(&request).send();
        let response = tokio::time::timeout_at(deadline, pending)
            .await
            .map_err(|_| TransportError::Timeout(request.timeout))??;

        let status = response.status();
        if !status.is_success() {
            let body = tokio::time::timeout_at(deadline, read_error_body(response))
                .await
                .map_err(|_| TransportError::Timeout(request.timeout))?;
            return Ok(TransportResponse::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(TransportError::from));
        Ok(TransportResponse::Streaming(Box::pin(body)))
    }
}

async fn read_error_body(mut response: reqwest::Response) -> String {
    let mut body = Vec::new();
    while body.len() < ERROR_BODY_LIMIT {
        match response.chunk().await {
            Ok(Some(chunk)) => body.extend_from_slice(&chunk),
            Ok(None) => break,
            Err(err) => {
                debug!(error = %err, "Error body read failed");
                break;
            }
        }
    }
    if body.is_empty() {
        return "<no body>".to_string();
    }
    body.truncate(ERROR_BODY_LIMIT);
    String::from_utf8_lossy(&body).into_owned()
}
