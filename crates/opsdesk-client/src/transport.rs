//! HTTP transport seam.
//!
//! [`Transport`] is the only place requests leave the process. Implementations
//! must turn non-2xx responses into [`TransportError::Status`] so callers never
//! see an error payload as a successful body.

use async_trait::async_trait;
use opsdesk_core::HttpMethod;
use serde_json::Value;
use url::Url;

use crate::config::ClientConfig;
use crate::error::TransportError;

/// A request ready to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    /// Rendered endpoint path, or an absolute URL.
    pub path: String,
    /// Encoded query string without the leading `?`.
    pub query: String,
    pub body: Option<Value>,
}

impl HttpRequest {
    pub fn get(path: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            path: path.into(),
            query: query.into(),
            body: None,
        }
    }

    pub fn write(method: HttpMethod, path: impl Into<String>, query: impl Into<String>, body: Value) -> Self {
        Self {
            method,
            path: path.into(),
            query: query.into(),
            body: Some(body),
        }
    }

    /// Path plus query string.
    pub fn target(&self) -> String {
        if self.query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.query)
        }
    }
}

/// A successful (2xx) response.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Value,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// [`Transport`] backed by `reqwest`.
pub struct ReqwestTransport {
    http: reqwest::Client,
    base_url: String,
    bearer_token: Option<String>,
}

impl ReqwestTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        Url::parse(&config.base_url)
            .map_err(|e| TransportError::Network(format!("invalid base URL {}: {e}", config.base_url)))?;

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| TransportError::Network(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            bearer_token: config.bearer_token.clone(),
        })
    }

    fn url(&self, request: &HttpRequest) -> String {
        let target = request.target();
        if target.starts_with("http://") || target.starts_with("https://") {
            target
        } else if target.starts_with('/') {
            format!("{}{}", self.base_url, target)
        } else {
            format!("{}/{}", self.base_url, target)
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = self.url(&request);
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
        };

        tracing::debug!(method = %request.method, %url, "Sending request");

        let mut req = self
            .http
            .request(method, &url)
            .header("Accept", "application/json");
        if let Some(token) = &self.bearer_token {
            req = req.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            req = req.json(body);
        }

        let resp = req.send().await.map_err(|e| {
            tracing::warn!(%url, "Request failed: {e}");
            TransportError::Network(e.to_string())
        })?;
        handle_response(resp).await
    }
}

async fn handle_response(resp: reqwest::Response) -> Result<HttpResponse, TransportError> {
    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| TransportError::Network(e.to_string()))?;

    if !status.is_success() {
        let payload = serde_json::from_str::<Value>(&body)
            .ok()
            .or_else(|| (!body.is_empty()).then(|| Value::String(body.clone())));
        return Err(TransportError::Status {
            status: status.as_u16(),
            payload,
        });
    }

    if body.is_empty() {
        return Ok(HttpResponse {
            status: status.as_u16(),
            body: Value::Null,
        });
    }

    let body = serde_json::from_str(&body).map_err(|e| TransportError::Decode(e.to_string()))?;
    Ok(HttpResponse {
        status: status.as_u16(),
        body,
    })
}
