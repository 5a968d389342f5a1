//! HTTP transport seam: one request out, one fully-read response back.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::multipart::{Form, Part};
use reqwest::Method;
use stats_types::FetchError;
use std::time::Duration;

/// Upper bound on establishing a connection, independent of the overall request deadline.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Request body. Kept in owned form so the same request can be re-sent on retry.
#[derive(Debug, Clone)]
pub enum RequestBody {
    Json(serde_json::Value),
    Text(String),
    Bytes(Vec<u8>),
    /// Upload endpoints exchange multipart form data.
    Multipart(Vec<FormPart>),
}

#[derive(Debug, Clone)]
pub struct FormPart {
    pub name: String,
    pub value: FormValue,
}

#[derive(Debug, Clone)]
pub enum FormValue {
    Text(String),
    File {
        file_name: String,
        mime: Option<String>,
        bytes: Vec<u8>,
    },
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn retry_after(&self) -> Option<&str> {
        self.headers.get(RETRY_AFTER).and_then(|v| v.to_str().ok())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("reading response body failed: {0}")]
    Body(String),
    #[error("invalid request: {0}")]
    Invalid(String),
}

impl From<TransportError> for FetchError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Invalid(msg) => FetchError::InvalidRequest(msg),
            other => FetchError::Transport(other.to_string()),
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one HTTP exchange. Non-2xx statuses are returned, not raised.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Transport backed by a shared `reqwest::Client`.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Client whose requests fail with a transport error once `timeout` elapses,
    /// so a stalled upstream feeds the transient-failure budget instead of hanging.
    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(CONNECT_TIMEOUT))
            .build()
            .map_err(|e| TransportError::Invalid(e.to_string()))?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn build_form(parts: Vec<FormPart>) -> Result<Form, TransportError> {
    let mut form = Form::new();
    for part in parts {
        form = match part.value {
            FormValue::Text(text) => form.text(part.name, text),
            FormValue::File {
                file_name,
                mime,
                bytes,
            } => {
                let mut p = Part::bytes(bytes).file_name(file_name);
                if let Some(mime) = mime {
                    p = p
                        .mime_str(&mime)
                        .map_err(|e| TransportError::Invalid(e.to_string()))?;
                }
                form.part(part.name, p)
            }
        };
    }
    Ok(form)
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let HttpRequest {
            method,
            url,
            headers,
            body,
        } = request;
        let mut req = self.client.request(method, &url).headers(headers);
        // reqwest only fills Content-Type for JSON when the caller has not set one.
        req = match body {
            None => req,
            Some(RequestBody::Json(value)) => req.json(&value),
            Some(RequestBody::Text(text)) => req.body(text),
            Some(RequestBody::Bytes(bytes)) => req.body(bytes),
            Some(RequestBody::Multipart(parts)) => req.multipart(build_form(parts)?),
        };
        let res = req
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;
        let status = res.status().as_u16();
        let headers = res.headers().clone();
        let body = res
            .bytes()
            .await
            .map_err(|e| TransportError::Body(e.to_string()))?;
        Ok(HttpResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}
