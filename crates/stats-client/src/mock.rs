//! Scripted transport for tests: replays canned replies and records every call.

use crate::transport::{HttpRequest, HttpResponse, Transport, TransportError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, RETRY_AFTER};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub enum MockReply {
    Response(HttpResponse),
    /// Network-level failure.
    Fail(String),
    /// Never completes; used to exercise cancellation.
    Hang,
}

impl MockReply {
    pub fn status(status: u16, body: &str) -> Self {
        MockReply::Response(HttpResponse {
            status,
            headers: HeaderMap::new(),
            body: body.as_bytes().to_vec(),
        })
    }

    pub fn json(status: u16, value: serde_json::Value) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        MockReply::Response(HttpResponse {
            status,
            headers,
            body: value.to_string().into_bytes(),
        })
    }

    pub fn ok(data: serde_json::Value) -> Self {
        Self::json(200, serde_json::json!({ "msg": "OK", "code": 200, "data": data }))
    }

    pub fn envelope(msg: &str, code: i64) -> Self {
        Self::json(200, serde_json::json!({ "msg": msg, "code": code }))
    }

    pub fn rate_limited(retry_after_secs: Option<u64>) -> Self {
        let mut headers = HeaderMap::new();
        if let Some(secs) = retry_after_secs {
            headers.insert(RETRY_AFTER, HeaderValue::from(secs));
        }
        MockReply::Response(HttpResponse {
            status: 429,
            headers,
            body: b"Too Many Requests".to_vec(),
        })
    }

    pub fn network(msg: &str) -> Self {
        MockReply::Fail(msg.to_string())
    }
}

/// Transport that pops replies from a queue, then repeats `fallback` once the queue is empty.
pub struct MockTransport {
    script: Mutex<VecDeque<MockReply>>,
    fallback: Option<MockReply>,
    calls: Mutex<Vec<(Instant, HttpRequest)>>,
}

impl MockTransport {
    pub fn new(script: impl IntoIterator<Item = MockReply>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Reply with the same thing forever.
    pub fn always(reply: MockReply) -> Self {
        Self::new([]).with_fallback(reply)
    }

    pub fn with_fallback(mut self, reply: MockReply) -> Self {
        self.fallback = Some(reply);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.calls
            .lock()
            .map(|c| c.iter().map(|(_, r)| r.clone()).collect())
            .unwrap_or_default()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls
            .lock()
            .map(|c| c.iter().map(|(t, _)| *t).collect())
            .unwrap_or_default()
    }

    fn next_reply(&self) -> Option<MockReply> {
        let mut script = self.script.lock().ok()?;
        script.pop_front().or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((Instant::now(), request));
        }
        match self.next_reply() {
            Some(MockReply::Response(res)) => Ok(res),
            Some(MockReply::Fail(msg)) => Err(TransportError::Request(msg)),
            Some(MockReply::Hang) => std::future::pending().await,
            None => Err(TransportError::Request("mock script exhausted".to_string())),
        }
    }
}
