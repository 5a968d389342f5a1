//! `ApiClient::request`: one logical request with rate-limit and transient retries.

use crate::config::{ClientConfig, ConfigError};
use crate::policy::{RetryPolicy, RetryState};
use crate::transport::{HttpRequest, RequestBody, ReqwestTransport, Transport};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde::de::DeserializeOwned;
use stats_types::query::append_query;
use stats_types::{FetchError, Outcome, Params};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Per-call options. Headers set here are never overridden by the client.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
    pub params: Params,
    pub cancel: Option<CancellationToken>,
    /// Overrides the client's policy for this call.
    pub policy: Option<RetryPolicy>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
            params: Params::new(),
            cancel: None,
            policy: None,
        }
    }
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post_json(value: serde_json::Value) -> Self {
        Self {
            method: Method::POST,
            body: Some(RequestBody::Json(value)),
            ..Self::default()
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(key.into(), value.to_string());
        self
    }

    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = Some(policy);
        self
    }
}

/// Client for the backend's enveloped JSON API. Calls share no mutable state.
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    base_url: String,
    token: Option<String>,
    policy: RetryPolicy,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
            token: None,
            policy: RetryPolicy::default(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, ConfigError> {
        let transport = ReqwestTransport::with_timeout(config.timeout)
            .map_err(|e| ConfigError::Client(e.to_string()))?;
        let client = Self::new(config.base_url.clone(), Arc::new(transport))
            .with_policy(config.policy);
        Ok(match config.token {
            Some(ref token) => client.with_token(token.clone()),
            None => client,
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_config(&ClientConfig::from_env()?)
    }

    /// Bearer token sent when the caller has not set `Authorization` itself.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    /// Join a path onto the base URL; absolute URLs pass through.
    pub fn resolve(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return endpoint.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    pub async fn get(&self, endpoint: &str) -> Result<serde_json::Value, FetchError> {
        self.request(endpoint, RequestOptions::get()).await
    }

    /// Like [`request`](Self::request), deserializing `data` into `T`.
    pub async fn request_as<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<T, FetchError> {
        let data = self.request(endpoint, options).await?;
        serde_json::from_value(data).map_err(|e| FetchError::UnexpectedData(e.to_string()))
    }

    /// Issue one logical request and return the envelope's `data`.
    ///
    /// 429 responses are retried up to `max_rate_limit_retries` times, honouring
    /// `Retry-After`. Non-200 statuses, unparseable bodies and network errors are
    /// retried until `max_transient_failures` is reached, then the last error is
    /// returned. Still-computing and user errors are returned immediately.
    /// Cancelling `options.cancel` drops the in-flight attempt and returns
    /// [`FetchError::Aborted`].
    pub async fn request(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<serde_json::Value, FetchError> {
        let RequestOptions {
            method,
            mut headers,
            body,
            params,
            cancel,
            policy,
        } = options;
        let policy = policy.unwrap_or(self.policy);
        let cancel = cancel.unwrap_or_default();
        if let Some(ref token) = self.token {
            if !headers.contains_key(AUTHORIZATION) {
                let value = HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| FetchError::InvalidRequest(e.to_string()))?;
                headers.insert(AUTHORIZATION, value);
            }
        }
        let request = HttpRequest {
            method: method.clone(),
            url: self.resolve(&append_query(endpoint, &params)),
            headers,
            body,
        };

        let mut state = RetryState::default();
        while state.can_attempt(&policy) {
            if cancel.is_cancelled() {
                return Err(FetchError::Aborted);
            }
            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchError::Aborted),
                res = self.transport.send(request.clone()) => res,
            };
            let outcome = match sent {
                Ok(res) => Outcome::classify(res.status, res.retry_after(), &res.body),
                Err(e) => Outcome::Transient(e.into()),
            };

            let err = match outcome {
                Outcome::Success(data) => return Ok(data),
                Outcome::StillComputing => {
                    tracing::debug!(endpoint, "backend still computing");
                    return Err(FetchError::StillComputing {
                        method: method.to_string(),
                        endpoint: endpoint.to_string(),
                    });
                }
                Outcome::UserError { msg, code } => {
                    tracing::debug!(endpoint, code, msg = %msg, "backend rejected request");
                    return Err(FetchError::User {
                        method: method.to_string(),
                        endpoint: endpoint.to_string(),
                        msg,
                        code,
                    });
                }
                Outcome::RateLimited { retry_after_secs } => {
                    if state.rate_limit_exhausted(&policy) {
                        tracing::warn!(
                            endpoint,
                            attempts = state.attempt(),
                            "rate limit retries exhausted"
                        );
                        return Err(FetchError::MaxRetries {
                            method: method.to_string(),
                            endpoint: endpoint.to_string(),
                        });
                    }
                    let delay =
                        policy.rate_limit_delay(state.rate_limit_attempts, retry_after_secs);
                    tracing::warn!(
                        endpoint,
                        attempt = state.attempt(),
                        delay_ms = delay.as_millis() as u64,
                        retry_after = ?retry_after_secs,
                        "rate limited, backing off"
                    );
                    sleep_or_abort(&cancel, delay).await?;
                    state = state.rate_limited();
                    continue;
                }
                Outcome::Transient(err) => err,
            };

            state = state.failed();
            if !state.failures_remaining(&policy) {
                tracing::warn!(endpoint, attempts = state.attempt() - 1, error = %err, "giving up");
                return Err(err);
            }
            let delay = policy.failure_delay(state.failure_attempts);
            tracing::warn!(
                endpoint,
                attempt = state.attempt() - 1,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "transient failure, retrying"
            );
            sleep_or_abort(&cancel, delay).await?;
        }

        Err(FetchError::MaxRetries {
            method: method.to_string(),
            endpoint: endpoint.to_string(),
        })
    }
}

async fn sleep_or_abort(cancel: &CancellationToken, delay: Duration) -> Result<(), FetchError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(FetchError::Aborted),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}
