//! Backend response envelope and per-attempt outcome classification.

use crate::FetchError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// `msg` value the backend uses to mark a successful response.
pub const SUCCESS_MSG: &str = "OK";

/// Envelope `code` meaning the requested aggregate exists but is still being computed.
pub const STILL_COMPUTING_CODE: i64 = 202;

/// HTTP status the backend uses for rate limiting.
pub const RATE_LIMITED_STATUS: u16 = 429;

/// Envelope wrapping every backend JSON response.
///
/// `data` is only meaningful when `msg == "OK"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T = serde_json::Value> {
    pub msg: String,
    #[serde(default)]
    pub code: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            msg: SUCCESS_MSG.to_string(),
            code: 200,
            data: Some(data),
        }
    }

    pub fn error(msg: impl Into<String>, code: i64) -> Self {
        Self {
            msg: msg.into(),
            code,
            data: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.msg == SUCCESS_MSG
    }

    pub fn is_still_computing(&self) -> bool {
        self.code == STILL_COMPUTING_CODE
    }
}

/// Stable discriminant for outcomes and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    StillComputing,
    UserError,
    RateLimited,
    Transient,
    MaxRetries,
    Aborted,
    Invalid,
}

impl OutcomeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeKind::Success => "success",
            OutcomeKind::StillComputing => "still_computing",
            OutcomeKind::UserError => "user_error",
            OutcomeKind::RateLimited => "rate_limited",
            OutcomeKind::Transient => "transient",
            OutcomeKind::MaxRetries => "max_retries",
            OutcomeKind::Aborted => "aborted",
            OutcomeKind::Invalid => "invalid",
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a single HTTP attempt, before any retry decision.
#[derive(Debug)]
pub enum Outcome {
    Success(serde_json::Value),
    StillComputing,
    UserError { msg: String, code: i64 },
    RateLimited { retry_after_secs: Option<u64> },
    Transient(FetchError),
}

impl Outcome {
    /// Classify one response from its status, `Retry-After` header and body.
    pub fn classify(status: u16, retry_after: Option<&str>, body: &[u8]) -> Self {
        if status == RATE_LIMITED_STATUS {
            return Outcome::RateLimited {
                retry_after_secs: retry_after.and_then(parse_retry_after),
            };
        }
        if status != 200 {
            return Outcome::Transient(FetchError::Api {
                status,
                body: String::from_utf8_lossy(body).into_owned(),
            });
        }
        let envelope: Envelope = match serde_json::from_slice(body) {
            Ok(e) => e,
            Err(e) => return Outcome::Transient(FetchError::Decode(e.to_string())),
        };
        if envelope.is_still_computing() {
            Outcome::StillComputing
        } else if envelope.is_ok() {
            Outcome::Success(envelope.data.unwrap_or(serde_json::Value::Null))
        } else {
            Outcome::UserError {
                msg: envelope.msg,
                code: envelope.code,
            }
        }
    }

    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::Success(_) => OutcomeKind::Success,
            Outcome::StillComputing => OutcomeKind::StillComputing,
            Outcome::UserError { .. } => OutcomeKind::UserError,
            Outcome::RateLimited { .. } => OutcomeKind::RateLimited,
            Outcome::Transient(_) => OutcomeKind::Transient,
        }
    }
}

/// Parse a `Retry-After` value given in whole seconds. HTTP-date values are not supported.
pub fn parse_retry_after(value: &str) -> Option<u64> {
    value.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(v: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&v).unwrap()
    }

    #[test]
    fn ok_envelope_yields_data() {
        let ok = body(json!({"msg": "OK", "code": 200, "data": [1, 2]}));
        let out = Outcome::classify(200, None, &ok);
        match out {
            Outcome::Success(data) => assert_eq!(data, json!([1, 2])),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn ok_without_data_is_null() {
        let out = Outcome::classify(200, None, &body(json!({"msg": "OK"})));
        match out {
            Outcome::Success(data) => assert!(data.is_null()),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn code_202_wins_over_ok_msg() {
        let out = Outcome::classify(200, None, &body(json!({"msg": "OK", "code": 202})));
        assert_eq!(out.kind(), OutcomeKind::StillComputing);
    }

    #[test]
    fn non_ok_msg_is_user_error() {
        let out = Outcome::classify(
            200,
            None,
            &body(json!({"msg": "map not found", "code": 404})),
        );
        match out {
            Outcome::UserError { msg, code } => {
                assert_eq!(msg, "map not found");
                assert_eq!(code, 404);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn rate_limit_reads_retry_after() {
        match Outcome::classify(429, Some(" 2 "), b"slow down") {
            Outcome::RateLimited { retry_after_secs } => assert_eq!(retry_after_secs, Some(2)),
            other => panic!("unexpected outcome: {:?}", other),
        }
        match Outcome::classify(429, Some("Wed, 21 Oct 2015 07:28:00 GMT"), b"") {
            Outcome::RateLimited { retry_after_secs } => assert_eq!(retry_after_secs, None),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn other_status_is_transient_api_error() {
        match Outcome::classify(503, None, b"upstream down") {
            Outcome::Transient(FetchError::Api { status, body }) => {
                assert_eq!(status, 503);
                assert_eq!(body, "upstream down");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn garbage_body_is_transient_decode_error() {
        let out = Outcome::classify(200, None, b"<html>");
        match out {
            Outcome::Transient(ref e) => assert_eq!(e.kind(), OutcomeKind::Transient),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn envelope_helpers_serialize_without_empty_data() {
        let e: Envelope = Envelope::error("processing", STILL_COMPUTING_CODE);
        assert_eq!(
            serde_json::to_value(&e).unwrap(),
            json!({"msg": "processing", "code": 202})
        );
        assert!(e.is_still_computing());
        assert!(Envelope::ok(json!({"x": 1})).is_ok());
    }
}
