//! Wire types shared across NoCaptcha components.

use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, NoCaptchaError};

/// Uniform response shape. Exactly one of `value` / `errorCode` is set.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<T>,

    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<ErrorCode>,

    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
}

impl<T> Envelope<T> {
    pub fn success(value: T, code: u16) -> Self {
        Self {
            value: Some(value),
            code: Some(code),
            error_code: None,
            error_message: None,
        }
    }

    pub fn failure(error_code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            value: None,
            code: None,
            error_code: Some(error_code),
            error_message: Some(message.into()),
        }
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn code(&self) -> Option<u16> {
        self.code
    }

    pub fn error_code(&self) -> Option<&ErrorCode> {
        self.error_code.as_ref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn is_success(&self) -> bool {
        self.value.is_some()
    }

    pub fn is_failure(&self) -> bool {
        self.error_code.is_some()
    }
}

impl<T> From<&NoCaptchaError> for Envelope<T> {
    /// Caller-facing view of an error; internal causes are dropped.
    fn from(err: &NoCaptchaError) -> Self {
        let kind = match err.kind() {
            crate::error::ErrorKind::Conflict => crate::error::ErrorKind::Internal,
            kind => kind,
        };
        Self::failure(crate::error::code_for(kind), err.caller_message())
    }
}

/// Body of both `start` and `complete` requests
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeRequest {
    /// Subject label on `start`, session key on `complete`
    #[serde(default)]
    pub id: Option<String>,

    /// Ignored on `start`; the client's signed response on `complete`
    #[serde(default)]
    pub pub_key_cred_opts: Option<serde_json::Value>,
}

/// Successful `start` response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeIssued {
    /// JSON-encoded credential creation options, passed through opaquely
    pub pub_key_cred_opts: String,
}

/// Metrics snapshot for monitoring
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Challenges waiting for completion
    pub pending_sessions: usize,

    /// Challenges issued since startup
    pub challenges_issued: u64,

    /// Completions that verified
    pub challenges_verified: u64,

    /// Completions rejected by verification or decoding
    pub challenges_rejected: u64,

    /// Completions naming an unknown or consumed session
    pub sessions_unrecognized: u64,

    /// Sessions evicted by expiry
    pub sessions_expired: u64,
}
