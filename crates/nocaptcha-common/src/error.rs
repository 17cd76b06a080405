//! Error taxonomy and the process-wide error code registry.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::OnceLock;
use thiserror::Error;

/// Message shown to callers for any failure they cannot act on
pub const GENERIC_FAILURE_MESSAGE: &str = "Sorry, something went wrong. Please try later.";

/// A registered (symbolic code, HTTP status, default message) triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ErrorCode {
    pub code: &'static str,
    #[serde(rename = "httpCode")]
    pub http_code: u16,
    #[serde(rename = "httpMessage")]
    pub http_message: &'static str,
}

/// The closed set of failure kinds an operation can report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    NotAuthorized,
    Forbidden,
    NotFound,
    Conflict,
    TooEarly,
    Internal,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 7] = [
        Self::InvalidInput,
        Self::NotAuthorized,
        Self::Forbidden,
        Self::NotFound,
        Self::Conflict,
        Self::TooEarly,
        Self::Internal,
    ];

    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidInput => ErrorCode {
                code: "NOCAPTCHA_400",
                http_code: 400,
                http_message: "Potential malformed request",
            },
            Self::NotAuthorized => ErrorCode {
                code: "NOCAPTCHA_401",
                http_code: 401,
                http_message: "Unauthorized",
            },
            Self::Forbidden => ErrorCode {
                code: "NOCAPTCHA_403",
                http_code: 403,
                http_message: "Forbidden",
            },
            Self::NotFound => ErrorCode {
                code: "NOCAPTCHA_404",
                http_code: 404,
                http_message: "Resource not found",
            },
            Self::Conflict => ErrorCode {
                code: "NOCAPTCHA_409",
                http_code: 409,
                http_message: "Resource already exists",
            },
            Self::TooEarly => ErrorCode {
                code: "NOCAPTCHA_425",
                http_code: 425,
                http_message: "Request too early",
            },
            Self::Internal => ErrorCode {
                code: "NOCAPTCHA_500",
                http_code: 500,
                http_message: "Internal error",
            },
        }
    }
}

/// Registration failures. Any of these at startup is fatal.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Error code has already been registered: {0}")]
    Duplicate(&'static str),

    #[error("'code' must be specified")]
    BlankCode,

    #[error("'httpMessage' must be specified")]
    BlankMessage,

    #[error("A valid HTTP code must be specified: {0}")]
    InvalidHttpCode(u16),
}

/// Append-only registry of error codes keyed by symbolic code
#[derive(Debug, Default)]
pub struct ErrorRegistry {
    codes: HashMap<&'static str, ErrorCode>,
}

impl ErrorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every [`ErrorKind`] code
    pub fn with_kinds() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for kind in ErrorKind::ALL {
            registry.register(kind.code())?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, code: ErrorCode) -> Result<ErrorCode, RegistryError> {
        if code.code.trim().is_empty() {
            return Err(RegistryError::BlankCode);
        }
        if code.http_message.trim().is_empty() {
            return Err(RegistryError::BlankMessage);
        }
        if !(100..=510).contains(&code.http_code) {
            return Err(RegistryError::InvalidHttpCode(code.http_code));
        }
        if self.codes.contains_key(code.code) {
            return Err(RegistryError::Duplicate(code.code));
        }

        self.codes.insert(code.code, code);
        Ok(code)
    }

    pub fn lookup(&self, code: &str) -> Option<&ErrorCode> {
        self.codes.get(code)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

static REGISTRY: OnceLock<ErrorRegistry> = OnceLock::new();

/// Install the process-wide registry. Call once at startup; later calls
/// return the already installed registry.
pub fn install() -> Result<&'static ErrorRegistry, RegistryError> {
    if let Some(registry) = REGISTRY.get() {
        return Ok(registry);
    }

    let registry = ErrorRegistry::with_kinds()?;
    Ok(REGISTRY.get_or_init(|| registry))
}

/// The installed registry, if [`install`] has run
pub fn registry() -> Option<&'static ErrorRegistry> {
    REGISTRY.get()
}

/// Registered code for `kind`; the built-in code until [`install`] has run
pub fn code_for(kind: ErrorKind) -> ErrorCode {
    registry()
        .and_then(|registry| registry.lookup(kind.code().code))
        .copied()
        .unwrap_or_else(|| kind.code())
}

type Cause = Box<dyn std::error::Error + Send + Sync>;

/// Errors crossing the service boundary
#[derive(Debug, Error)]
pub enum NoCaptchaError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Too early: {0}")]
    TooEarly(String),

    /// The cause is for server-side logs only
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        cause: Option<Cause>,
    },
}

impl NoCaptchaError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            cause: None,
        }
    }

    pub fn internal_with<E>(message: impl Into<String>, cause: E) -> Self
    where
        E: Into<Cause>,
    {
        Self::Internal {
            message: message.into(),
            cause: Some(cause.into()),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::NotAuthorized(_) => ErrorKind::NotAuthorized,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::TooEarly(_) => ErrorKind::TooEarly,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        self.kind().code().http_code
    }

    /// Message safe to hand back to a caller
    pub fn caller_message(&self) -> &str {
        match self {
            Self::InvalidInput(msg)
            | Self::NotAuthorized(msg)
            | Self::Forbidden(msg)
            | Self::NotFound(msg)
            | Self::TooEarly(msg) => msg,
            Self::Conflict(_) | Self::Internal { .. } => GENERIC_FAILURE_MESSAGE,
        }
    }

    /// True when the failure must be logged with full detail server-side
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. } | Self::Conflict(_))
    }
}
