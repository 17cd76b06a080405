//! Shared constants for NoCaptcha components.

/// Default HTTP listen address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:9080";

/// Versioned API prefix
pub const API_VERSION_V1: &str = "/v1";

/// Ceremony timeout handed to authenticators (milliseconds)
pub const DEFAULT_CEREMONY_TIMEOUT_MS: u64 = 100_000;

/// Pending session lifetime (5 minutes)
pub const DEFAULT_SESSION_TTL_SECS: u64 = 300;

/// Interval between expired-session sweeps
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Upper bound on a single verification call (milliseconds)
pub const DEFAULT_VERIFY_TIMEOUT_MS: u64 = 5_000;

/// Origin prefix declared by passkeys created inside an Android app wrapper
pub const APP_EMBEDDED_ORIGIN_PREFIX: &str = "android:apk-key-hash:";

/// JSON field names on the wire
pub mod fields {
    /// Credential options (start response) / client credential (complete request)
    pub const PUB_KEY_CRED_OPTS: &str = "pubKeyCredOpts";

    /// Client data inside a WebAuthn attestation response
    pub const CLIENT_DATA_JSON: &str = "clientDataJSON";

    /// Origin inside client data
    pub const ORIGIN: &str = "origin";
}

/// Caller-facing messages
pub mod messages {
    pub const ID_REQUIRED: &str = "ID is required.";

    pub const SESSION_NOT_RECOGNIZED: &str = "Unable to recognize temporary passkey";

    pub const INVALID_JSON: &str = "A valid JSON should be specified";
}
