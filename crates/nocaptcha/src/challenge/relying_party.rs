//! The Relying Party capability boundary.
//!
//! The cryptographic ceremony (attestation parsing, signature checks,
//! origin and RP ID validation) lives behind this trait. The orchestrator
//! only mints and verifies; it never looks inside the material.

use nocaptcha_common::Identifier;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Identity a challenge is minted for
#[derive(Debug, Clone)]
pub struct ChallengeUser {
    /// Fresh identifier, used as the WebAuthn user handle
    pub handle: Identifier,
    /// Caller-supplied subject label
    pub name: String,
    pub display_name: String,
}

impl ChallengeUser {
    pub fn new(handle: Identifier, label: &str) -> Self {
        Self {
            handle,
            name: label.to_string(),
            display_name: label.to_string(),
        }
    }
}

/// Output of [`RelyingParty::mint_challenge`]
#[derive(Debug)]
pub struct MintedChallenge<O, S> {
    /// Sent to the caller
    pub options: O,
    /// Kept server-side until completion
    pub state: S,
}

/// Payload of a successful verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedCredential {
    /// URL-safe base64 credential ID created by the authenticator
    pub credential_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    Verified(VerifiedCredential),
    Rejected(String),
}

/// Faults inside the collaborator, as opposed to a rejected response
#[derive(Debug, Error)]
pub enum RelyingPartyError {
    #[error("Relying party configuration error: {0}")]
    Config(String),

    #[error("Unable to create public key credential options: {0}")]
    Challenge(String),

    #[error("Relying party internal error: {0}")]
    Internal(String),
}

pub trait RelyingParty: Send + Sync + 'static {
    /// Caller-facing challenge payload
    type Options: Serialize + Send;
    /// Server-side pending material
    type State: Send + 'static;
    /// Decoded client response
    type Response: DeserializeOwned + Send + 'static;

    /// The single operator-configured origin substituted for app-embedded origins
    fn trusted_origin(&self) -> &str;

    fn mint_challenge(
        &self,
        user: &ChallengeUser,
    ) -> Result<MintedChallenge<Self::Options, Self::State>, RelyingPartyError>;

    fn verify(
        &self,
        state: &Self::State,
        response: &Self::Response,
    ) -> Result<VerificationOutcome, RelyingPartyError>;
}
