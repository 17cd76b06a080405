//! Disposable passkey challenges.
//!
//! A caller starts a one-time WebAuthn registration, its device answers,
//! and the answer is verified against the stored challenge. Nothing about
//! the credential outlives the verification.

mod client_response;
mod relying_party;
mod service;
mod store;
mod webauthn;

pub use relying_party::RelyingParty;
pub use service::ChallengeService;
pub use store::{SessionStore, session_sweeper};
pub use webauthn::WebauthnRelyingParty;

#[cfg(test)]
pub(crate) use client_response::tests::{credential as test_credential, encode_client_data};
#[cfg(test)]
pub(crate) use service::tests::{FakeRelyingParty, service_with};
