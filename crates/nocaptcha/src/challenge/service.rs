//! The two-phase challenge protocol.
//!
//! Per session key: `Absent -> Pending -> Consumed`. `start` mints an
//! identifier and a challenge and stores the session; `complete` removes the
//! session on lookup, whatever the verification outcome, so a challenge can
//! be redeemed at most once.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use nocaptcha_common::constants::messages;
use nocaptcha_common::{IdGenerator, MetricsSnapshot, NoCaptchaError};

use super::client_response::ClientResponse;
use super::relying_party::{ChallengeUser, RelyingParty, VerificationOutcome, VerifiedCredential};
use super::store::{SessionStore, StoreError};

/// A pending challenge, as stored between `start` and `complete`
pub struct ChallengeSession<S> {
    /// Caller-supplied subject label
    pub subject: String,
    /// Relying party material needed to verify the response
    pub state: S,
}

/// What `start` hands back to the caller
#[derive(Debug, Clone)]
pub struct IssuedChallenge {
    /// URL-safe session key, also the WebAuthn user handle in `options`
    pub session_key: String,
    /// JSON-encoded credential creation options
    pub options: String,
}

#[derive(Default)]
struct Counters {
    issued: AtomicU64,
    verified: AtomicU64,
    rejected: AtomicU64,
    unrecognized: AtomicU64,
}

pub struct ChallengeService<R: RelyingParty> {
    relying_party: Arc<R>,
    ids: IdGenerator,
    sessions: Arc<SessionStore<ChallengeSession<R::State>>>,
    verify_timeout: Duration,
    counters: Counters,
}

impl<R: RelyingParty> ChallengeService<R> {
    pub fn new(
        relying_party: Arc<R>,
        ids: IdGenerator,
        sessions: Arc<SessionStore<ChallengeSession<R::State>>>,
        verify_timeout: Duration,
    ) -> Self {
        Self {
            relying_party,
            ids,
            sessions,
            verify_timeout,
            counters: Counters::default(),
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore<ChallengeSession<R::State>>> {
        &self.sessions
    }

    /// Issue a fresh single-use challenge for `subject`.
    pub async fn start(&self, subject: &str) -> Result<IssuedChallenge, NoCaptchaError> {
        if subject.trim().is_empty() {
            return Err(NoCaptchaError::invalid(messages::ID_REQUIRED));
        }

        let handle = self.ids.next();
        let session_key = handle.to_base64url();

        let minted = self
            .relying_party
            .mint_challenge(&ChallengeUser::new(handle, subject))
            .map_err(|e| {
                NoCaptchaError::internal_with("Unable to create public key credential options", e)
            })?;

        let options = serde_json::to_string(&minted.options).map_err(|e| {
            NoCaptchaError::internal_with("Unable to encode public key credential options", e)
        })?;

        let session = ChallengeSession {
            subject: subject.to_string(),
            state: minted.state,
        };

        if let Err(StoreError::Conflict(key)) = self.sessions.put(session_key.clone(), session).await {
            tracing::error!(session_key = %key, "Session key collision");
            return Err(NoCaptchaError::internal_with(
                "Unable to store challenge session",
                StoreError::Conflict(key),
            ));
        }

        self.counters.issued.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            session_key = %session_key,
            subject = %fingerprint(subject),
            "Issued passkey challenge"
        );

        Ok(IssuedChallenge {
            session_key,
            options,
        })
    }

    /// Redeem the session named by `session_key` with the client's response.
    ///
    /// The session is consumed before the response is even decoded.
    pub async fn complete(
        &self,
        session_key: &str,
        response: Value,
    ) -> Result<VerifiedCredential, NoCaptchaError> {
        if session_key.trim().is_empty() {
            return Err(NoCaptchaError::invalid(messages::ID_REQUIRED));
        }

        let Some(session) = self.sessions.take(session_key).await else {
            self.counters.unrecognized.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(session_key = %session_key, "Unrecognized challenge session");
            return Err(NoCaptchaError::invalid(messages::SESSION_NOT_RECOGNIZED));
        };
        let subject = fingerprint(&session.subject);

        let decoded = match ClientResponse::<R::Response>::decode(
            response,
            self.relying_party.trusted_origin(),
        ) {
            Ok(decoded) => decoded,
            Err(e) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(session_key = %session_key, subject = %subject, error = %e, "Undecodable passkey response");
                return Err(NoCaptchaError::invalid(e.to_string()));
            }
        };

        if decoded.origin_rewritten {
            tracing::debug!(
                session_key = %session_key,
                declared_origin = %decoded.declared_origin,
                "Substituted trusted origin for app-embedded origin"
            );
        }

        let outcome = self.verify(session.state, decoded.credential).await?;

        match outcome {
            VerificationOutcome::Verified(credential) => {
                self.counters.verified.fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    session_key = %session_key,
                    subject = %subject,
                    credential_id = %credential.credential_id,
                    "Passkey challenge verified"
                );
                Ok(credential)
            }
            VerificationOutcome::Rejected(reason) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(session_key = %session_key, subject = %subject, reason = %reason, "Passkey challenge rejected");
                Err(NoCaptchaError::InvalidInput(reason))
            }
        }
    }

    /// Run verification on the blocking pool, bounded by `verify_timeout`.
    async fn verify(
        &self,
        state: R::State,
        response: R::Response,
    ) -> Result<VerificationOutcome, NoCaptchaError> {
        let relying_party = Arc::clone(&self.relying_party);
        let task = tokio::task::spawn_blocking(move || relying_party.verify(&state, &response));

        match tokio::time::timeout(self.verify_timeout, task).await {
            Ok(Ok(Ok(outcome))) => Ok(outcome),
            Ok(Ok(Err(e))) => Err(NoCaptchaError::internal_with("Unable to complete captcha", e)),
            Ok(Err(e)) => Err(NoCaptchaError::internal_with("Verification task failed", e)),
            Err(_) => Err(NoCaptchaError::internal(format!(
                "Verification exceeded {}ms",
                self.verify_timeout.as_millis()
            ))),
        }
    }

    pub async fn metrics(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            pending_sessions: self.sessions.len().await,
            challenges_issued: self.counters.issued.load(Ordering::Relaxed),
            challenges_verified: self.counters.verified.load(Ordering::Relaxed),
            challenges_rejected: self.counters.rejected.load(Ordering::Relaxed),
            sessions_unrecognized: self.counters.unrecognized.load(Ordering::Relaxed),
            sessions_expired: self.sessions.expired_count(),
        }
    }
}

/// Short, non-reversible tag for a subject label in logs
fn fingerprint(subject: &str) -> String {
    let digest = Sha256::digest(subject.as_bytes());
    URL_SAFE_NO_PAD.encode(&digest[..8])
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::challenge::client_response::tests::credential;
    use crate::challenge::relying_party::{MintedChallenge, RelyingPartyError};
    use nocaptcha_common::ErrorKind;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    /// Accepts credentials whose `id` is "good"; counts every call.
    #[derive(Default)]
    pub(crate) struct FakeRelyingParty {
        pub(crate) minted: AtomicUsize,
        pub(crate) verified: AtomicUsize,
        pub(crate) fail_mint: bool,
        pub(crate) fail_verify: bool,
        pub(crate) verify_delay: Option<Duration>,
    }

    impl RelyingParty for FakeRelyingParty {
        type Options = Value;
        type State = String;
        type Response = Value;

        fn trusted_origin(&self) -> &str {
            "https://example.com"
        }

        fn mint_challenge(
            &self,
            user: &ChallengeUser,
        ) -> Result<MintedChallenge<Value, String>, RelyingPartyError> {
            self.minted.fetch_add(1, Ordering::SeqCst);
            if self.fail_mint {
                return Err(RelyingPartyError::Challenge("entropy exhausted".to_string()));
            }
            Ok(MintedChallenge {
                options: json!({ "publicKey": { "user": { "id": user.handle.to_base64url() } } }),
                state: format!("challenge-for-{}", user.name),
            })
        }

        fn verify(
            &self,
            state: &String,
            response: &Value,
        ) -> Result<VerificationOutcome, RelyingPartyError> {
            self.verified.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.verify_delay {
                std::thread::sleep(delay);
            }
            if self.fail_verify {
                return Err(RelyingPartyError::Internal("hsm unavailable".to_string()));
            }
            if response["id"] == "good" && state.starts_with("challenge-for-") {
                Ok(VerificationOutcome::Verified(VerifiedCredential {
                    credential_id: "good".to_string(),
                }))
            } else {
                Ok(VerificationOutcome::Rejected("Invalid attestation".to_string()))
            }
        }
    }

    pub(crate) fn service_with(rp: FakeRelyingParty) -> ChallengeService<FakeRelyingParty> {
        ChallengeService::new(
            Arc::new(rp),
            IdGenerator::new(),
            Arc::new(SessionStore::new(Duration::from_secs(300))),
            Duration::from_secs(5),
        )
    }

    fn good_credential() -> Value {
        let mut value = credential("https://example.com");
        value["id"] = json!("good");
        value
    }

    #[tokio::test]
    async fn test_start_issues_session_keyed_by_user_handle() {
        let service = service_with(FakeRelyingParty::default());
        let issued = service.start("alice").await.unwrap();

        let options: Value = serde_json::from_str(&issued.options).unwrap();
        assert_eq!(options["publicKey"]["user"]["id"], issued.session_key);
        assert_eq!(service.sessions().len().await, 1);
    }

    #[tokio::test]
    async fn test_blank_subject_never_reaches_relying_party() {
        let service = service_with(FakeRelyingParty::default());

        for blank in ["", "   ", "\t\n"] {
            let err = service.start(blank).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidInput);
        }
        assert_eq!(service.relying_party.minted.load(Ordering::SeqCst), 0);
        assert!(service.sessions().is_empty().await);
    }

    #[tokio::test]
    async fn test_mint_failure_is_internal() {
        let service = service_with(FakeRelyingParty {
            fail_mint: true,
            ..Default::default()
        });

        let err = service.start("alice").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(service.sessions().is_empty().await);
    }

    #[tokio::test]
    async fn test_complete_verifies_once() {
        let service = service_with(FakeRelyingParty::default());
        let issued = service.start("alice").await.unwrap();

        let credential = service
            .complete(&issued.session_key, good_credential())
            .await
            .unwrap();
        assert_eq!(credential.credential_id, "good");

        let err = service
            .complete(&issued.session_key, good_credential())
            .await
            .unwrap_err();
        assert_eq!(err.caller_message(), messages::SESSION_NOT_RECOGNIZED);
    }

    #[tokio::test]
    async fn test_rejected_response_still_consumes_session() {
        let service = service_with(FakeRelyingParty::default());
        let issued = service.start("alice").await.unwrap();

        let forged = credential("https://example.com");
        let first = service.complete(&issued.session_key, forged).await.unwrap_err();
        assert_eq!(first.kind(), ErrorKind::InvalidInput);
        assert_eq!(first.caller_message(), "Invalid attestation");

        // A genuine retry with the same key is still refused.
        let second = service
            .complete(&issued.session_key, good_credential())
            .await
            .unwrap_err();
        assert_eq!(second.kind(), ErrorKind::InvalidInput);
        assert_eq!(second.caller_message(), messages::SESSION_NOT_RECOGNIZED);
    }

    #[tokio::test]
    async fn test_undecodable_response_consumes_session_without_verifying() {
        let service = service_with(FakeRelyingParty::default());
        let issued = service.start("alice").await.unwrap();

        let err = service
            .complete(&issued.session_key, json!({ "nope": true }))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(service.relying_party.verified.load(Ordering::SeqCst), 0);
        assert!(service.sessions().is_empty().await);
    }

    #[tokio::test]
    async fn test_unknown_and_blank_keys() {
        let service = service_with(FakeRelyingParty::default());

        let unknown = service.complete("alice", good_credential()).await.unwrap_err();
        assert_eq!(unknown.caller_message(), messages::SESSION_NOT_RECOGNIZED);

        let blank = service.complete(" ", good_credential()).await.unwrap_err();
        assert_eq!(blank.caller_message(), messages::ID_REQUIRED);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_completions_have_one_winner() {
        const RACERS: usize = 8;

        let service = Arc::new(service_with(FakeRelyingParty::default()));
        let issued = service.start("alice").await.unwrap();
        let barrier = Arc::new(tokio::sync::Barrier::new(RACERS));

        let tasks: Vec<_> = (0..RACERS)
            .map(|_| {
                let service = service.clone();
                let barrier = barrier.clone();
                let key = issued.session_key.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    service.complete(&key, good_credential()).await
                })
            })
            .collect();

        let results: Vec<_> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        for loser in results.iter().filter_map(|r| r.as_ref().err()) {
            assert_eq!(loser.caller_message(), messages::SESSION_NOT_RECOGNIZED);
        }
        assert_eq!(service.relying_party.verified.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_relying_party_fault_is_internal() {
        let service = service_with(FakeRelyingParty {
            fail_verify: true,
            ..Default::default()
        });
        let issued = service.start("alice").await.unwrap();

        let err = service
            .complete(&issued.session_key, good_credential())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(!err.caller_message().contains("hsm"));
    }

    #[tokio::test]
    async fn test_slow_verification_times_out() {
        let service = ChallengeService::new(
            Arc::new(FakeRelyingParty {
                verify_delay: Some(Duration::from_millis(200)),
                ..Default::default()
            }),
            IdGenerator::new(),
            Arc::new(SessionStore::new(Duration::from_secs(300))),
            Duration::from_millis(20),
        );
        let issued = service.start("alice").await.unwrap();

        let err = service
            .complete(&issued.session_key, good_credential())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[tokio::test]
    async fn test_metrics_track_outcomes() {
        let service = service_with(FakeRelyingParty::default());
        let first = service.start("alice").await.unwrap();
        let second = service.start("bob").await.unwrap();
        service.start("carol").await.unwrap();

        service.complete(&first.session_key, good_credential()).await.unwrap();
        let _ = service.complete(&second.session_key, json!({})).await;
        let _ = service.complete("missing", good_credential()).await;

        let metrics = service.metrics().await;
        assert_eq!(metrics.pending_sessions, 1);
        assert_eq!(metrics.challenges_issued, 3);
        assert_eq!(metrics.challenges_verified, 1);
        assert_eq!(metrics.challenges_rejected, 1);
        assert_eq!(metrics.sessions_unrecognized, 1);
    }

    #[test]
    fn test_fingerprint_is_stable_and_opaque() {
        assert_eq!(fingerprint("bob@example.com"), fingerprint("bob@example.com"));
        assert_ne!(fingerprint("bob@example.com"), fingerprint("alice@example.com"));
        assert!(!fingerprint("bob@example.com").contains("bob"));
    }
}
