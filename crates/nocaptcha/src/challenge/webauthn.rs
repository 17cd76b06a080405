//! `webauthn-rs` backed Relying Party for disposable passkey registration.
//!
//! No credential is ever persisted: a challenge is a passkey registration
//! ceremony whose resulting credential is dropped once verified.
//!
//! By default the minted options ask for a platform authenticator holding a
//! discoverable, user-verified credential. A roaming security key cannot
//! answer such a challenge.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use std::time::Duration;
use webauthn_rs::prelude::{
    AuthenticatorAttachment, CreationChallengeResponse, PasskeyRegistration,
    RegisterPublicKeyCredential, Url, Uuid, Webauthn, WebauthnBuilder,
};
use webauthn_rs_proto::{
    AuthenticatorSelectionCriteria, ResidentKeyRequirement, UserVerificationPolicy,
};

use super::relying_party::{
    ChallengeUser, MintedChallenge, RelyingParty, RelyingPartyError, VerificationOutcome,
    VerifiedCredential,
};
use crate::config::WanConfig;

pub struct WebauthnRelyingParty {
    webauthn: Webauthn,
    trusted_origin: String,
    platform_only: bool,
}

impl WebauthnRelyingParty {
    /// Build the relying party from `[wan]` configuration.
    ///
    /// The first listed origin is the trusted origin; the rest are also
    /// accepted by verification.
    pub fn new(config: &WanConfig) -> Result<Self, RelyingPartyError> {
        if config.id.trim().is_empty() {
            return Err(RelyingPartyError::Config("'id' must be specified".to_string()));
        }
        if config.name.trim().is_empty() {
            return Err(RelyingPartyError::Config("'name' must be specified".to_string()));
        }

        let origins = config.origin_list();
        let (trusted, others) = origins
            .split_first()
            .ok_or_else(|| RelyingPartyError::Config("'origins' must be specified".to_string()))?;

        let trusted_url = parse_origin(trusted)?;
        let mut builder = WebauthnBuilder::new(&config.id, &trusted_url)
            .map_err(|e| RelyingPartyError::Config(e.to_string()))?
            .rp_name(&config.name)
            .timeout(Duration::from_millis(config.timeout_ms));

        for origin in others {
            builder = builder.append_allowed_origin(&parse_origin(origin)?);
        }

        let webauthn = builder
            .build()
            .map_err(|e| RelyingPartyError::Config(e.to_string()))?;

        Ok(Self {
            webauthn,
            trusted_origin: trusted.clone(),
            platform_only: config.platform_only,
        })
    }
}

impl RelyingParty for WebauthnRelyingParty {
    type Options = CreationChallengeResponse;
    type State = PasskeyRegistration;
    type Response = RegisterPublicKeyCredential;

    fn trusted_origin(&self) -> &str {
        &self.trusted_origin
    }

    fn mint_challenge(
        &self,
        user: &ChallengeUser,
    ) -> Result<MintedChallenge<Self::Options, Self::State>, RelyingPartyError> {
        let (mut options, state) = self
            .webauthn
            .start_passkey_registration(
                Uuid::from_u128(user.handle.as_u128()),
                &user.name,
                &user.display_name,
                None,
            )
            .map_err(|e| RelyingPartyError::Challenge(e.to_string()))?;

        if self.platform_only {
            options.public_key.authenticator_selection = Some(platform_selection());
        }

        Ok(MintedChallenge { options, state })
    }

    fn verify(
        &self,
        state: &Self::State,
        response: &Self::Response,
    ) -> Result<VerificationOutcome, RelyingPartyError> {
        match self.webauthn.finish_passkey_registration(response, state) {
            Ok(passkey) => Ok(VerificationOutcome::Verified(VerifiedCredential {
                credential_id: URL_SAFE_NO_PAD.encode(passkey.cred_id().as_slice()),
            })),
            Err(e) => Ok(VerificationOutcome::Rejected(e.to_string())),
        }
    }
}

/// Built-in authenticator, discoverable credential, user verification
fn platform_selection() -> AuthenticatorSelectionCriteria {
    AuthenticatorSelectionCriteria {
        authenticator_attachment: Some(AuthenticatorAttachment::Platform),
        resident_key: Some(ResidentKeyRequirement::Required),
        require_resident_key: true,
        user_verification: UserVerificationPolicy::Required,
    }
}

fn parse_origin(origin: &str) -> Result<Url, RelyingPartyError> {
    Url::parse(origin).map_err(|e| RelyingPartyError::Config(format!("Invalid origin {origin}: {e}")))
}
