//! Passkey challenge endpoints.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use serde_json::json;

use nocaptcha_common::constants::messages;
use nocaptcha_common::{ChallengeIssued, ChallengeRequest, Envelope, NoCaptchaError};

use super::ApiError;
use crate::challenge::RelyingParty;
use crate::state::AppState;

/// Issue a new disposable passkey challenge
///
/// Returns:
/// - 201: `{ pubKeyCredOpts }`, the credential creation options as a JSON string
/// - 400: missing or blank `id`, malformed body
/// - 500: the relying party could not mint a challenge
pub async fn start<R: RelyingParty>(
    State(state): State<AppState<R>>,
    payload: Result<Json<ChallengeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ChallengeIssued>), ApiError> {
    let request = decode(payload)?;
    let subject = request.id.unwrap_or_default();

    let issued = state.challenges.start(&subject).await?;

    Ok((
        StatusCode::CREATED,
        Json(ChallengeIssued {
            pub_key_cred_opts: issued.options,
        }),
    ))
}

/// Redeem a challenge with the client's signed response
///
/// Returns:
/// - 202: verified
/// - 400: unknown or already used session, rejected or malformed response
/// - 500: verification could not be carried out
pub async fn complete<R: RelyingParty>(
    State(state): State<AppState<R>>,
    payload: Result<Json<ChallengeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Envelope<serde_json::Value>>), ApiError> {
    let request = decode(payload)?;
    let session_key = request.id.unwrap_or_default();
    let response = request.pub_key_cred_opts.unwrap_or_default();

    state.challenges.complete(&session_key, response).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(Envelope::success(json!({}), StatusCode::ACCEPTED.as_u16())),
    ))
}

fn decode(
    payload: Result<Json<ChallengeRequest>, JsonRejection>,
) -> Result<ChallengeRequest, ApiError> {
    payload.map(|Json(request)| request).map_err(|rejection| {
        tracing::debug!(error = %rejection, "Rejected request body");
        NoCaptchaError::invalid(messages::INVALID_JSON).into()
    })
}
