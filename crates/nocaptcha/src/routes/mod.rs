//! HTTP route handlers for NoCaptcha.

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use tower_http::cors::{AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use nocaptcha_common::constants::API_VERSION_V1;
use nocaptcha_common::{Envelope, NoCaptchaError};

use crate::challenge::RelyingParty;
use crate::config::CorsConfig;
use crate::state::AppState;

mod health;
mod nocaptcha;

/// Create the main application router
pub fn create_router<R: RelyingParty>(state: AppState<R>) -> Result<Router> {
    let cors = cors_layer(&state.config.cors)?;

    let api = Router::new()
        .route("/nocaptcha/start", post(nocaptcha::start::<R>))
        .route("/nocaptcha/complete", put(nocaptcha::complete::<R>))
        .layer(cors);

    Ok(Router::new()
        // Health & Status
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check::<R>))
        .route("/metrics", get(health::metrics::<R>))

        // Challenge endpoints
        .nest(API_VERSION_V1, api)

        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

/// Restrictive CORS: listed origins and methods only, credentials allowed
fn cors_layer(config: &CorsConfig) -> Result<CorsLayer> {
    let origins = config
        .allow_origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin.trim())
                .with_context(|| format!("Invalid CORS origin: {origin}"))
        })
        .collect::<Result<Vec<_>>>()?;

    let methods = config
        .allow_methods
        .iter()
        .map(|method| {
            Method::from_bytes(method.trim().to_uppercase().as_bytes())
                .with_context(|| format!("Invalid CORS method: {method}"))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::list(methods))
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true))
}

/// Error half of every handler. Internal detail is logged, never returned.
pub struct ApiError(NoCaptchaError);

impl From<NoCaptchaError> for ApiError {
    fn from(err: NoCaptchaError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;

        if err.is_internal() {
            match std::error::Error::source(&err) {
                Some(cause) => {
                    tracing::error!(error = %err, cause = %cause, "Unable to process the request")
                }
                None => tracing::error!(error = %err, "Unable to process the request"),
            }
        } else {
            tracing::debug!(error = %err, "Request rejected");
        }

        let envelope: Envelope<()> = (&err).into();
        let status = envelope
            .error_code()
            .and_then(|code| StatusCode::from_u16(code.http_code).ok())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        (status, Json(envelope)).into_response()
    }
}
