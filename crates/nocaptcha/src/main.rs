//! # NoCaptcha
//!
//! Proves a live user agent sits behind a request by having it complete a
//! disposable WebAuthn passkey registration instead of solving a puzzle.
//!
//! ## Flow
//! ```text
//! client ── POST /v1/nocaptcha/start ──▶ options (challenge, user.id)
//!    │
//!    └─ navigator.credentials.create()
//!    │
//! client ── PUT /v1/nocaptcha/complete ─▶ 202 verified / 400 rejected
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use nocaptcha_common::{IdGenerator, error};

mod challenge;
mod config;
mod routes;
mod state;

use challenge::{ChallengeService, SessionStore, WebauthnRelyingParty, session_sweeper};
use config::{AppConfig, Profile};
use state::AppState;

/// NoCaptcha - passkey-based human verification
#[derive(Parser, Debug)]
#[command(name = "nocaptcha")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/nocaptcha.toml")]
    config: String,

    /// Deployment profile (selects config/nocaptcha-{profile}.toml)
    #[arg(short, long, value_enum, default_value_t = Profile::Dev, env = "NOCAPTCHA_PROFILE")]
    profile: Profile,

    /// Listen address (overrides config)
    #[arg(short, long, env = "LISTEN_ADDR")]
    listen: Option<String>,

    /// Relying party id (overrides config)
    #[arg(long, env = "WAN_ID")]
    wan_id: Option<String>,

    /// Comma-separated relying party origins (overrides config)
    #[arg(long, env = "WAN_ORIGINS")]
    wan_origins: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, default_value = "false")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level, args.json_logs)?;

    info!("🔐 Starting NoCaptcha v{}", env!("CARGO_PKG_VERSION"));

    let codes = error::install().context("Failed to install error codes")?;
    info!(codes = codes.len(), "Error codes registered");

    // Load configuration
    let config = AppConfig::load(&args.config, &args)?;
    info!(profile = %config.profile, "📋 Configuration loaded from {}", args.config);
    if config.profile == Profile::Dev {
        info!("Effective configuration: {}", serde_json::to_string(&config)?);
    }

    // Create shutdown broadcast channel
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    // Relying party and pending sessions
    let relying_party =
        WebauthnRelyingParty::new(&config.wan).context("Failed to configure relying party")?;
    info!(
        rp_id = %config.wan.id,
        trusted_origin = %challenge::RelyingParty::trusted_origin(&relying_party),
        "Relying party ready"
    );

    let sessions = Arc::new(SessionStore::new(config.session.ttl()));

    // Spawn session sweeper
    let sweeper_store = sessions.clone();
    let sweeper_interval = config.session.sweep_interval();
    let sweeper_shutdown = shutdown_tx.subscribe();
    tokio::spawn(async move {
        session_sweeper(sweeper_store, sweeper_interval, sweeper_shutdown).await;
    });

    let challenges = Arc::new(ChallengeService::new(
        Arc::new(relying_party),
        IdGenerator::new(),
        sessions,
        config.session.verify_timeout(),
    ));

    // Initialize application state
    let listen_addr = config.listen_addr.clone();
    let state = AppState::new(config, challenges);

    // Build router
    let app = routes::create_router(state)?;

    // Start server
    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("Failed to bind {listen_addr}"))?;
    info!("🚀 NoCaptcha listening on {}", listen_addr);

    // Handle graceful shutdown
    let shutdown_signal = async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("🛑 Shutdown signal received");
        let _ = shutdown_tx.send(());
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error")?;

    info!("👋 NoCaptcha shutdown complete");
    Ok(())
}

/// Initialize structured logging with tracing
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("Invalid log level: {level}"))?;

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }

    Ok(())
}
