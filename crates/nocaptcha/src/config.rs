//! Configuration management for NoCaptcha.
//!
//! Sources, lowest to highest precedence:
//! `config/nocaptcha.toml`, `config/nocaptcha-{profile}.toml`, CLI / env.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

use nocaptcha_common::constants::{
    DEFAULT_CEREMONY_TIMEOUT_MS, DEFAULT_LISTEN_ADDR, DEFAULT_SESSION_TTL_SECS,
    DEFAULT_SWEEP_INTERVAL_SECS, DEFAULT_VERIFY_TIMEOUT_MS,
};

/// Deployment profile; selects the profile config file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    #[default]
    Dev,
    Ci,
    Staging,
    Prod,
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Dev => "dev",
            Self::Ci => "ci",
            Self::Staging => "staging",
            Self::Prod => "prod",
        };
        f.write_str(name)
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Active profile (set from the CLI, not from files)
    #[serde(skip)]
    pub profile: Profile,

    /// Relying party settings
    #[serde(default)]
    pub wan: WanConfig,

    /// Pending session handling
    #[serde(default)]
    pub session: SessionConfig,

    /// Restrictive CORS policy for the API routes
    #[serde(default)]
    pub cors: CorsConfig,
}

/// WebAuthn relying party configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WanConfig {
    /// Comma-separated accepted origins; the first is the trusted origin
    #[serde(default)]
    pub origins: String,

    /// Relying party identifier (effective domain)
    #[serde(default)]
    pub id: String,

    /// Relying party display name
    #[serde(default = "default_rp_name")]
    pub name: String,

    /// Ceremony timeout handed to the authenticator
    #[serde(default = "default_ceremony_timeout")]
    pub timeout_ms: u64,

    /// Demand a built-in authenticator with a discoverable, user-verified key
    #[serde(default = "default_platform_only")]
    pub platform_only: bool,
}

impl WanConfig {
    pub fn origin_list(&self) -> Vec<String> {
        self.origins
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(ToString::to_string)
            .collect()
    }
}

impl Default for WanConfig {
    fn default() -> Self {
        Self {
            origins: String::new(),
            id: String::new(),
            name: default_rp_name(),
            timeout_ms: default_ceremony_timeout(),
            platform_only: default_platform_only(),
        }
    }
}

/// Session lifetime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Lifetime of a pending challenge
    #[serde(default = "default_session_ttl")]
    pub ttl_secs: u64,

    /// How often expired sessions are swept
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Upper bound on one verification call
    #[serde(default = "default_verify_timeout")]
    pub verify_timeout_ms: u64,
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn verify_timeout(&self) -> Duration {
        Duration::from_millis(self.verify_timeout_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_session_ttl(),
            sweep_interval_secs: default_sweep_interval(),
            verify_timeout_ms: default_verify_timeout(),
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    #[serde(default)]
    pub allow_origins: Vec<String>,

    #[serde(default = "default_allow_methods")]
    pub allow_methods: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origins: Vec::new(),
            allow_methods: default_allow_methods(),
        }
    }
}

// Default value functions
fn default_listen_addr() -> String { DEFAULT_LISTEN_ADDR.to_string() }
fn default_rp_name() -> String { "NoCaptcha".to_string() }
fn default_ceremony_timeout() -> u64 { DEFAULT_CEREMONY_TIMEOUT_MS }
fn default_platform_only() -> bool { true }
fn default_session_ttl() -> u64 { DEFAULT_SESSION_TTL_SECS }
fn default_sweep_interval() -> u64 { DEFAULT_SWEEP_INTERVAL_SECS }
fn default_verify_timeout() -> u64 { DEFAULT_VERIFY_TIMEOUT_MS }
fn default_allow_methods() -> Vec<String> {
    vec!["POST".to_string(), "PUT".to_string(), "OPTIONS".to_string()]
}

impl AppConfig {
    /// Load configuration from files, with CLI overrides
    pub fn load(config_path: &str, args: &super::Args) -> Result<Self> {
        let profile_path = profile_path(config_path, args.profile);

        let mut builder = config::Config::builder();
        for path in [config_path, profile_path.as_str()] {
            if Path::new(path).exists() {
                builder = builder.add_source(config::File::with_name(path));
            }
        }

        let settings = builder.build().context("Failed to load config file")?;
        let mut config: AppConfig = settings
            .try_deserialize()
            .context("Failed to parse config")?;
        config.profile = args.profile;

        // Apply CLI overrides
        if let Some(ref listen) = args.listen {
            config.listen_addr = listen.clone();
        }
        if let Some(ref id) = args.wan_id {
            config.wan.id = id.clone();
        }
        if let Some(ref origins) = args.wan_origins {
            config.wan.origins = origins.clone();
        }

        for (key, value) in [("wan.id", &config.wan.id), ("wan.origins", &config.wan.origins)] {
            if value.trim().is_empty() {
                tracing::warn!(key, "Missing env/secret");
            }
        }

        Ok(config)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            profile: Profile::default(),
            wan: WanConfig::default(),
            session: SessionConfig::default(),
            cors: CorsConfig::default(),
        }
    }
}

/// `config/nocaptcha.toml` -> `config/nocaptcha-prod.toml`
fn profile_path(config_path: &str, profile: Profile) -> String {
    let path = Path::new(config_path);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("nocaptcha");
    let file = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}-{profile}.{ext}"),
        None => format!("{stem}-{profile}"),
    };

    path.with_file_name(file).to_string_lossy().into_owned()
}
