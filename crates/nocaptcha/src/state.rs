//! Application state and shared resources.

use std::sync::Arc;
use std::time::Instant;

use crate::challenge::{ChallengeService, RelyingParty};
use crate::config::AppConfig;

/// Shared application state
pub struct AppState<R: RelyingParty> {
    /// Application configuration
    pub config: Arc<AppConfig>,

    /// Challenge protocol (owns the session store and id generator)
    pub challenges: Arc<ChallengeService<R>>,

    /// Process start, for uptime reporting
    pub started_at: Instant,
}

impl<R: RelyingParty> AppState<R> {
    pub fn new(config: AppConfig, challenges: Arc<ChallengeService<R>>) -> Self {
        Self {
            config: Arc::new(config),
            challenges,
            started_at: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

// Manual impl: deriving would demand `R: Clone`.
impl<R: RelyingParty> Clone for AppState<R> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            challenges: Arc::clone(&self.challenges),
            started_at: self.started_at,
        }
    }
}
