//! Pending challenge sessions, keyed by session key.
//!
//! Sessions are single-use: there is no read without removal. Entries older
//! than the configured TTL are treated as absent on lookup and swept in the
//! background by [`session_sweeper`].

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Session key already present: {0}")]
    Conflict(String),
}

struct Entry<S> {
    session: S,
    created_at: Instant,
}

/// Concurrency-safe, owned session map
pub struct SessionStore<S> {
    sessions: Mutex<HashMap<String, Entry<S>>>,
    ttl: Duration,
    expired: AtomicU64,
}

impl<S> SessionStore<S> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
            expired: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Insert a new session. Fails if the key is already live.
    pub async fn put(&self, key: String, session: S) -> Result<(), StoreError> {
        let mut sessions = self.sessions.lock().await;

        match sessions.get(&key) {
            Some(existing) if !self.is_expired(existing) => {
                return Err(StoreError::Conflict(key));
            }
            Some(_) => {
                self.expired.fetch_add(1, Ordering::Relaxed);
            }
            None => {}
        }

        sessions.insert(
            key,
            Entry {
                session,
                created_at: Instant::now(),
            },
        );
        Ok(())
    }

    /// Atomically look up and remove a session.
    ///
    /// Under concurrent calls for the same key exactly one caller receives
    /// `Some`. An expired entry is removed and reported as absent.
    pub async fn take(&self, key: &str) -> Option<S> {
        let entry = self.sessions.lock().await.remove(key)?;

        if self.is_expired(&entry) {
            self.expired.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(session_key = %key, "Expired session discarded on lookup");
            return None;
        }

        Some(entry.session)
    }

    /// Remove every expired session, returning how many were evicted
    pub async fn sweep(&self) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, entry| entry.created_at.elapsed() < self.ttl);
        let evicted = before - sessions.len();

        self.expired.fetch_add(evicted as u64, Ordering::Relaxed);
        evicted
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    /// Sessions evicted by expiry since startup
    pub fn expired_count(&self) -> u64 {
        self.expired.load(Ordering::Relaxed)
    }

    fn is_expired(&self, entry: &Entry<S>) -> bool {
        entry.created_at.elapsed() >= self.ttl
    }
}

/// Background worker that evicts expired sessions
pub async fn session_sweeper<S>(
    store: Arc<SessionStore<S>>,
    interval: Duration,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) where
    S: Send + 'static,
{
    tracing::info!(
        interval_secs = interval.as_secs(),
        ttl_secs = store.ttl().as_secs(),
        "🧹 Session sweeper started"
    );

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                let evicted = store.sweep().await;
                if evicted > 0 {
                    tracing::debug!(evicted, "Evicted expired sessions");
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("🧹 Session sweeper shutting down...");
                break;
            }
        }
    }
}
