//! Continuation cache: page token → live provider set.
//!
//! Every page served stores its session again under a fresh token. An entry
//! expires after `idle_ttl` without a lookup, and in any case `max_lifetime`
//! after it was stored. Eviction is left to `moka`.

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge};
use moka::sync::Cache;
use tracing::debug;
use uuid::Uuid;

use crate::error::FeedError;
use crate::metrics::{CONTINUATION_MISSES, CONTINUATION_SESSIONS};
use crate::ranking::ProviderSet;

/// A session is used by one request at a time; a second request resuming the
/// same chain waits on the mutex.
pub type SharedSession = Arc<tokio::sync::Mutex<ProviderSet>>;

pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_MAX_LIFETIME: Duration = Duration::from_secs(45 * 60);
pub const DEFAULT_MAX_SESSIONS: u64 = 10_000;

pub struct ContinuationCache {
    sessions: Cache<String, SharedSession>,
    idle_ttl: Duration,
}

impl Default for ContinuationCache {
    fn default() -> Self {
        Self::new(DEFAULT_IDLE_TTL, DEFAULT_MAX_LIFETIME)
    }
}

impl ContinuationCache {
    pub fn new(idle_ttl: Duration, max_lifetime: Duration) -> Self {
        Self::with_capacity(idle_ttl, max_lifetime, DEFAULT_MAX_SESSIONS)
    }

    /// Past `max_sessions`, the least recently used sessions are evicted first.
    pub fn with_capacity(idle_ttl: Duration, max_lifetime: Duration, max_sessions: u64) -> Self {
        let sessions = Cache::builder()
            .max_capacity(max_sessions)
            .time_to_idle(idle_ttl)
            .time_to_live(max_lifetime)
            .build();
        Self { sessions, idle_ttl }
    }

    pub fn idle_ttl(&self) -> Duration {
        self.idle_ttl
    }

    /// Store `session` under a newly minted token.
    pub fn put(&self, session: SharedSession) -> String {
        let token = Uuid::new_v4().to_string();
        self.sessions.insert(token.clone(), session);
        gauge!(CONTINUATION_SESSIONS).set(self.sessions.entry_count() as f64);
        token
    }

    /// Look a token up. A hit refreshes the idle timer; an expired or
    /// unknown token is a miss.
    pub fn get(&self, token: &str) -> Result<SharedSession, FeedError> {
        match self.sessions.get(token) {
            Some(session) => Ok(session),
            None => {
                debug!("page token miss");
                counter!(CONTINUATION_MISSES).increment(1);
                Err(FeedError::TokenNotFound)
            }
        }
    }

    /// Live sessions, after flushing moka's pending evictions.
    pub fn len(&self) -> usize {
        self.sessions.run_pending_tasks();
        self.sessions.entry_count() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
