//! Anti-forgery state management for the OAuth dance.
//!
//! The state value travels in a scoped cookie AND is tracked server-side in a
//! single-use store: `consume` removes the entry atomically, so a replayed
//! callback with a still-valid cookie fails even before the cookie is cleared.

use std::time::{Duration, Instant};

use dashmap::DashMap;

/// TTL for pending state entries (10 minutes, matching the state cookie).
const STATE_TTL: Duration = Duration::from_secs(600);

/// Generate a cryptographically random state value (CSRF token).
pub fn generate_state() -> String {
    use base64::Engine;
    use rand::RngCore;

    let mut bytes = [0u8; 24];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// In-memory store for pending authorization states (keyed by state value).
pub struct OAuthStateStore {
    states: DashMap<String, Instant>,
}

impl OAuthStateStore {
    pub fn new() -> Self {
        Self {
            states: DashMap::new(),
        }
    }

    /// Record a state issued by an authorization request.
    pub fn insert(&self, state: String) {
        self.states.insert(state, Instant::now());
    }

    /// Consume a state exactly once. Returns `false` if unknown, already
    /// consumed, or expired.
    pub fn consume(&self, state: &str) -> bool {
        let Some((_, created_at)) = self.states.remove(state) else {
            return false;
        };
        created_at.elapsed() <= STATE_TTL
    }

    /// Evict expired entries.
    pub fn cleanup(&self) {
        self.states.retain(|_, created_at| created_at.elapsed() <= STATE_TTL);
    }

    /// Spawn a periodic cleanup task.
    pub fn spawn_cleanup_task(self: &std::sync::Arc<Self>) -> tokio::task::JoinHandle<()> {
        let store = std::sync::Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                store.cleanup();
            }
        })
    }
}

impl Default for OAuthStateStore {
    fn default() -> Self {
        Self::new()
    }
}
