//! Process-wide identifier allocation and the session-key lookup shared by
//! every connection.
//!
//! Each counter hands out its current value and advances by one, so two
//! callers never observe the same value. The key → persona map is sharded;
//! no lock is held beyond a single insert or lookup.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

/// First user id handed out.
pub const FIRST_USER_ID: u64 = 1_000_000_000_000;

const SESSION_KEY_PREFIX: &str = "W5NyZzx";
const SESSION_KEY_SUFFIX: &str = "Cki6GQAAKDw.";

/// Counters and session-key registry shared across connections.
pub struct SharedIdentity {
    next_user_id: AtomicU64,
    next_session_key: AtomicU64,
    next_game_id: AtomicU64,
    next_lobby_id: AtomicU64,
    next_pnow_id: AtomicU64,
    personas: DashMap<String, String>,
}

impl SharedIdentity {
    pub fn new() -> Self {
        Self {
            next_user_id: AtomicU64::new(FIRST_USER_ID),
            next_session_key: AtomicU64::new(1),
            next_game_id: AtomicU64::new(1),
            next_lobby_id: AtomicU64::new(1),
            next_pnow_id: AtomicU64::new(1),
            personas: DashMap::new(),
        }
    }

    pub fn next_user_id(&self) -> u64 {
        self.next_user_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Allocate a fresh session key (`lkey`).
    pub fn next_session_key(&self) -> String {
        let n = self.next_session_key.fetch_add(1, Ordering::Relaxed);
        format!("{SESSION_KEY_PREFIX}{n}{SESSION_KEY_SUFFIX}")
    }

    pub fn next_game_id(&self) -> u64 {
        self.next_game_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn next_lobby_id(&self) -> u64 {
        self.next_lobby_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Allocate an id for a matchmaking ("play now") session.
    pub fn next_pnow_id(&self) -> u64 {
        self.next_pnow_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Associate a session key with a display name, replacing any previous
    /// entry.
    pub fn register(&self, session_key: &str, display_name: &str) {
        self.personas
            .insert(session_key.to_string(), display_name.to_string());
    }

    /// Display name registered for `session_key`.
    pub fn lookup(&self, session_key: &str) -> Option<String> {
        self.personas
            .get(session_key)
            .map(|entry| entry.value().clone())
    }

    /// Number of registered session keys.
    pub fn registered(&self) -> usize {
        self.personas.len()
    }
}

impl Default for SharedIdentity {
    fn default() -> Self {
        Self::new()
    }
}
