//! Per-session registry: one explorer per issued token, expired entries
//! pruned on access. Session state is owned here and never enters the shared
//! caches.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use parking_lot::{Mutex, RwLock};

use crate::explorer::Explorer;
use crate::tprintln;

pub type SessionToken = String;

pub struct SessionEntry {
    explorer: Arc<Mutex<Explorer>>,
    issued_at: Instant,
    expires_at: Instant,
}

fn gen_token() -> String {
    // 256-bit random token base64url without padding
    let mut buf = [0u8; 32];
    let _ = getrandom::getrandom(&mut buf);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf)
}

pub struct SessionManager {
    pub ttl: Duration,
    sessions: RwLock<HashMap<SessionToken, SessionEntry>>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(Duration::from_secs(60 * 60))
    }
}

impl SessionManager {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, sessions: RwLock::new(HashMap::new()) }
    }

    /// Register a fresh explorer under a new token.
    pub fn issue(&self, explorer: Explorer) -> SessionToken {
        let now = Instant::now();
        let token = gen_token();
        let entry = SessionEntry {
            explorer: Arc::new(Mutex::new(explorer)),
            issued_at: now,
            expires_at: now + self.ttl,
        };
        self.sessions.write().insert(token.clone(), entry);
        tprintln!("session.issue ttl_secs={}", self.ttl.as_secs());
        token
    }

    /// Resolve a token to its explorer. Expired entries are removed on the
    /// way out and report as absent.
    pub fn validate(&self, token: &str) -> Option<Arc<Mutex<Explorer>>> {
        let now = Instant::now();
        let mut drop_key: Option<String> = None;
        let out = {
            let map = self.sessions.read();
            if let Some(ent) = map.get(token) {
                if ent.expires_at > now {
                    Some(ent.explorer.clone())
                } else {
                    drop_key = Some(token.to_string());
                    None
                }
            } else {
                None
            }
        };
        if let Some(k) = drop_key {
            self.sessions.write().remove(&k);
        }
        out
    }

    /// Explicitly end a session. Returns whether it existed.
    pub fn end(&self, token: &str) -> bool {
        let removed = self.sessions.write().remove(token).is_some();
        if removed {
            tprintln!("session.end");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Age of a live session, mostly for diagnostics.
    pub fn age_of(&self, token: &str) -> Option<Duration> {
        self.sessions.read().get(token).map(|e| e.issued_at.elapsed())
    }
}
