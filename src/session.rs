//! Caller sessions
//!
//! Maps opaque bearer tokens to user ids. Tokens are issued on login and
//! resolved at the orchestrator boundary to find the acting wallet.

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::error::{Error, Result};

/// Session store contract
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Bind `token` to `user_id`, replacing any previous binding
    async fn put(&self, token: &str, user_id: Uuid) -> Result<()>;

    /// Resolve a token. Expired or unknown tokens resolve to `None`.
    async fn get(&self, token: &str) -> Result<Option<Uuid>>;

    /// Drop a token
    async fn expire(&self, token: &str) -> Result<()>;
}

struct SessionEntry {
    user_id: Uuid,
    issued_at: Instant,
}

/// Process-local session store
pub struct InMemorySessionStore {
    sessions: DashMap<String, SessionEntry>,
    ttl: Option<Duration>,
}

impl InMemorySessionStore {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.ttl())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn is_expired(&self, entry: &SessionEntry) -> bool {
        self.ttl.map(|ttl| entry.issued_at.elapsed() >= ttl).unwrap_or(false)
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn put(&self, token: &str, user_id: Uuid) -> Result<()> {
        let token = normalize_token(token)?;
        self.sessions.insert(
            token.to_string(),
            SessionEntry {
                user_id,
                issued_at: Instant::now(),
            },
        );
        debug!("Session bound for user {}", user_id);
        Ok(())
    }

    async fn get(&self, token: &str) -> Result<Option<Uuid>> {
        let token = normalize_token(token)?;

        let expired = match self.sessions.get(token) {
            Some(entry) if !self.is_expired(&entry) => return Ok(Some(entry.user_id)),
            Some(_) => true,
            None => false,
        };

        if expired {
            self.sessions.remove(token);
            debug!("Session expired");
        }
        Ok(None)
    }

    async fn expire(&self, token: &str) -> Result<()> {
        let token = normalize_token(token)?;
        self.sessions.remove(token);
        Ok(())
    }
}

/// Strip an optional `Bearer ` scheme and surrounding whitespace
pub fn normalize_token(raw: &str) -> Result<&str> {
    let trimmed = raw.trim();
    let token = match trimmed.split_once(char::is_whitespace) {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        _ if trimmed.eq_ignore_ascii_case("bearer") => "",
        _ => trimmed,
    };

    if token.is_empty() {
        return Err(Error::Unauthorized("Missing session token".to_string()));
    }
    Ok(token)
}
