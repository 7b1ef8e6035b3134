//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the in-memory session registry.

use crate::config::Config;
use dumpster_core::{
    domain::Identity,
    identity::OrganizationDirectory,
    ports::{PortError, PortResult},
    service::ReportService,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub reports: Arc<ReportService>,
    pub directory: Arc<OrganizationDirectory>,
    pub sessions: SessionRegistry,
    pub config: Arc<Config>,
}

//=========================================================================================
// SessionRegistry (Who Is Acting, Per Browser Session)
//=========================================================================================

/// Maps session tokens to the identity that logged in with them.
/// Lives only in memory: a restart logs everybody out.
///
/// Sessions idle for longer than `idle_ttl` are dropped, and the registry never
/// holds more than `max_sessions`: logging in past the cap evicts the session
/// that was used least recently.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<String, Session>>>,
    idle_ttl: Duration,
    max_sessions: usize,
}

struct Session {
    identity: Identity,
    last_seen: Instant,
}

pub const DEFAULT_SESSION_IDLE_TTL: Duration = Duration::from_secs(12 * 60 * 60);
pub const DEFAULT_MAX_SESSIONS: usize = 10_000;

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_IDLE_TTL, DEFAULT_MAX_SESSIONS)
    }
}

impl SessionRegistry {
    pub fn new(idle_ttl: Duration, max_sessions: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            idle_ttl,
            max_sessions: max_sessions.max(1),
        }
    }

    /// Starts a session for `identity` and returns its token.
    pub async fn login(&self, identity: Identity) -> String {
        let token = Uuid::new_v4().to_string();
        let now = Instant::now();
        let mut sessions = self.inner.write().await;

        sessions.retain(|_, s| now.duration_since(s.last_seen) < self.idle_ttl);
        while sessions.len() >= self.max_sessions {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, s)| s.last_seen)
                .map(|(token, _)| token.clone());
            match oldest {
                Some(oldest) => {
                    sessions.remove(&oldest);
                    debug!("session registry full, evicted the least recently used session");
                }
                None => break,
            }
        }

        sessions.insert(
            token.clone(),
            Session {
                identity,
                last_seen: now,
            },
        );
        token
    }

    /// Ends the session. Returns false if the token was unknown.
    pub async fn logout(&self, token: &str) -> bool {
        self.inner.write().await.remove(token).is_some()
    }

    /// Looks up the identity behind `token` and marks the session as used.
    pub async fn resolve(&self, token: &str) -> PortResult<Identity> {
        let now = Instant::now();
        let mut sessions = self.inner.write().await;
        match sessions.get_mut(token) {
            None => return Err(PortError::Unauthenticated),
            Some(session) if now.duration_since(session.last_seen) < self.idle_ttl => {
                session.last_seen = now;
                return Ok(session.identity.clone());
            }
            Some(_) => {}
        }
        sessions.remove(token);
        Err(PortError::Unauthenticated)
    }

    /// Number of sessions currently held, expired ones included until the next login prunes them.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dumpster_core::domain::Role;

    fn asha() -> Identity {
        Identity {
            role: Role::CommonUser,
            email: "asha@example.com".to_string(),
            display_name: Some("Asha".to_string()),
        }
    }

    #[tokio::test]
    async fn logout_forgets_the_identity() {
        let registry = SessionRegistry::default();
        let identity = Identity {
            role: Role::Organization,
            email: "ngo@example.org".to_string(),
            display_name: None,
        };

        let token = registry.login(identity.clone()).await;
        assert_eq!(registry.resolve(&token).await.unwrap(), identity);

        assert!(registry.logout(&token).await);
        assert!(!registry.logout(&token).await);
        assert!(matches!(
            registry.resolve(&token).await,
            Err(PortError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn repeated_logins_stay_within_the_cap() {
        let registry = SessionRegistry::new(DEFAULT_SESSION_IDLE_TTL, 3);

        let first = registry.login(asha()).await;
        let mut last = String::new();
        for _ in 0..1_000 {
            last = registry.login(asha()).await;
        }

        assert_eq!(registry.len().await, 3);
        assert!(matches!(
            registry.resolve(&first).await,
            Err(PortError::Unauthenticated)
        ));
        assert_eq!(registry.resolve(&last).await.unwrap(), asha());
    }

    #[tokio::test]
    async fn recently_used_sessions_survive_eviction() {
        let registry = SessionRegistry::new(DEFAULT_SESSION_IDLE_TTL, 2);

        let kept = registry.login(asha()).await;
        let dropped = registry.login(asha()).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        registry.resolve(&kept).await.unwrap();

        registry.login(asha()).await;

        assert!(registry.resolve(&kept).await.is_ok());
        assert!(registry.resolve(&dropped).await.is_err());
    }

    #[tokio::test]
    async fn idle_sessions_expire() {
        let registry = SessionRegistry::new(Duration::from_millis(20), DEFAULT_MAX_SESSIONS);

        let stale = registry.login(asha()).await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(matches!(
            registry.resolve(&stale).await,
            Err(PortError::Unauthenticated)
        ));
        assert!(registry.is_empty().await);

        let fresh = registry.login(asha()).await;
        assert!(registry.resolve(&fresh).await.is_ok());
        assert_eq!(registry.len().await, 1);
    }
}
