//! In-process session provider.
//!
//! Stands in for a hosted identity provider: holds at most one session and
//! broadcasts a notification on every sign-in, sign-out and token refresh.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use secrecy::SecretString;
use tokio::sync::{RwLock, broadcast};
use tracing::info;
use uuid::Uuid;

use super::model::{Identity, Session};
use super::session::{SessionEvent, SessionProvider};
use crate::error::SessionError;

const EVENT_CAPACITY: usize = 64;

/// Single-session provider backed by process memory.
pub struct LocalSessionProvider {
    session: RwLock<Option<Session>>,
    tx: broadcast::Sender<SessionEvent>,
    ttl: chrono::Duration,
}

impl LocalSessionProvider {
    pub fn new() -> Arc<Self> {
        Self::with_ttl(chrono::Duration::hours(1))
    }

    pub fn with_ttl(ttl: chrono::Duration) -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            session: RwLock::new(None),
            tx,
            ttl,
        })
    }

    fn issue(&self, identity: Arc<Identity>) -> Session {
        Session {
            identity,
            access_token: SecretString::from(Uuid::new_v4().simple().to_string()),
            expires_at: Utc::now() + self.ttl,
        }
    }

    /// Start a session for `identity`, replacing any existing one.
    pub async fn sign_in(&self, identity: Identity) -> Arc<Identity> {
        let identity = Arc::new(identity);
        let session = self.issue(Arc::clone(&identity));
        *self.session.write().await = Some(session);
        info!(user_id = %identity.id, "Signed in");
        let _ = self.tx.send(SessionEvent::SignedIn);
        identity
    }

    /// End the current session. Returns false if nobody was signed in.
    pub async fn sign_out(&self) -> bool {
        let previous = self.session.write().await.take();
        match previous {
            Some(session) => {
                info!(user_id = %session.identity.id, "Signed out");
                let _ = self.tx.send(SessionEvent::SignedOut);
                true
            }
            None => false,
        }
    }

    /// Rotate the access token, keeping the same identity reference.
    pub async fn refresh_token(&self) -> bool {
        let mut guard = self.session.write().await;
        let Some(current) = guard.as_ref() else {
            return false;
        };
        let refreshed = self.issue(Arc::clone(&current.identity));
        *guard = Some(refreshed);
        drop(guard);
        let _ = self.tx.send(SessionEvent::TokenRefreshed);
        true
    }
}

#[async_trait]
impl SessionProvider for LocalSessionProvider {
    async fn current_session(&self) -> Result<Option<Session>, SessionError> {
        Ok(self.session.read().await.clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }
}
