//! Session resolution: tracks the currently signed-in identity.
//!
//! The resolver starts in the loading state, resolves once, then re-resolves
//! on every provider notification. Each resolution replaces the published
//! state wholesale; nothing from the previous identity survives a change.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use super::model::{Identity, Session};
use crate::error::SessionError;

/// Notification that the session may have changed elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEvent {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

/// External identity provider.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Fetch the current session, if any.
    async fn current_session(&self) -> Result<Option<Session>, SessionError>;

    /// Subscribe to session-change notifications.
    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;
}

/// Published output of the session resolver.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub identity: Option<Arc<Identity>>,
    pub is_loading: bool,
    /// Message of the last failed resolution, if it failed.
    pub error: Option<String>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            identity: None,
            is_loading: true,
            error: None,
        }
    }
}

impl SessionState {
    fn settled(identity: Option<Arc<Identity>>, error: Option<String>) -> Self {
        Self {
            identity,
            is_loading: false,
            error,
        }
    }
}

/// Resolves and tracks the signed-in identity.
pub struct SessionResolver {
    provider: Arc<dyn SessionProvider>,
    timeout: Duration,
    state: watch::Sender<SessionState>,
}

impl SessionResolver {
    pub fn new(provider: Arc<dyn SessionProvider>, timeout: Duration) -> Arc<Self> {
        let (state, _rx) = watch::channel(SessionState::default());
        Arc::new(Self {
            provider,
            timeout,
            state,
        })
    }

    /// Subscribe to state replacements.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Resolve the session once and publish the result.
    ///
    /// Always settles: failures and timeouts publish an absent identity.
    pub async fn resolve(&self) -> Option<Arc<Identity>> {
        self.resolve_tracked().await.0
    }

    /// Resolve and also report when the published session expires.
    async fn resolve_tracked(&self) -> (Option<Arc<Identity>>, Option<DateTime<Utc>>) {
        let mut expires_at = None;
        let next = match tokio::time::timeout(self.timeout, self.provider.current_session()).await {
            Ok(Ok(Some(session))) if session.is_expired() => {
                debug!(user_id = %session.identity.id, "Session expired; treating as signed out");
                SessionState::settled(None, None)
            }
            Ok(Ok(Some(session))) => {
                expires_at = Some(session.expires_at);
                SessionState::settled(Some(session.identity), None)
            }
            Ok(Ok(None)) => SessionState::settled(None, None),
            Ok(Err(e)) => {
                warn!(error = %e, "Session resolution failed");
                SessionState::settled(None, Some(e.to_string()))
            }
            Err(_) => {
                let e = SessionError::Timeout {
                    timeout: self.timeout,
                };
                warn!(error = %e, "Session resolution failed");
                SessionState::settled(None, Some(e.to_string()))
            }
        };

        let identity = next.identity.clone();
        let previous = self.state.send_replace(next);
        let previous_id = previous.identity.as_ref().map(|i| &i.id);
        let current_id = identity.as_ref().map(|i| &i.id);
        if previous_id != current_id {
            info!(
                from = ?previous_id.map(|id| id.as_str()),
                to = ?current_id.map(|id| id.as_str()),
                "Identity changed"
            );
        }
        (identity, expires_at)
    }

    /// Resolve once, then keep re-resolving on every provider notification
    /// and whenever the current session reaches its expiry.
    pub fn spawn(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let resolver = Arc::clone(self);
        // Subscribe before the first resolution so no notification slips between.
        let mut events = resolver.provider.subscribe();
        tokio::spawn(async move {
            let (_, mut expires_at) = resolver.resolve_tracked().await;
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Ok(event) => debug!(?event, "Session notification"),
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Session notifications lagged; resolving");
                        }
                        Err(RecvError::Closed) => {
                            debug!("Session provider closed; resolver stopping");
                            break;
                        }
                    },
                    () = until(expires_at) => debug!("Session reached its expiry"),
                }
                expires_at = resolver.resolve_tracked().await.1;
            }
        })
    }
}

/// Sleep until `deadline`, or forever without one.
async fn until(deadline: Option<DateTime<Utc>>) {
    match deadline {
        Some(at) => {
            let remaining = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::time::sleep(remaining).await;
        }
        None => std::future::pending().await,
    }
}
