//! Wires the session resolver, profile resolver and aggregator together.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::profile::{ProfileResolver, ProfileStore};
use super::session::{SessionProvider, SessionResolver};
use super::snapshot::{AuthStateAggregator, AuthStateSnapshot, aggregate};
use crate::config::GateConfig;

/// Running auth state machinery. Dropping it stops the background tasks.
pub struct AuthRuntime {
    pub sessions: Arc<SessionResolver>,
    pub profiles: Arc<ProfileResolver>,
    pub aggregator: Arc<AuthStateAggregator>,
    tasks: Vec<JoinHandle<()>>,
}

impl AuthRuntime {
    /// Start all three tasks. Consumers subscribe before the session
    /// resolver issues its first resolution.
    pub fn start(
        provider: Arc<dyn SessionProvider>,
        store: Arc<dyn ProfileStore>,
        config: &GateConfig,
    ) -> Self {
        let sessions = SessionResolver::new(provider, config.session_timeout);
        let profiles = ProfileResolver::new(store, config.profile_timeout);
        let aggregator = AuthStateAggregator::new();

        let tasks = vec![
            aggregator.spawn(sessions.subscribe(), profiles.subscribe()),
            profiles.spawn(sessions.subscribe()),
            sessions.spawn(),
        ];

        Self {
            sessions,
            profiles,
            aggregator,
            tasks,
        }
    }

    pub fn snapshot(&self) -> Arc<AuthStateSnapshot> {
        self.aggregator.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<AuthStateSnapshot>> {
        self.aggregator.subscribe()
    }

    /// Wait for the next snapshot that is not loading.
    pub async fn settled(&self) -> Arc<AuthStateSnapshot> {
        let mut rx = self.subscribe();
        match rx.wait_for(|s| !s.is_loading).await {
            Ok(snapshot) => Arc::clone(&snapshot),
            Err(_) => self.snapshot(),
        }
    }

    /// Wait up to `limit` for a snapshot matching `predicate`.
    pub async fn wait_for(
        &self,
        limit: Duration,
        mut predicate: impl FnMut(&AuthStateSnapshot) -> bool,
    ) -> Option<Arc<AuthStateSnapshot>> {
        let mut rx = self.subscribe();
        match tokio::time::timeout(limit, rx.wait_for(|s| predicate(s))).await {
            Ok(Ok(snapshot)) => Some(Arc::clone(&snapshot)),
            _ => None,
        }
    }

    /// Wait up to `limit` for the published snapshot to reflect the
    /// resolvers' current outputs.
    pub async fn synced(&self, limit: Duration) -> Option<Arc<AuthStateSnapshot>> {
        self.wait_for(limit, |s| {
            *s == aggregate(&self.sessions.state(), &self.profiles.state())
        })
        .await
    }

    /// Explicit "refresh profile" action.
    pub async fn refresh_profile(&self) -> bool {
        self.profiles.refresh().await
    }
}

impl Drop for AuthRuntime {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::local::LocalSessionProvider;
    use crate::auth::model::{CanonicalProfile, Identity, RoleProfile, UserId, UserType};
    use crate::store::memory::MemoryProfileStore;

    const WAIT: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn settles_signed_out() {
        let runtime = AuthRuntime::start(
            LocalSessionProvider::new(),
            MemoryProfileStore::new(),
            &GateConfig::default(),
        );
        let snapshot = tokio::time::timeout(WAIT, runtime.settled()).await.unwrap();
        assert!(snapshot.user.is_none());
        assert!(snapshot.error.is_none());
    }

    #[tokio::test]
    async fn sign_in_flows_into_snapshot() {
        let provider = LocalSessionProvider::new();
        let store = MemoryProfileStore::new();
        let user = UserId::new("u1");
        let mut canonical = CanonicalProfile::new(user.clone());
        canonical.user_type = Some(UserType::Mentee);
        store.save_canonical_profile(&canonical).await.unwrap();
        let mut role = RoleProfile::new(user.clone(), UserType::Mentee);
        role.onboarding_step = 3;
        role.onboarding_completed = true;
        store.save_role_profile(&role).await.unwrap();

        let runtime = AuthRuntime::start(provider.clone(), store, &GateConfig::default());
        let mut rx = runtime.subscribe();
        provider.sign_in(Identity::new("u1")).await;

        let snapshot = tokio::time::timeout(
            WAIT,
            rx.wait_for(|s| s.user.is_some() && !s.is_loading),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();
        assert_eq!(snapshot.user_type, Some(UserType::Mentee));
        assert!(snapshot.onboarding_complete);
        assert_eq!(snapshot.current_onboarding_step, 3);

        provider.sign_out().await;
        tokio::time::timeout(WAIT, rx.wait_for(|s| s.user.is_none() && !s.is_loading))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(runtime.snapshot().user_type, None);
    }

    #[tokio::test]
    async fn expired_session_leaves_the_snapshot() {
        let provider = LocalSessionProvider::with_ttl(chrono::Duration::milliseconds(200));
        let runtime = AuthRuntime::start(
            provider.clone(),
            MemoryProfileStore::new(),
            &GateConfig::default(),
        );
        let mut rx = runtime.subscribe();
        provider.sign_in(Identity::new("u1")).await;
        tokio::time::timeout(WAIT, rx.wait_for(|s| s.user.is_some() && !s.is_loading))
            .await
            .unwrap()
            .unwrap();

        tokio::time::timeout(WAIT, rx.wait_for(|s| s.user.is_none() && !s.is_loading))
            .await
            .unwrap()
            .unwrap();
        assert!(!runtime.snapshot().is_authenticated());
    }

    #[tokio::test]
    async fn refresh_without_user_is_noop() {
        let runtime = AuthRuntime::start(
            LocalSessionProvider::new(),
            MemoryProfileStore::new(),
            &GateConfig::default(),
        );
        tokio::time::timeout(WAIT, runtime.settled()).await.unwrap();
        assert!(!runtime.refresh_profile().await);
    }
}
