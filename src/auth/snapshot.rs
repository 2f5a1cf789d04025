//! Auth state snapshot: the single merged view used for gating.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::model::{CanonicalProfile, Identity, OnboardingFields, RoleProfile, UserType};
use super::profile::ProfileState;
use super::session::SessionState;

/// Immutable merge of session and profile state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStateSnapshot {
    pub user: Option<Arc<Identity>>,
    pub user_type: Option<UserType>,
    pub onboarding_complete: bool,
    pub current_onboarding_step: u32,
    pub is_auth_loading: bool,
    pub is_profile_loading: bool,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl Default for AuthStateSnapshot {
    fn default() -> Self {
        aggregate(&SessionState::default(), &ProfileState::default())
    }
}

impl AuthStateSnapshot {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

/// Merge resolver outputs into a snapshot. Pure and idempotent.
///
/// Role-profile onboarding fields win over the canonical ones. A profile
/// state that belongs to a different user than the session counts as
/// still loading.
pub fn aggregate(session: &SessionState, profile: &ProfileState) -> AuthStateSnapshot {
    let user = session.identity.clone();
    let profile = match (&user, profile.owner()) {
        (Some(identity), Some(owner)) if identity.id == *owner => Some(profile),
        _ => None,
    };

    let is_profile_loading = match (&user, profile) {
        (None, _) => false,
        (Some(_), Some(p)) => p.is_loading,
        (Some(_), None) => true,
    };

    let canonical = profile.and_then(|p| p.canonical.as_ref());
    let role = profile.and_then(|p| p.role.as_ref());

    let user_type = role
        .map(|r| r.role)
        .or_else(|| canonical.and_then(|c| c.user_type));
    let onboarding = role
        .map(RoleProfile::onboarding)
        .or_else(|| canonical.map(CanonicalProfile::onboarding))
        .unwrap_or_default();

    let is_auth_loading = session.is_loading;
    AuthStateSnapshot {
        is_loading: is_auth_loading || (user.is_some() && is_profile_loading),
        user,
        user_type,
        onboarding_complete: onboarding.completed,
        current_onboarding_step: onboarding.step,
        is_auth_loading,
        is_profile_loading,
        error: session
            .error
            .clone()
            .or_else(|| profile.and_then(|p| p.error.clone())),
    }
}

/// Onboarding fields that disagree between the two profile records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnboardingDivergence {
    pub canonical: OnboardingFields,
    pub role: OnboardingFields,
}

pub fn detect_divergence(profile: &ProfileState) -> Option<OnboardingDivergence> {
    let canonical = profile.canonical.as_ref()?.onboarding();
    let role = profile.role.as_ref()?.onboarding();
    (canonical != role).then_some(OnboardingDivergence { canonical, role })
}

/// Recomputes and publishes the snapshot whenever either resolver changes.
pub struct AuthStateAggregator {
    state: watch::Sender<Arc<AuthStateSnapshot>>,
    version: AtomicU64,
}

impl AuthStateAggregator {
    pub fn new() -> Arc<Self> {
        let (state, _rx) = watch::channel(Arc::new(AuthStateSnapshot::default()));
        Arc::new(Self {
            state,
            version: AtomicU64::new(0),
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<AuthStateSnapshot>> {
        self.state.subscribe()
    }

    /// The latest snapshot. Do not hold on to it across recomputes.
    pub fn snapshot(&self) -> Arc<AuthStateSnapshot> {
        Arc::clone(&self.state.borrow())
    }

    /// Number of distinct snapshots published so far.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Recompute from resolver outputs; publishes only when something changed.
    pub fn recompute(&self, session: &SessionState, profile: &ProfileState) -> bool {
        let next = aggregate(session, profile);
        let published = self.state.send_if_modified(|current| {
            if **current == next {
                return false;
            }
            *current = Arc::new(next.clone());
            self.version.fetch_add(1, Ordering::SeqCst);
            true
        });

        if published {
            debug!(
                user_id = ?next.user.as_ref().map(|u| u.id.as_str()),
                user_type = ?next.user_type,
                onboarding_complete = next.onboarding_complete,
                step = next.current_onboarding_step,
                is_loading = next.is_loading,
                "Auth snapshot updated"
            );
            if next.user.is_some() && profile.owner() == next.user.as_ref().map(|u| &u.id) {
                if let Some(divergence) = detect_divergence(profile) {
                    warn!(
                        canonical_step = divergence.canonical.step,
                        canonical_completed = divergence.canonical.completed,
                        role_step = divergence.role.step,
                        role_completed = divergence.role.completed,
                        "Canonical and role onboarding fields disagree; using role profile"
                    );
                }
            }
        }
        published
    }

    /// Follow both resolvers until either is dropped.
    pub fn spawn(
        self: &Arc<Self>,
        mut sessions: watch::Receiver<SessionState>,
        mut profiles: watch::Receiver<ProfileState>,
    ) -> tokio::task::JoinHandle<()> {
        let aggregator = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let session = sessions.borrow_and_update().clone();
                let profile = profiles.borrow_and_update().clone();
                aggregator.recompute(&session, &profile);

                tokio::select! {
                    changed = sessions.changed() => if changed.is_err() { break },
                    changed = profiles.changed() => if changed.is_err() { break },
                }
            }
            debug!("Resolver dropped; aggregator stopping");
        })
    }
}
