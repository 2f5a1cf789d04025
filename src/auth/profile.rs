//! Profile resolution: loads the canonical and role profiles for an identity.
//!
//! Every fetch is tagged with the generation it was issued under. The
//! generation lives inside the published state and is bumped whenever the
//! identity changes or a refresh is requested, so checking the tag and
//! applying the result happen under the same watch lock. A result whose tag
//! is no longer current is dropped.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::model::{CanonicalProfile, Identity, RoleProfile, UserId, UserType};
use super::session::SessionState;
use crate::error::ProfileError;

/// External profile store.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn canonical_profile(
        &self,
        user_id: &UserId,
    ) -> Result<Option<CanonicalProfile>, ProfileError>;

    async fn role_profile(
        &self,
        user_id: &UserId,
        role: UserType,
    ) -> Result<Option<RoleProfile>, ProfileError>;

    /// Insert or replace the canonical profile.
    async fn save_canonical_profile(&self, profile: &CanonicalProfile) -> Result<(), ProfileError>;

    /// Insert or replace the role profile for `profile.role`.
    async fn save_role_profile(&self, profile: &RoleProfile) -> Result<(), ProfileError>;
}

/// Published output of the profile resolver.
#[derive(Debug, Clone, Default)]
pub struct ProfileState {
    /// Identity the profiles below belong to.
    pub identity: Option<Arc<Identity>>,
    pub canonical: Option<CanonicalProfile>,
    pub role: Option<RoleProfile>,
    pub is_loading: bool,
    pub error: Option<String>,
    generation: u64,
}

impl ProfileState {
    pub fn owner(&self) -> Option<&UserId> {
        self.identity.as_ref().map(|i| &i.id)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Identity and generation a fetch was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FetchTag {
    generation: u64,
    user_id: UserId,
}

/// Loads canonical and role profiles for the current identity.
pub struct ProfileResolver {
    store: Arc<dyn ProfileStore>,
    timeout: Duration,
    state: watch::Sender<ProfileState>,
}

impl ProfileResolver {
    pub fn new(store: Arc<dyn ProfileStore>, timeout: Duration) -> Arc<Self> {
        let (state, _rx) = watch::channel(ProfileState::default());
        Arc::new(Self {
            store,
            timeout,
            state,
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<ProfileState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> ProfileState {
        self.state.borrow().clone()
    }

    /// Point the resolver at `identity` and load its profiles.
    ///
    /// Does nothing when the identity's user id is already loaded or loading.
    pub async fn load(&self, identity: Option<Arc<Identity>>) {
        if let Some((identity, tag)) = self.begin(identity) {
            self.fetch(identity, tag).await;
        }
    }

    /// Re-fetch profiles for the current identity, keeping the old values
    /// visible until the new ones land. Returns false with no identity.
    pub async fn refresh(&self) -> bool {
        match self.begin_refresh() {
            Some((identity, tag)) => {
                debug!(user_id = %tag.user_id, generation = tag.generation, "Refreshing profile");
                self.fetch(identity, tag).await;
                true
            }
            None => false,
        }
    }

    /// Bump the generation for the current identity and mark it loading.
    fn begin_refresh(&self) -> Option<(Arc<Identity>, FetchTag)> {
        let mut target = None;
        self.state.send_if_modified(|state| {
            let Some(identity) = state.identity.clone() else {
                return false;
            };
            state.generation += 1;
            state.is_loading = true;
            target = Some((
                Arc::clone(&identity),
                FetchTag {
                    generation: state.generation,
                    user_id: identity.id.clone(),
                },
            ));
            true
        });
        target
    }

    /// Follow session changes, issuing one fetch task per identity change.
    pub fn spawn(
        self: &Arc<Self>,
        mut sessions: watch::Receiver<SessionState>,
    ) -> tokio::task::JoinHandle<()> {
        let resolver = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let session = sessions.borrow_and_update().clone();
                if !session.is_loading {
                    if let Some((identity, tag)) = resolver.begin(session.identity) {
                        let worker = Arc::clone(&resolver);
                        tokio::spawn(async move {
                            worker.fetch(identity, tag).await;
                        });
                    }
                }
                if sessions.changed().await.is_err() {
                    debug!("Session resolver dropped; profile resolver stopping");
                    break;
                }
            }
        })
    }

    /// Switch to `identity`. Returns the fetch to issue, if any.
    fn begin(&self, identity: Option<Arc<Identity>>) -> Option<(Arc<Identity>, FetchTag)> {
        let mut issued = None;
        self.state.send_if_modified(|state| {
            let same_user = match (&state.identity, &identity) {
                (Some(current), Some(next)) => current.id == next.id,
                (None, None) => true,
                _ => false,
            };
            if same_user {
                return false;
            }

            state.generation += 1;
            state.identity = identity.clone();
            state.canonical = None;
            state.role = None;
            state.error = None;
            state.is_loading = identity.is_some();
            if let Some(identity) = &identity {
                issued = Some((
                    Arc::clone(identity),
                    FetchTag {
                        generation: state.generation,
                        user_id: identity.id.clone(),
                    },
                ));
            }
            true
        });
        issued
    }

    /// Run one tagged fetch and apply it if the tag is still current.
    async fn fetch(&self, identity: Arc<Identity>, tag: FetchTag) -> bool {
        let outcome = match tokio::time::timeout(
            self.timeout,
            fetch_profiles(self.store.as_ref(), &identity),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ProfileError::Timeout {
                user_id: identity.id.to_string(),
                timeout: self.timeout,
            }),
        };

        if let Err(e) = &outcome {
            warn!(user_id = %tag.user_id, error = %e, "Profile fetch failed");
        }

        let applied = self.state.send_if_modified(|state| {
            if state.generation != tag.generation || state.owner() != Some(&tag.user_id) {
                return false;
            }
            match outcome {
                Ok((canonical, role)) => {
                    state.canonical = canonical;
                    state.role = role;
                    state.error = None;
                }
                Err(e) => {
                    state.canonical = None;
                    state.role = None;
                    state.error = Some(e.to_string());
                }
            }
            state.is_loading = false;
            true
        });

        if applied {
            info!(user_id = %tag.user_id, generation = tag.generation, "Profile loaded");
        } else {
            warn!(
                user_id = %tag.user_id,
                generation = tag.generation,
                "Discarding stale profile result"
            );
        }
        applied
    }
}

/// Fetch both profiles for `identity`.
///
/// With a role hint the two reads go out together; otherwise the role
/// profile waits for the canonical `user_type`. A hint that disagrees with
/// the canonical role is corrected with a second role read.
async fn fetch_profiles(
    store: &dyn ProfileStore,
    identity: &Identity,
) -> Result<(Option<CanonicalProfile>, Option<RoleProfile>), ProfileError> {
    let user_id = &identity.id;

    let (canonical, role) = match identity.role_hint() {
        Some(hint) => {
            let (canonical, role) = futures::future::join(
                store.canonical_profile(user_id),
                store.role_profile(user_id, hint),
            )
            .await;
            let canonical = canonical?;
            let role = role?;
            match canonical.as_ref().and_then(|c| c.user_type) {
                Some(actual) if actual != hint => {
                    debug!(%user_id, %hint, %actual, "Role hint disagrees with profile");
                    (canonical, store.role_profile(user_id, actual).await?)
                }
                _ => (canonical, role),
            }
        }
        None => {
            let canonical = store.canonical_profile(user_id).await?;
            let role = match canonical.as_ref().and_then(|c| c.user_type) {
                Some(role) => store.role_profile(user_id, role).await?,
                None => None,
            };
            (canonical, role)
        }
    };

    Ok((canonical, role))
}
