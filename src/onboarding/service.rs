//! Onboarding mutations: role selection and step submission.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::progress::{OnboardingProgress, StepOutcome};
use crate::auth::model::{CanonicalProfile, RoleProfile, UserId, UserType, VerificationStatus};
use crate::auth::profile::{ProfileResolver, ProfileStore};
use crate::config::GateConfig;
use crate::drafts::keys::DraftKey;
use crate::drafts::store::DraftStorage;
use crate::error::OnboardingError;

/// Writes onboarding results to the profile store and keeps the resolver current.
pub struct OnboardingService {
    store: Arc<dyn ProfileStore>,
    drafts: Arc<dyn DraftStorage>,
    profiles: Arc<ProfileResolver>,
    config: GateConfig,
}

impl OnboardingService {
    pub fn new(
        store: Arc<dyn ProfileStore>,
        drafts: Arc<dyn DraftStorage>,
        profiles: Arc<ProfileResolver>,
        config: GateConfig,
    ) -> Self {
        Self {
            store,
            drafts,
            profiles,
            config,
        }
    }

    /// Record the user's role and create the matching role profile.
    ///
    /// Choosing the same role again is a no-op; switching roles is rejected.
    pub async fn select_role(
        &self,
        user_id: &UserId,
        role: UserType,
    ) -> Result<RoleProfile, OnboardingError> {
        let mut canonical = self
            .store
            .canonical_profile(user_id)
            .await?
            .unwrap_or_else(|| CanonicalProfile::new(user_id.clone()));

        match canonical.user_type {
            Some(existing) if existing != role => {
                return Err(OnboardingError::RoleAlreadySelected {
                    user_id: user_id.to_string(),
                    role: existing.to_string(),
                });
            }
            Some(_) => {}
            None => {
                canonical.user_type = Some(role);
                canonical.updated_at = Utc::now();
                self.store.save_canonical_profile(&canonical).await?;
            }
        }

        let profile = match self.store.role_profile(user_id, role).await? {
            Some(profile) => profile,
            None => {
                let profile = RoleProfile::new(user_id.clone(), role);
                self.store.save_role_profile(&profile).await?;
                info!(user_id = %user_id, role = %role, "Role selected");
                profile
            }
        };

        self.refresh_if_current(user_id).await;
        Ok(profile)
    }

    /// Accept the answers for one step.
    ///
    /// Advances the role profile, mirrors the step onto the canonical
    /// profile, merges `data` into the role profile and drops the step's
    /// saved draft.
    pub async fn submit_step(
        &self,
        user_id: &UserId,
        step: u32,
        data: Map<String, Value>,
    ) -> Result<OnboardingProgress, OnboardingError> {
        let mut canonical = self
            .store
            .canonical_profile(user_id)
            .await?
            .unwrap_or_else(|| CanonicalProfile::new(user_id.clone()));
        let role = canonical
            .user_type
            .ok_or_else(|| OnboardingError::RoleNotSelected {
                user_id: user_id.to_string(),
            })?;

        let mut profile = self
            .store
            .role_profile(user_id, role)
            .await?
            .unwrap_or_else(|| RoleProfile::new(user_id.clone(), role));
        let mut progress = OnboardingProgress::of(&profile, self.config.onboarding_steps(role));
        let outcome = progress.submit(step)?;

        let now = Utc::now();
        progress.apply_to(&mut profile);
        if let Some(name) = data.get("full_name").and_then(Value::as_str) {
            canonical.full_name = Some(name.to_string());
        }
        profile.data.extend(data);
        if outcome == StepOutcome::Completed
            && role == UserType::Mentor
            && profile.verification == VerificationStatus::Unverified
        {
            profile.verification = VerificationStatus::Pending;
        }
        profile.updated_at = now;
        self.store.save_role_profile(&profile).await?;

        canonical.onboarding_step = progress.step;
        canonical.onboarding_completed = progress.completed;
        canonical.updated_at = now;
        self.store.save_canonical_profile(&canonical).await?;

        let draft = DraftKey::onboarding(role, step).storage_key(&self.config.product);
        let cleared = self.drafts.remove(&draft).await?;

        match outcome {
            StepOutcome::Completed => info!(user_id = %user_id, %progress, "Onboarding complete"),
            _ => debug!(user_id = %user_id, %progress, ?outcome, cleared, "Onboarding step accepted"),
        }

        self.refresh_if_current(user_id).await;
        Ok(progress)
    }

    /// Current progress, or `None` before a role is chosen.
    pub async fn progress(
        &self,
        user_id: &UserId,
    ) -> Result<Option<OnboardingProgress>, OnboardingError> {
        let Some(role) = self
            .store
            .canonical_profile(user_id)
            .await?
            .and_then(|c| c.user_type)
        else {
            return Ok(None);
        };
        let total = self.config.onboarding_steps(role);
        Ok(Some(match self.store.role_profile(user_id, role).await? {
            Some(profile) => OnboardingProgress::of(&profile, total),
            None => OnboardingProgress::new(role, total),
        }))
    }

    async fn refresh_if_current(&self, user_id: &UserId) {
        if self.profiles.state().owner() == Some(user_id) {
            self.profiles.refresh().await;
        }
    }
}
