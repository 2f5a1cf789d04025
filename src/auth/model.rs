//! Identity, session and profile data models.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Opaque identifier of a signed-in principal, as issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The two roles a user can take on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    Mentor,
    Mentee,
}

impl UserType {
    pub const ALL: [UserType; 2] = [UserType::Mentor, UserType::Mentee];

    /// Parse the wire form (`"mentor"` / `"mentee"`).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "mentor" => Some(Self::Mentor),
            "mentee" => Some(Self::Mentee),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mentor => "mentor",
            Self::Mentee => "mentee",
        }
    }
}

impl std::fmt::Display for UserType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated principal: an id plus whatever claims the provider exposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub claims: serde_json::Map<String, serde_json::Value>,
}

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: UserId::new(id),
            email: None,
            claims: serde_json::Map::new(),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_claim(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.claims.insert(key.into(), value);
        self
    }

    /// Role recorded in the provider's user metadata at sign-up, if any.
    ///
    /// Only a hint for fetch planning; the profile store stays authoritative.
    pub fn role_hint(&self) -> Option<UserType> {
        self.claims
            .get("user_type")
            .and_then(|v| v.as_str())
            .and_then(UserType::parse)
    }
}

/// Live credential bundle bound to an identity.
#[derive(Debug, Clone)]
pub struct Session {
    pub identity: Arc<Identity>,
    pub access_token: SecretString,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// Onboarding progress pair carried by both profile records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnboardingFields {
    pub step: u32,
    pub completed: bool,
}

/// Role-agnostic account record, one per identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalProfile {
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    pub user_type: Option<UserType>,
    pub onboarding_step: u32,
    pub onboarding_completed: bool,
    pub updated_at: DateTime<Utc>,
}

impl CanonicalProfile {
    /// The record created at sign-up: no role, nothing completed.
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            full_name: None,
            user_type: None,
            onboarding_step: 0,
            onboarding_completed: false,
            updated_at: Utc::now(),
        }
    }

    pub fn onboarding(&self) -> OnboardingFields {
        OnboardingFields {
            step: self.onboarding_step,
            completed: self.onboarding_completed,
        }
    }
}

/// Verification state of a role profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    /// Mentee profiles carry no verification step.
    NotRequired,
    Unverified,
    Pending,
    Verified,
    Rejected,
}

impl VerificationStatus {
    pub fn initial_for(role: UserType) -> Self {
        match role {
            UserType::Mentor => Self::Unverified,
            UserType::Mentee => Self::NotRequired,
        }
    }
}

/// Mentor- or mentee-specific record with its own onboarding fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleProfile {
    pub user_id: UserId,
    pub role: UserType,
    pub onboarding_step: u32,
    pub onboarding_completed: bool,
    pub verification: VerificationStatus,
    /// Role-specific fields collected by the onboarding steps.
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
    pub updated_at: DateTime<Utc>,
}

impl RoleProfile {
    pub fn new(user_id: UserId, role: UserType) -> Self {
        Self {
            user_id,
            role,
            onboarding_step: 0,
            onboarding_completed: false,
            verification: VerificationStatus::initial_for(role),
            data: serde_json::Map::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn onboarding(&self) -> OnboardingFields {
        OnboardingFields {
            step: self.onboarding_step,
            completed: self.onboarding_completed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_type_serde_matches_display() {
        for role in UserType::ALL {
            let json = serde_json::to_string(&role).unwrap();
            assert_eq!(json, format!("\"{role}\""));
            assert_eq!(UserType::parse(role.as_str()), Some(role));
        }
        assert_eq!(UserType::parse("admin"), None);
    }

    #[test]
    fn role_hint_reads_user_type_claim() {
        let identity = Identity::new("u1").with_claim("user_type", serde_json::json!("mentee"));
        assert_eq!(identity.role_hint(), Some(UserType::Mentee));

        let bogus = Identity::new("u2").with_claim("user_type", serde_json::json!(42));
        assert_eq!(bogus.role_hint(), None);
        assert_eq!(Identity::new("u3").role_hint(), None);
    }

    #[test]
    fn new_role_profiles_start_unfinished() {
        let mentor = RoleProfile::new(UserId::new("u1"), UserType::Mentor);
        assert_eq!(mentor.onboarding(), OnboardingFields::default());
        assert_eq!(mentor.verification, VerificationStatus::Unverified);

        let mentee = RoleProfile::new(UserId::new("u1"), UserType::Mentee);
        assert_eq!(mentee.verification, VerificationStatus::NotRequired);
    }

    #[test]
    fn canonical_profile_without_role_deserializes() {
        let json = serde_json::json!({
            "user_id": "u1",
            "user_type": null,
            "onboarding_step": 0,
            "onboarding_completed": false,
            "updated_at": "2026-01-01T00:00:00Z"
        });
        let profile: CanonicalProfile = serde_json::from_value(json).unwrap();
        assert_eq!(profile.user_type, None);
        assert!(profile.full_name.is_none());
    }

    #[test]
    fn session_debug_redacts_token() {
        let session = Session {
            identity: Arc::new(Identity::new("u1")),
            access_token: SecretString::from("super-secret-token"),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        };
        assert!(!format!("{session:?}").contains("super-secret-token"));
        assert!(!session.is_expired());
    }
}
