//! Storage key namespace for form drafts.
//!
//! `<product>-onboarding-<role>-step-<n>` for onboarding steps and
//! `<product>-signup-data` for the pre-auth sign-up form.

use serde::{Deserialize, Serialize};

use crate::auth::model::UserType;

const SIGNUP_SUFFIX: &str = "signup-data";
const ONBOARDING_INFIX: &str = "onboarding-";
const STEP_INFIX: &str = "-step-";

/// Which form a draft belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DraftKey {
    Onboarding { role: UserType, step: u32 },
    Signup,
}

impl DraftKey {
    pub fn onboarding(role: UserType, step: u32) -> Self {
        Self::Onboarding { role, step }
    }

    /// Full storage key under `product`.
    pub fn storage_key(&self, product: &str) -> String {
        match self {
            Self::Onboarding { role, step } => {
                format!("{product}-{ONBOARDING_INFIX}{role}{STEP_INFIX}{step}")
            }
            Self::Signup => format!("{product}-{SIGNUP_SUFFIX}"),
        }
    }

    /// Parse a storage key back, if it belongs to `product`.
    pub fn parse(product: &str, key: &str) -> Option<Self> {
        let rest = key.strip_prefix(product)?.strip_prefix('-')?;
        if rest == SIGNUP_SUFFIX {
            return Some(Self::Signup);
        }
        let (role, step) = rest.strip_prefix(ONBOARDING_INFIX)?.split_once(STEP_INFIX)?;
        let step = step.parse::<u32>().ok().filter(|n| *n > 0)?;
        Some(Self::Onboarding {
            role: UserType::parse(role)?,
            step,
        })
    }

    /// Parse the short form used in URLs: `signup` or `<role>-step-<n>`.
    pub fn from_slug(slug: &str) -> Option<Self> {
        if slug == "signup" {
            return Some(Self::Signup);
        }
        let (role, step) = slug.split_once(STEP_INFIX)?;
        Some(Self::Onboarding {
            role: UserType::parse(role)?,
            step: step.parse::<u32>().ok().filter(|n| *n > 0)?,
        })
    }
}

impl std::fmt::Display for DraftKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Onboarding { role, step } => write!(f, "{role}{STEP_INFIX}{step}"),
            Self::Signup => write!(f, "signup"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_format() {
        assert_eq!(
            DraftKey::onboarding(UserType::Mentor, 2).storage_key("mentorgate"),
            "mentorgate-onboarding-mentor-step-2"
        );
        assert_eq!(
            DraftKey::Signup.storage_key("mentorgate"),
            "mentorgate-signup-data"
        );
    }

    #[test]
    fn parse_own_keys() {
        let key = DraftKey::onboarding(UserType::Mentee, 3);
        assert_eq!(
            DraftKey::parse("mentorgate", &key.storage_key("mentorgate")),
            Some(key)
        );
        assert_eq!(
            DraftKey::parse("mentorgate", "mentorgate-signup-data"),
            Some(DraftKey::Signup)
        );
    }

    #[test]
    fn parse_rejects_foreign_and_malformed_keys() {
        assert_eq!(DraftKey::parse("mentorgate", "other-signup-data"), None);
        assert_eq!(DraftKey::parse("mentorgate", "mentorgate-onboarding-admin-step-1"), None);
        assert_eq!(DraftKey::parse("mentorgate", "mentorgate-onboarding-mentor-step-0"), None);
        assert_eq!(DraftKey::parse("mentorgate", "mentorgate-onboarding-mentor-step-x"), None);
        assert_eq!(DraftKey::parse("mentorgate", "mentorgatesignup-data"), None);
    }

    #[test]
    fn slug_matches_display() {
        for key in [DraftKey::Signup, DraftKey::onboarding(UserType::Mentor, 4)] {
            assert_eq!(DraftKey::from_slug(&key.to_string()), Some(key));
        }
        assert_eq!(DraftKey::from_slug("mentor"), None);
    }
}
