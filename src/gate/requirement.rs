//! Route requirements and the named presets built from them.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::auth::model::UserType;
use crate::config::RoutePaths;

/// Static access requirements attached to a route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRequirement {
    pub require_auth: bool,
    pub require_onboarding: bool,
    pub allowed_user_types: BTreeSet<UserType>,
    pub redirect_to: Option<String>,
}

/// Ways a requirement can contradict itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequirementError {
    #[error("onboarding routes must require auth")]
    OnboardingWithoutAuth,

    #[error("no user type is allowed")]
    NoAllowedUserTypes,

    #[error("redirect target {0:?} is not an absolute path")]
    RelativeRedirect(String),
}

impl Default for RouteRequirement {
    fn default() -> Self {
        Self::auth_only()
    }
}

impl RouteRequirement {
    /// Any signed-in user.
    pub fn auth_only() -> Self {
        Self {
            require_auth: true,
            require_onboarding: false,
            allowed_user_types: UserType::ALL.into_iter().collect(),
            redirect_to: None,
        }
    }

    /// An onboarding flow, optionally locked to one role.
    pub fn onboarding_only(role: Option<UserType>) -> Self {
        let base = Self {
            require_onboarding: true,
            ..Self::auth_only()
        };
        match role {
            Some(role) => base.allow_only(role),
            None => base,
        }
    }

    /// Signed-in users who finished onboarding. The onboarding funnel rule
    /// enforces the "finished" half for every authenticated route.
    pub fn completed_onboarding_only() -> Self {
        Self::auth_only()
    }

    /// Pages only signed-out visitors may see (landing, sign-in).
    pub fn public_only() -> Self {
        Self {
            require_auth: false,
            ..Self::auth_only()
        }
    }

    pub fn mentor_only() -> Self {
        Self::auth_only().allow_only(UserType::Mentor)
    }

    pub fn mentee_only() -> Self {
        Self::auth_only().allow_only(UserType::Mentee)
    }

    /// Restrict the route to a single role.
    pub fn allow_only(mut self, role: UserType) -> Self {
        self.allowed_user_types = BTreeSet::from([role]);
        self
    }

    /// Where signed-in visitors of a public-only route are sent.
    pub fn redirect_to(mut self, path: impl Into<String>) -> Self {
        self.redirect_to = Some(path.into());
        self
    }

    pub fn allows(&self, role: UserType) -> bool {
        self.allowed_user_types.contains(&role)
    }

    /// Check the requirement for contradictions.
    pub fn validate(&self) -> Result<(), RequirementError> {
        if self.require_onboarding && !self.require_auth {
            return Err(RequirementError::OnboardingWithoutAuth);
        }
        if self.allowed_user_types.is_empty() {
            return Err(RequirementError::NoAllowedUserTypes);
        }
        if let Some(target) = &self.redirect_to {
            if !target.starts_with('/') {
                return Err(RequirementError::RelativeRedirect(target.clone()));
            }
        }
        Ok(())
    }
}

/// A path pattern: exact, or a prefix when it ends in `/*`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutePattern(String);

impl RoutePattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self(pattern.into())
    }

    pub fn matches(&self, path: &str) -> bool {
        match self.0.strip_suffix("/*") {
            Some(prefix) => path == prefix || path.starts_with(&format!("{prefix}/")),
            None => path == self.0,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Ordered mapping from paths to requirements. First match wins.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<(RoutePattern, RouteRequirement)>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, pattern: impl Into<String>, requirement: RouteRequirement) -> Self {
        self.routes.push((RoutePattern::new(pattern), requirement));
        self
    }

    /// Requirement for a normalized path.
    pub fn lookup(&self, path: &str) -> Option<&RouteRequirement> {
        self.routes
            .iter()
            .find(|(pattern, _)| pattern.matches(path))
            .map(|(_, requirement)| requirement)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RoutePattern, &RouteRequirement)> {
        self.routes.iter().map(|(p, r)| (p, r))
    }

    /// Every misconfigured route, with its pattern.
    pub fn validate(&self) -> Vec<(String, RequirementError)> {
        self.routes
            .iter()
            .filter_map(|(pattern, requirement)| {
                requirement
                    .validate()
                    .err()
                    .map(|e| (pattern.as_str().to_string(), e))
            })
            .collect()
    }

    /// The application's route map.
    pub fn standard(paths: &RoutePaths) -> Self {
        let mut table = Self::new()
            .route("/", RouteRequirement::public_only())
            .route(&paths.sign_in, RouteRequirement::public_only());
        if paths.role_selection != paths.sign_in {
            table = table.route(&paths.role_selection, RouteRequirement::auth_only());
        }
        table
            .route(
                &paths.mentor_onboarding,
                RouteRequirement::onboarding_only(Some(UserType::Mentor)),
            )
            .route(
                &paths.mentee_onboarding,
                RouteRequirement::onboarding_only(Some(UserType::Mentee)),
            )
            .route(&paths.mentor_home, RouteRequirement::mentor_only())
            .route(&paths.mentee_home, RouteRequirement::mentee_only())
            .route(format!("{}/*", paths.mentee_home), RouteRequirement::mentee_only())
            .route("/sessions/*", RouteRequirement::completed_onboarding_only())
            .route("/messages/*", RouteRequirement::completed_onboarding_only())
            .route("/notifications", RouteRequirement::completed_onboarding_only())
            .route("/settings", RouteRequirement::auth_only())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_consistent() {
        for requirement in [
            RouteRequirement::auth_only(),
            RouteRequirement::onboarding_only(None),
            RouteRequirement::onboarding_only(Some(UserType::Mentee)),
            RouteRequirement::completed_onboarding_only(),
            RouteRequirement::public_only(),
            RouteRequirement::mentor_only(),
            RouteRequirement::mentee_only(),
        ] {
            assert_eq!(requirement.validate(), Ok(()), "{requirement:?}");
        }
    }

    #[test]
    fn contradictions_are_detected() {
        let public_onboarding = RouteRequirement {
            require_onboarding: true,
            ..RouteRequirement::public_only()
        };
        assert_eq!(
            public_onboarding.validate(),
            Err(RequirementError::OnboardingWithoutAuth)
        );

        let nobody = RouteRequirement {
            allowed_user_types: BTreeSet::new(),
            ..RouteRequirement::auth_only()
        };
        assert_eq!(nobody.validate(), Err(RequirementError::NoAllowedUserTypes));

        let relative = RouteRequirement::public_only().redirect_to("home");
        assert!(matches!(
            relative.validate(),
            Err(RequirementError::RelativeRedirect(_))
        ));
    }

    #[test]
    fn role_locks() {
        assert!(RouteRequirement::mentor_only().allows(UserType::Mentor));
        assert!(!RouteRequirement::mentor_only().allows(UserType::Mentee));
        assert!(RouteRequirement::onboarding_only(None).allows(UserType::Mentee));
        assert!(!RouteRequirement::onboarding_only(Some(UserType::Mentee)).allows(UserType::Mentor));
    }

    #[test]
    fn standard_table_is_valid() {
        let table = RouteTable::standard(&RoutePaths::default());
        assert!(table.validate().is_empty(), "{:?}", table.validate());
    }

    #[test]
    fn standard_table_lookup() {
        let table = RouteTable::standard(&RoutePaths::default());
        assert!(!table.lookup("/auth").unwrap().require_auth);
        assert!(table.lookup("/mentee-onboarding").unwrap().require_onboarding);
        assert!(table.lookup("/mentors/42").unwrap().allows(UserType::Mentee));
        assert!(!table.lookup("/mentors/42").unwrap().allows(UserType::Mentor));
        assert!(table.lookup("/sessions").is_some());
        assert!(table.lookup("/nowhere").is_none());
    }

    #[test]
    fn prefix_pattern_does_not_match_siblings() {
        let pattern = RoutePattern::new("/mentors/*");
        assert!(pattern.matches("/mentors"));
        assert!(pattern.matches("/mentors/7/book"));
        assert!(!pattern.matches("/mentorship"));
    }

    #[test]
    fn requirement_serializes_camel_case() {
        let json = serde_json::to_value(RouteRequirement::mentee_only()).unwrap();
        assert_eq!(json["requireAuth"], true);
        assert_eq!(json["allowedUserTypes"], serde_json::json!(["mentee"]));
    }
}
