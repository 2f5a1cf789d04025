//! Route gate: turns a snapshot and a route requirement into a decision.
//!
//! The rules run in a fixed order and the first one that fires decides.
//! Later rules assume every earlier rule declined:
//!
//! 1. Loading: never redirect on a half-resolved snapshot.
//! 2. Auth required but signed out: go to sign-in, remembering the path.
//! 3. Public-only route but signed in: role selection, onboarding, or home.
//! 4. Role not allowed on this route: role home.
//! 5. Onboarding route, onboarding complete, no edit mode: role home.
//! 6. Onboarding incomplete anywhere else: role onboarding.
//!
//! Nothing fired: render.

use serde::Serialize;
use tracing::debug;

use super::requirement::RouteRequirement;
use crate::auth::model::UserType;
use crate::auth::snapshot::AuthStateSnapshot;
use crate::config::RoutePaths;

/// Outcome of gating one navigation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GateDecision {
    Loading,
    Render,
    Redirect(Redirect),
}

/// Why a redirect was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RedirectReason {
    SignInRequired,
    RoleSelectionRequired,
    OnboardingIncomplete,
    AlreadySignedIn,
    RoleNotAllowed,
    OnboardingAlreadyComplete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Redirect {
    pub to: String,
    /// Originally requested location, for sign-in to return to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_to: Option<String>,
    pub reason: RedirectReason,
}

impl Redirect {
    /// A redirect to the page already being shown; routers treat it as "stay".
    pub fn is_self_redirect(&self, nav: &Navigation) -> bool {
        self.to == nav.path
    }
}

/// One navigation: normalized path plus the edit-mode flag from its query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    pub path: String,
    pub query: Option<String>,
    pub edit_mode: bool,
}

impl Navigation {
    /// Parse `path[?query][#fragment]`.
    pub fn parse(target: &str) -> Self {
        let target = target.split('#').next().unwrap_or_default();
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (target, None),
        };
        let edit_mode = query.as_deref().is_some_and(edit_mode_from_query);
        Self {
            path: normalize_path(path),
            query: query.filter(|q| !q.is_empty()),
            edit_mode,
        }
    }

    /// The location as requested, query included.
    pub fn requested(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{query}", self.path),
            None => self.path.clone(),
        }
    }
}

/// `edit=1` or `edit=true` turns on edit mode for this navigation only.
pub fn edit_mode_from_query(query: &str) -> bool {
    query
        .trim_start_matches('?')
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .any(|(key, value)| key == "edit" && matches!(value, "1" | "true"))
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// The gate's rules, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateRule {
    Loading,
    AuthRequired,
    PublicOnly,
    RoleRestriction,
    OnboardingComplete,
    OnboardingIncomplete,
}

struct GateInput<'a> {
    snapshot: &'a AuthStateSnapshot,
    requirement: &'a RouteRequirement,
    nav: &'a Navigation,
    paths: &'a RoutePaths,
}

type RuleFn = fn(&GateInput<'_>) -> Option<GateDecision>;

const RULES: [(GateRule, RuleFn); 6] = [
    (GateRule::Loading, loading),
    (GateRule::AuthRequired, auth_required),
    (GateRule::PublicOnly, public_only),
    (GateRule::RoleRestriction, role_restriction),
    (GateRule::OnboardingComplete, onboarding_complete),
    (GateRule::OnboardingIncomplete, onboarding_incomplete),
];

/// Decide what to do with one navigation.
pub fn evaluate(
    snapshot: &AuthStateSnapshot,
    requirement: &RouteRequirement,
    nav: &Navigation,
    paths: &RoutePaths,
) -> GateDecision {
    evaluate_with_rule(snapshot, requirement, nav, paths).0
}

/// Like [`evaluate`], also naming the rule that decided (`None` for render).
pub fn evaluate_with_rule(
    snapshot: &AuthStateSnapshot,
    requirement: &RouteRequirement,
    nav: &Navigation,
    paths: &RoutePaths,
) -> (GateDecision, Option<GateRule>) {
    let input = GateInput {
        snapshot,
        requirement,
        nav,
        paths,
    };
    let fired = RULES
        .iter()
        .find_map(|(rule, check)| check(&input).map(|decision| (decision, Some(*rule))));
    let (decision, rule) = fired.unwrap_or((GateDecision::Render, None));
    debug!(path = %nav.path, ?rule, ?decision, "Route gated");
    (decision, rule)
}

fn redirect(to: &str, reason: RedirectReason) -> Option<GateDecision> {
    Some(GateDecision::Redirect(Redirect {
        to: to.to_string(),
        return_to: None,
        reason,
    }))
}

fn loading(input: &GateInput<'_>) -> Option<GateDecision> {
    input.snapshot.is_loading.then_some(GateDecision::Loading)
}

fn auth_required(input: &GateInput<'_>) -> Option<GateDecision> {
    if !input.requirement.require_auth || input.snapshot.is_authenticated() {
        return None;
    }
    Some(GateDecision::Redirect(Redirect {
        to: input.paths.sign_in.clone(),
        return_to: Some(input.nav.requested()),
        reason: RedirectReason::SignInRequired,
    }))
}

fn public_only(input: &GateInput<'_>) -> Option<GateDecision> {
    let GateInput {
        snapshot,
        requirement,
        paths,
        ..
    } = input;
    if requirement.require_auth || !snapshot.is_authenticated() {
        return None;
    }
    match snapshot.user_type {
        None => redirect(&paths.role_selection, RedirectReason::RoleSelectionRequired),
        Some(role) if !snapshot.onboarding_complete => {
            redirect(paths.onboarding(role), RedirectReason::OnboardingIncomplete)
        }
        Some(role) => redirect(
            requirement.redirect_to.as_deref().unwrap_or(paths.home(role)),
            RedirectReason::AlreadySignedIn,
        ),
    }
}

fn role_restriction(input: &GateInput<'_>) -> Option<GateDecision> {
    let role = known_role(input)?;
    if input.requirement.allows(role) {
        return None;
    }
    redirect(input.paths.home(role), RedirectReason::RoleNotAllowed)
}

fn onboarding_complete(input: &GateInput<'_>) -> Option<GateDecision> {
    if !input.requirement.require_onboarding
        || !input.snapshot.onboarding_complete
        || input.nav.edit_mode
    {
        return None;
    }
    let role = known_role(input)?;
    redirect(input.paths.home(role), RedirectReason::OnboardingAlreadyComplete)
}

fn onboarding_incomplete(input: &GateInput<'_>) -> Option<GateDecision> {
    let role = known_role(input)?;
    if input.snapshot.onboarding_complete {
        return None;
    }
    let target = input.paths.onboarding(role);
    if input.nav.path == target {
        return None;
    }
    redirect(target, RedirectReason::OnboardingIncomplete)
}

/// Role of an authenticated user, if chosen.
fn known_role(input: &GateInput<'_>) -> Option<UserType> {
    if !input.snapshot.is_authenticated() {
        return None;
    }
    input.snapshot.user_type
}
