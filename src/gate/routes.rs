//! REST endpoints for auth state, gating decisions and the local session.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::decision::{GateDecision, GateRule, Navigation, evaluate_with_rule};
use super::requirement::{RouteRequirement, RouteTable};
use crate::auth::local::LocalSessionProvider;
use crate::auth::model::{Identity, UserType};
use crate::auth::runtime::AuthRuntime;
use crate::auth::snapshot::AuthStateSnapshot;
use crate::config::GateConfig;

/// Shared state for gate routes.
#[derive(Clone)]
pub struct GateRouteState {
    pub runtime: Arc<AuthRuntime>,
    pub sessions: Arc<LocalSessionProvider>,
    pub routes: Arc<RouteTable>,
    pub config: GateConfig,
}

impl GateRouteState {
    /// How long a handler waits for the snapshot to catch up with a change.
    fn settle_limit(&self) -> Duration {
        self.config.session_timeout + self.config.profile_timeout
    }
}

#[derive(Debug, Deserialize)]
pub struct GateRequest {
    /// Requested location, query string included.
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct GateResponse {
    pub path: String,
    pub edit_mode: bool,
    #[serde(flatten)]
    pub decision: GateDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<GateRule>,
}

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Role recorded at sign-up, carried as a claim.
    #[serde(default)]
    pub user_type: Option<UserType>,
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

fn snapshot_json(snapshot: &AuthStateSnapshot) -> Response {
    Json(snapshot).into_response()
}

/// GET /api/auth/state
async fn get_state(State(state): State<GateRouteState>) -> impl IntoResponse {
    snapshot_json(&state.runtime.snapshot())
}

/// POST /api/auth/refresh
///
/// Re-fetches the signed-in user's profiles and returns the settled snapshot.
async fn refresh(State(state): State<GateRouteState>) -> impl IntoResponse {
    if !state.runtime.refresh_profile().await {
        return error(StatusCode::UNAUTHORIZED, "Not signed in");
    }
    match state.runtime.synced(state.settle_limit()).await {
        Some(snapshot) => snapshot_json(&snapshot),
        None => error(StatusCode::GATEWAY_TIMEOUT, "Profile refresh did not settle"),
    }
}

/// POST /api/gate
///
/// Decides what to do with a navigation under the current snapshot.
/// Paths missing from the route table are treated as auth-only.
async fn gate(
    State(state): State<GateRouteState>,
    Json(request): Json<GateRequest>,
) -> impl IntoResponse {
    let nav = Navigation::parse(&request.path);
    let fallback = RouteRequirement::auth_only();
    let requirement = state.routes.lookup(&nav.path).unwrap_or(&fallback);
    let snapshot = state.runtime.snapshot();
    let (decision, rule) = evaluate_with_rule(&snapshot, requirement, &nav, &state.config.paths);

    if let GateDecision::Redirect(redirect) = &decision {
        info!(
            from = %nav.path,
            to = %redirect.to,
            reason = ?redirect.reason,
            "Navigation redirected"
        );
    }

    Json(GateResponse {
        path: nav.path,
        edit_mode: nav.edit_mode,
        decision,
        rule,
    })
}

/// POST /api/session/sign-in
///
/// Signs in with the local provider and waits for the snapshot to settle
/// on the new identity.
async fn sign_in(
    State(state): State<GateRouteState>,
    Json(request): Json<SignInRequest>,
) -> impl IntoResponse {
    let user_id = request.user_id.trim();
    if user_id.is_empty() {
        return error(StatusCode::BAD_REQUEST, "user_id is required");
    }

    let mut identity = Identity::new(user_id);
    if let Some(email) = request.email {
        identity = identity.with_email(email);
    }
    if let Some(role) = request.user_type {
        identity = identity.with_claim("user_type", serde_json::json!(role));
    }

    let identity = state.sessions.sign_in(identity).await;
    let settled = state
        .runtime
        .wait_for(state.settle_limit(), |s| {
            !s.is_loading && s.user.as_ref().is_some_and(|u| u.id == identity.id)
        })
        .await;
    match settled {
        Some(snapshot) => snapshot_json(&snapshot),
        None => error(StatusCode::GATEWAY_TIMEOUT, "Sign-in did not settle"),
    }
}

/// POST /api/session/sign-out
async fn sign_out(State(state): State<GateRouteState>) -> impl IntoResponse {
    if !state.sessions.sign_out().await {
        return StatusCode::NO_CONTENT.into_response();
    }
    match state
        .runtime
        .wait_for(state.settle_limit(), |s| !s.is_loading && s.user.is_none())
        .await
    {
        Some(snapshot) => snapshot_json(&snapshot),
        None => error(StatusCode::GATEWAY_TIMEOUT, "Sign-out did not settle"),
    }
}

/// Build the gate REST routes.
pub fn gate_routes(state: GateRouteState) -> Router {
    Router::new()
        .route("/api/auth/state", get(get_state))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/gate", post(gate))
        .route("/api/session/sign-in", post(sign_in))
        .route("/api/session/sign-out", post(sign_out))
        .with_state(state)
}
