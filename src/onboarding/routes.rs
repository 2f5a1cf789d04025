//! REST endpoints for role selection and onboarding steps.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::service::OnboardingService;
use crate::auth::model::{UserId, UserType};
use crate::auth::runtime::AuthRuntime;
use crate::auth::snapshot::AuthStateSnapshot;
use crate::error::OnboardingError;

/// Shared state for onboarding routes.
#[derive(Clone)]
pub struct OnboardingRouteState {
    pub service: Arc<OnboardingService>,
    pub runtime: Arc<AuthRuntime>,
    /// How long a mutation waits for the snapshot to reflect it.
    pub settle_limit: Duration,
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: UserType,
}

fn error(status: StatusCode, message: impl std::fmt::Display) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": message.to_string() })),
    )
        .into_response()
}

fn onboarding_failure(e: OnboardingError) -> Response {
    let status = match &e {
        OnboardingError::RoleNotSelected { .. } => StatusCode::CONFLICT,
        OnboardingError::RoleAlreadySelected { .. } => StatusCode::CONFLICT,
        OnboardingError::InvalidStep { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        OnboardingError::Profile(_) | OnboardingError::Storage(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    error(status, e)
}

/// The signed-in user, once the snapshot has settled.
async fn current_user(runtime: &AuthRuntime) -> Result<UserId, Response> {
    runtime
        .settled()
        .await
        .user
        .as_ref()
        .map(|u| u.id.clone())
        .ok_or_else(|| error(StatusCode::UNAUTHORIZED, "Not signed in"))
}

/// Wait until the snapshot shows `user` settled with `change` applied.
async fn reflected(
    state: &OnboardingRouteState,
    user: &UserId,
    change: impl Fn(&AuthStateSnapshot) -> bool,
) -> Result<Arc<AuthStateSnapshot>, Response> {
    state
        .runtime
        .wait_for(state.settle_limit, |s| {
            !s.is_loading && s.user.as_ref().is_some_and(|u| u.id == *user) && change(s)
        })
        .await
        .ok_or_else(|| error(StatusCode::GATEWAY_TIMEOUT, "Onboarding change did not settle"))
}

/// GET /api/onboarding/status
///
/// Returns the signed-in user's progress, or `null` before a role is chosen.
async fn get_status(State(state): State<OnboardingRouteState>) -> Response {
    let user = match current_user(&state.runtime).await {
        Ok(user) => user,
        Err(response) => return response,
    };
    match state.service.progress(&user).await {
        Ok(progress) => Json(progress).into_response(),
        Err(e) => onboarding_failure(e),
    }
}

/// POST /api/onboarding/role
async fn select_role(
    State(state): State<OnboardingRouteState>,
    Json(request): Json<RoleRequest>,
) -> Response {
    let user = match current_user(&state.runtime).await {
        Ok(user) => user,
        Err(response) => return response,
    };
    let profile = match state.service.select_role(&user, request.role).await {
        Ok(profile) => profile,
        Err(e) => return onboarding_failure(e),
    };
    let role = profile.role;
    if let Err(response) = reflected(&state, &user, |s| s.user_type == Some(role)).await {
        return response;
    }
    (StatusCode::CREATED, Json(profile)).into_response()
}

/// POST /api/onboarding/steps/{step}
async fn submit_step(
    State(state): State<OnboardingRouteState>,
    Path(step): Path<u32>,
    Json(body): Json<Value>,
) -> Response {
    let user = match current_user(&state.runtime).await {
        Ok(user) => user,
        Err(response) => return response,
    };
    let data: Map<String, Value> = match body {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        _ => return error(StatusCode::UNPROCESSABLE_ENTITY, "Step data must be an object"),
    };
    let progress = match state.service.submit_step(&user, step, data).await {
        Ok(progress) => progress,
        Err(e) => return onboarding_failure(e),
    };
    let settled = reflected(&state, &user, |s| {
        s.current_onboarding_step == progress.step && s.onboarding_complete == progress.completed
    })
    .await;
    if let Err(response) = settled {
        return response;
    }
    Json(progress).into_response()
}

/// Build the onboarding REST routes.
pub fn onboarding_routes(state: OnboardingRouteState) -> Router {
    Router::new()
        .route("/api/onboarding/status", get(get_status))
        .route("/api/onboarding/role", post(select_role))
        .route("/api/onboarding/steps/{step}", post(submit_step))
        .with_state(state)
}
