//! REST endpoints for form drafts.
//!
//! `{key}` is `signup` or `<role>-step-<n>`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Map, Value};
use tracing::warn;

use super::keys::DraftKey;
use super::store::{DraftStorage, FormPersistenceStore};
use crate::error::StorageError;

/// Shared state for draft routes.
#[derive(Clone)]
pub struct DraftRouteState {
    pub storage: Arc<dyn DraftStorage>,
    pub product: String,
}

impl DraftRouteState {
    fn form(&self) -> FormPersistenceStore {
        FormPersistenceStore::new(Arc::clone(&self.storage), self.product.clone())
    }
}

fn error(status: StatusCode, message: impl std::fmt::Display) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": message.to_string() })),
    )
        .into_response()
}

fn parse_key(slug: &str) -> Result<DraftKey, Response> {
    DraftKey::from_slug(slug).ok_or_else(|| {
        error(
            StatusCode::NOT_FOUND,
            StorageError::UnknownKey(slug.to_string()),
        )
    })
}

fn storage_failure(e: StorageError) -> Response {
    warn!(error = %e, "Draft storage failed");
    error(StatusCode::INTERNAL_SERVER_ERROR, e)
}

/// GET /api/drafts/{key}
async fn get_draft(
    State(state): State<DraftRouteState>,
    Path(slug): Path<String>,
) -> Response {
    let key = match parse_key(&slug) {
        Ok(key) => key,
        Err(response) => return response,
    };
    let mut form = state.form();
    match form.load(key).await {
        Ok(true) => Json(Value::Object(form.data().clone())).into_response(),
        Ok(false) => error(StatusCode::NOT_FOUND, "No draft saved"),
        Err(e) => storage_failure(e),
    }
}

/// PUT /api/drafts/{key}
///
/// Merges the body into the saved draft and returns what was persisted.
async fn put_draft(
    State(state): State<DraftRouteState>,
    Path(slug): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let key = match parse_key(&slug) {
        Ok(key) => key,
        Err(response) => return response,
    };
    let Value::Object(partial) = body else {
        return error(
            StatusCode::UNPROCESSABLE_ENTITY,
            StorageError::NotAnObject {
                key: key.to_string(),
            },
        );
    };

    let mut form = state.form();
    let result = async {
        form.load(key).await?;
        form.update(partial).await?;
        if form.is_dirty() {
            form.save(key).await?;
        }
        Ok::<Map<String, Value>, StorageError>(form.persisted())
    }
    .await;

    match result {
        Ok(persisted) => Json(Value::Object(persisted)).into_response(),
        Err(e) => storage_failure(e),
    }
}

/// DELETE /api/drafts/{key}
async fn delete_draft(
    State(state): State<DraftRouteState>,
    Path(slug): Path<String>,
) -> Response {
    let key = match parse_key(&slug) {
        Ok(key) => key,
        Err(response) => return response,
    };
    match state.form().clear(key).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => error(StatusCode::NOT_FOUND, "No draft saved"),
        Err(e) => storage_failure(e),
    }
}

/// Build the draft REST routes.
pub fn draft_routes(state: DraftRouteState) -> Router {
    Router::new()
        .route(
            "/api/drafts/{key}",
            get(get_draft).put(put_draft).delete(delete_draft),
        )
        .with_state(state)
}
