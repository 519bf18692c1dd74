//! Route handlers for the Radiocast API.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::warn;

use radiocast_core::access::AccessScope;
use radiocast_core::config::UserConfig;

use crate::controller::{CallFetch, Controller};

use super::payload::{CallJson, CallSummary, CallUpload};
use super::ws;

const SEARCH_LIMIT: i64 = 200;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<Controller>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/call-upload", post(upload_call))
        .route("/api/call/{id}", get(get_call))
        .route("/api/calls", get(search_calls))
        .route("/api/listen", get(ws::listen))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Requester identity on the read endpoints.
#[derive(Debug, Deserialize)]
pub struct KeyParams {
    pub key: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub key: String,
    pub system: Option<u32>,
    pub talkgroup: Option<u32>,
}

/// Resolve an API key to its user, or a 401.
fn authorize<'a>(controller: &'a Controller, key: &str) -> Result<&'a UserConfig, Response> {
    controller.config.user_by_key(key).ok_or_else(|| {
        (StatusCode::UNAUTHORIZED, Json(json!({ "error": "unknown api key" }))).into_response()
    })
}

/// Handler for `POST /api/call-upload`, the ingestion endpoint.
async fn upload_call(
    State(state): State<AppState>,
    Json(upload): Json<CallUpload>,
) -> Response {
    if !state.controller.config.is_ingest_key(&upload.key) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "invalid ingest key" })),
        )
            .into_response();
    }

    let new_call = match upload.into_new_call() {
        Ok(c) => c,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": e }))).into_response();
        }
    };

    match state.controller.ingest(new_call).await {
        Ok(id) => (StatusCode::OK, Json(json!({ "id": id }))).into_response(),
        Err(e) => {
            warn!(error = %e, "call ingestion failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "storage failure" })),
            )
                .into_response()
        }
    }
}

/// Handler for `GET /api/call/{id}`: direct fetch, gated by scope and delay.
async fn get_call(
    Path(id): Path<i64>,
    Query(params): Query<KeyParams>,
    State(state): State<AppState>,
) -> Response {
    let user = match authorize(&state.controller, &params.key) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    let scope = user.access.clone();

    match state.controller.call_by_id(id, &scope).await {
        Ok(CallFetch::Ready(row)) => Json(CallJson::from_row(row)).into_response(),
        Ok(CallFetch::Delayed) => (
            // The explicit "not available yet" signal: the call exists
            // but its compliance delay has not elapsed.
            StatusCode::TOO_EARLY,
            Json(json!({ "status": "delayed" })),
        )
            .into_response(),
        Ok(CallFetch::NotFound) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!(call_id = id, error = %e, "call fetch failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Handler for `GET /api/calls`: scope-filtered listing of released calls.
async fn search_calls(
    Query(params): Query<SearchParams>,
    State(state): State<AppState>,
) -> Response {
    let user = match authorize(&state.controller, &params.key) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    let scope = user.access.clone();

    match state
        .controller
        .search(&scope, params.system, params.talkgroup, SEARCH_LIMIT)
        .await
    {
        Ok(rows) => {
            let calls: Vec<CallSummary> = rows.iter().map(CallSummary::from_row).collect();
            Json(json!({ "calls": calls })).into_response()
        }
        Err(e) => {
            warn!(error = %e, "call search failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Used by the WebSocket handler, which lives in its own module.
pub(super) fn scope_for_key(controller: &Controller, key: &str) -> Option<(Arc<UserConfig>, AccessScope)> {
    let user = controller.config.user_by_key(key)?;
    Some((Arc::new(user.clone()), user.access.clone()))
}
