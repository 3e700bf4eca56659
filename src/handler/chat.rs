use std::sync::Arc;

use axum::{
    extract::Path,
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::chatdtos::SendMessageDto,
    error::HttpError,
    middleware::AuthenticatedUser,
    service::projection_service::ViewerProjection,
    store::chatstore::ChatStoreExt,
    AppState,
};

pub fn chat_handler() -> Router {
    Router::new()
        .route("/messages", post(send_message))
        .route("/messages/:counterparty_id", get(get_conversation))
        .route("/messages/:counterparty_id/read", put(mark_thread_read))
        .route("/threads", get(get_threads))
}

pub async fn send_message(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(body): Json<SendMessageDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let message = app_state
        .workflow_service
        .send_message(auth.user.id, body)
        .await?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "data": message
    })))
}

pub async fn get_conversation(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(counterparty_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let messages = app_state
        .store
        .messages_between(auth.user.id, counterparty_id)
        .await;

    Ok(Json(serde_json::json!({
        "status": "success",
        "results": messages.len(),
        "data": messages
    })))
}

pub async fn mark_thread_read(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(counterparty_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let updated = app_state
        .workflow_service
        .mark_thread_read(auth.user.id, counterparty_id)
        .await?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "data": {
            "updated": updated.len()
        }
    })))
}

/// Initial thread list for a viewer. Built through the same projection code
/// the live stream uses, so the snapshot and the deltas can never disagree.
pub async fn get_threads(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> Result<impl IntoResponse, HttpError> {
    let snapshot = app_state.store.viewer_snapshot(auth.user.id).await;
    let seq = snapshot.seq;
    let projection = ViewerProjection::from_snapshot(auth.user.id, &snapshot, seq);
    let threads = projection.snapshot_threads();

    Ok(Json(serde_json::json!({
        "status": "success",
        "results": threads.len(),
        "last_seen": seq,
        "data": threads
    })))
}
