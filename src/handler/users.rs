use std::sync::Arc;

use axum::{
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use validator::Validate;

use crate::{
    dtos::userdtos::{RegisterUserDto, UpdateProfileDto},
    error::HttpError,
    middleware::AuthenticatedUser,
    AppState,
};

/// Registration is invoked by the external auth collaborator once it has
/// issued an identity; it is the only unauthenticated write.
pub fn registration_handler() -> Router {
    Router::new().route("/register", post(register_user))
}

pub fn users_handler() -> Router {
    Router::new()
        .route("/me", get(get_me))
        .route("/profile", put(update_profile))
}

pub async fn register_user(
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<RegisterUserDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let user = app_state.workflow_service.register_user(body).await?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "data": user
    })))
}

pub async fn get_me(
    Extension(auth): Extension<AuthenticatedUser>,
) -> Result<impl IntoResponse, HttpError> {
    Ok(Json(serde_json::json!({
        "status": "success",
        "data": auth.user
    })))
}

pub async fn update_profile(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(body): Json<UpdateProfileDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let user = app_state
        .workflow_service
        .update_profile(auth.user.id, body)
        .await?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "data": user
    })))
}
