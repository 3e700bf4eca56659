use std::sync::Arc;

use axum::{
    extract::Path,
    response::IntoResponse,
    routing::get,
    Extension, Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::userdtos::OnboardBusinessDto,
    error::HttpError,
    middleware::AuthenticatedUser,
    store::userstore::UserStoreExt,
    AppState,
};

pub fn business_handler() -> Router {
    Router::new()
        .route("/", get(list_businesses).post(onboard_business))
        .route("/:business_id", get(get_business))
}

pub async fn onboard_business(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(body): Json<OnboardBusinessDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let business = app_state
        .workflow_service
        .onboard_business(auth.user.id, body)
        .await?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "data": business
    })))
}

pub async fn list_businesses(
    Extension(app_state): Extension<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpError> {
    let businesses = app_state.store.list_businesses().await;

    Ok(Json(serde_json::json!({
        "status": "success",
        "data": businesses
    })))
}

pub async fn get_business(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(business_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let business = app_state
        .store
        .get_business(business_id)
        .await
        .ok_or_else(|| HttpError::not_found("Business not found"))?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "data": business
    })))
}
