// middleware.rs
//
// Identity is issued outside the core; by the time a request reaches us the
// external auth layer has already verified it. We only resolve the opaque
// user id it forwards and refuse requests without one.

use std::sync::Arc;

use axum::{extract::Request, middleware::Next, response::IntoResponse, Extension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{ErrorMessage, HttpError},
    models::usermodel::User,
    store::userstore::UserStoreExt,
    AppState,
};

pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuthenticatedUser {
    pub user: User,
}

pub async fn auth(
    Extension(app_state): Extension<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, HttpError> {
    let raw_id = req
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_owned())
        .ok_or_else(|| HttpError::unauthorized(ErrorMessage::IdentityNotProvided.to_string()))?;

    let user_id = Uuid::parse_str(&raw_id)
        .map_err(|_| HttpError::unauthorized(ErrorMessage::InvalidIdentity.to_string()))?;

    let user = app_state
        .store
        .get_user(user_id)
        .await
        .ok_or_else(|| HttpError::unauthorized(ErrorMessage::UserNoLongerExist.to_string()))?;

    req.extensions_mut().insert(AuthenticatedUser { user });

    Ok(next.run(req).await)
}
