// service/error.rs
use thiserror::Error;
use uuid::Uuid;

use crate::error::HttpError;
use crate::store::store::StoreError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("User {actor} is not authorized to act on {entity} {id}")]
    Unauthorized {
        actor: Uuid,
        entity: &'static str,
        id: Uuid,
    },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("{0} {1} not found")]
    NotFound(&'static str, Uuid),

    #[error("Subscriber fell behind feed retention; resync required")]
    FeedGap,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<ServiceError> for HttpError {
    fn from(error: ServiceError) -> Self {
        match error {
            ServiceError::NotFound(_, _) => HttpError::not_found(error.to_string()),

            ServiceError::Validation(_) | ServiceError::InvalidState(_) => {
                HttpError::bad_request(error.to_string())
            }

            ServiceError::Unauthorized { .. } => HttpError::unauthorized(error.to_string()),

            ServiceError::Conflict(_) => HttpError::conflict(error.to_string()),

            ServiceError::Store(StoreError::RowNotFound(_, _)) => {
                HttpError::not_found(error.to_string())
            }
            ServiceError::Store(StoreError::DuplicateRow(_, _)) => {
                HttpError::conflict(error.to_string())
            }

            _ => HttpError::server_error(error.to_string()),
        }
    }
}
