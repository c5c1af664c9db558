//! Error taxonomy shared by the services, the store and the HTTP boundary.

use std::borrow::Cow;

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

use crate::models::ApiResponse;

#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Malformed or missing input. Nothing was written.
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    /// Authenticated, but not allowed to act on this entity.
    #[error("{0}")]
    Forbidden(String),

    /// Missing or unreadable caller identity.
    #[error("{0}")]
    Unauthorized(String),

    /// An exclusivity constraint is already satisfied (already claimed, duplicate name).
    #[error("{0}")]
    Conflict(String),

    /// The operation does not apply to the listing's current lifecycle state.
    #[error("{0}")]
    InvalidState(String),

    #[error("storage failure: {0}")]
    Storage(#[source] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, DirectoryError>;

impl DirectoryError {
    pub fn not_found(entity: &str) -> Self {
        Self::NotFound(entity.to_string())
    }
}

impl From<sqlx::Error> for DirectoryError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.code() == Some(Cow::Borrowed("23505")) {
                let constraint = db_err.constraint().unwrap_or("unique constraint");
                return Self::Conflict(format!("Duplicate value violates {constraint}"));
            }
            if db_err.code() == Some(Cow::Borrowed("23503")) {
                return Self::Validation("Referenced record does not exist".into());
            }
        }
        Self::Storage(err)
    }
}

impl From<validator::ValidationErrors> for DirectoryError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(format!("Validation failed: {errors}"))
    }
}

impl ResponseError for DirectoryError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Conflict(_) | Self::InvalidState(_) => StatusCode::CONFLICT,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            Self::Storage(err) => {
                log::error!("Storage failure: {err:?}");
                "Internal storage error".to_string()
            }
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(ApiResponse::<()>::error(message))
    }
}
