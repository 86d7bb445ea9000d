use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use greenroom_core::{AuthError, DatabaseError, GatewayError, InterviewError};

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{resource}:{identifier} not found")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        resource: &'static str,
        field: &'static str,
        value: String,
    },
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Invalid or expired token")]
    InvalidOrExpiredToken,
    #[error("Account is inactive")]
    InactiveAccount,
    #[error("{0}")]
    Validation(&'static str),
    #[error("Upstream dependency failed: {0}")]
    Dependency(String),
    #[error("Service is shutting down")]
    Unavailable,
    #[error("Unknown internal error: {0}")]
    Unknown(String),
}

impl ServerError {
    fn as_status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::InvalidOrExpiredToken => StatusCode::UNAUTHORIZED,
            Self::InactiveAccount => StatusCode::UNAUTHORIZED,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Dependency(_) => StatusCode::BAD_GATEWAY,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (self.as_status_code(), self.to_string()).into_response()
    }
}

impl From<AuthError> for ServerError {
    fn from(value: AuthError) -> Self {
        match value {
            AuthError::InvalidCredentials => Self::InvalidCredentials,
            AuthError::InvalidOrExpiredToken => Self::InvalidOrExpiredToken,
            AuthError::InactiveAccount => Self::InactiveAccount,
            AuthError::Db(e) => e.into(),
            e => Self::Unknown(e.to_string()),
        }
    }
}

impl From<DatabaseError> for ServerError {
    fn from(value: DatabaseError) -> Self {
        match value {
            DatabaseError::NotFound {
                resource,
                identifier,
            } => Self::NotFound {
                resource,
                identifier,
            },
            DatabaseError::Conflict {
                resource,
                field,
                value,
            } => Self::Conflict {
                resource,
                field,
                value,
            },
            e => Self::Unknown(e.to_string()),
        }
    }
}

impl From<InterviewError> for ServerError {
    fn from(value: InterviewError) -> Self {
        match value {
            InterviewError::NotFound => Self::NotFound {
                resource: "interview",
                identifier: "id",
            },
            InterviewError::QueueClosed => Self::Unavailable,
            InterviewError::Db(e) => e.into(),
        }
    }
}

impl From<GatewayError> for ServerError {
    fn from(value: GatewayError) -> Self {
        Self::Dependency(value.to_string())
    }
}
