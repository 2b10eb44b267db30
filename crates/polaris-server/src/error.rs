use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use polaris_engine::EngineError;
use polaris_types::{ErrorBody, ErrorCode, TypeError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<TypeError> for ServerError {
    fn from(err: TypeError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl ServerError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Engine(e) => e.code(),
            Self::Unauthenticated(_) => ErrorCode::InsufficientPermissions,
            Self::BadRequest(_) => ErrorCode::BadArgs,
            Self::Config(_) | Self::Io(_) | Self::Internal(_) => ErrorCode::Unknown,
        }
    }

    pub fn status(&self) -> StatusCode {
        if matches!(self, Self::Unauthenticated(_)) {
            return StatusCode::UNAUTHORIZED;
        }
        status_for(self.code())
    }

    fn message(&self) -> String {
        match self {
            Self::Engine(e) => e.client_message(),
            Self::Unauthenticated(_) | Self::BadRequest(_) => self.to_string(),
            _ => "internal server error".to_string(),
        }
    }
}

/// HTTP status for an error code. Clients act on the code in the body.
pub fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::NoSuchObject => StatusCode::NOT_FOUND,
        ErrorCode::NameConflict | ErrorCode::ParentConflict | ErrorCode::VersionConflict => {
            StatusCode::CONFLICT
        }
        ErrorCode::InsufficientPermissions => StatusCode::FORBIDDEN,
        ErrorCode::InvalidOperationOnType | ErrorCode::BadArgs => StatusCode::BAD_REQUEST,
        ErrorCode::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            error_code: self.code(),
            message: self.message(),
        };
        (status, Json(body)).into_response()
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
