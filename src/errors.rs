use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use crate::{media::MediaError, JsonResponse};

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotAuthorized(&'static str),
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("{0}")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(&'static str),
    #[error("{0}")]
    TooManyRequests(&'static str),
    #[error(transparent)]
    Media(#[from] MediaError),
    #[error("{0}")]
    ServerError(String),
    #[error(transparent)]
    DatabaseError(#[from] sqlx::Error),
}

#[derive(serde::Serialize, Debug)]
pub struct RequestErrorJson {
    success: bool,
    message: String,
}

impl RequestErrorJson {
    pub fn new(message: impl Into<String>) -> RequestErrorJson {
        RequestErrorJson {
            success: false,
            message: message.into(),
        }
    }
}

impl RequestError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            RequestError::Validation(_) => StatusCode::BAD_REQUEST,
            RequestError::NotAuthorized(_) => StatusCode::UNAUTHORIZED,
            RequestError::Forbidden(_) => StatusCode::FORBIDDEN,
            RequestError::NotFound(_) => StatusCode::NOT_FOUND,
            RequestError::Conflict(_) => StatusCode::CONFLICT,
            RequestError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            RequestError::Media(MediaError::NotConfigured) => StatusCode::SERVICE_UNAVAILABLE,
            RequestError::Media(_)
            | RequestError::ServerError(_)
            | RequestError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn to_json_response(&self) -> JsonResponse<RequestErrorJson> {
        let status_code = self.status_code();
        if status_code.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(status = status_code.as_u16(), error = %self, "request rejected");
        }
        (status_code, Json(RequestErrorJson::new(self.to_string())))
    }
}

impl IntoResponse for RequestError {
    fn into_response(self) -> axum::response::Response {
        self.to_json_response().into_response()
    }
}

/// Maps a unique-constraint violation to a conflict, anything else stays a
/// database error.
pub fn conflict_on_unique(error: sqlx::Error, message: &'static str) -> RequestError {
    match &error {
        sqlx::Error::Database(db_error) if db_error.is_unique_violation() => {
            RequestError::Conflict(message)
        }
        _ => RequestError::DatabaseError(error),
    }
}

impl From<anyhow::Error> for RequestError {
    fn from(value: anyhow::Error) -> Self {
        Self::ServerError(value.to_string())
    }
}

impl From<JsonRejection> for RequestError {
    fn from(value: JsonRejection) -> Self {
        Self::Validation(value.body_text())
    }
}

impl From<QueryRejection> for RequestError {
    fn from(value: QueryRejection) -> Self {
        Self::Validation(value.body_text())
    }
}

impl From<PathRejection> for RequestError {
    fn from(value: PathRejection) -> Self {
        Self::Validation(value.body_text())
    }
}

impl From<MultipartRejection> for RequestError {
    fn from(value: MultipartRejection) -> Self {
        Self::Validation(value.body_text())
    }
}

impl From<MultipartError> for RequestError {
    fn from(value: MultipartError) -> Self {
        Self::Validation(format!("Invalid multipart body: {}", value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_status_codes() {
        assert_eq!(
            RequestError::invalid("bad").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RequestError::NotAuthorized("no").status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            RequestError::Forbidden("no").status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            RequestError::NotFound("gone").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            RequestError::Conflict("taken").status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            RequestError::TooManyRequests("slow down").status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            RequestError::Media(MediaError::NotConfigured).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            RequestError::DatabaseError(sqlx::Error::RowNotFound).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn message_is_passed_through() {
        let (status, Json(body)) = RequestError::NotFound("Post not found").to_json_response();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(!body.success);
        assert_eq!(body.message, "Post not found");
    }

    #[test]
    fn non_unique_errors_stay_database_errors() {
        let error = conflict_on_unique(sqlx::Error::RowNotFound, "taken");
        assert!(matches!(error, RequestError::DatabaseError(_)));
    }
}
