use crate::services::{file_service::FileError, token_service::TokenError};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use std::fmt;

/// A machine-readable pointer at the request input that caused an error.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorItem {
    pub field: String,
    pub error: String,
}

impl ErrorItem {
    pub fn new(field: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            error: error.into(),
        }
    }
}

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
    pub details: Vec<ErrorItem>,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
            details: Vec::new(),
        }
    }

    /// Attach a field/error pair.
    pub fn with_detail(mut self, field: impl Into<String>, error: impl Into<String>) -> Self {
        self.details.push(ErrorItem::new(field, error));
        self
    }

    /// Shortcut for a 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    /// Shortcut for a 401 Unauthorized
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, msg)
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "error": self.message,
            "status": self.status.as_u16()
        });
        if !self.details.is_empty() {
            body["details"] = json!(self.details);
        }

        (self.status, Json(body)).into_response()
    }
}

impl From<FileError> for AppError {
    fn from(err: FileError) -> Self {
        let message = err.to_string();
        match err {
            FileError::MissingParameter(field) => {
                AppError::bad_request(message).with_detail(field, "missing")
            }
            FileError::InvalidParameter(field) => {
                AppError::bad_request(message).with_detail(field, "invalid")
            }
            FileError::Multipart(reason) => {
                AppError::bad_request(message).with_detail("multipart_data", reason)
            }
            FileError::PayloadTooLarge(reason) => {
                AppError::new(StatusCode::PAYLOAD_TOO_LARGE, message)
                    .with_detail("multipart_data", reason)
            }
            FileError::DisallowedExtension(ext) => AppError::bad_request(message)
                .with_detail("file", format!("extension {ext:?} is not allowed")),
            FileError::NoFiles => AppError::bad_request(message),
            FileError::NotFound(_) => AppError::not_found(message),
            FileError::Store(_) => AppError::internal(message),
        }
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => AppError::unauthorized("token has expired"),
            TokenError::Encoding(msg) => AppError::internal(msg),
            TokenError::Invalid(_) | TokenError::InvalidClaims => {
                AppError::unauthorized("invalid or expired token")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;

    #[test]
    fn file_errors_map_to_status_codes() {
        let cases = [
            (FileError::MissingParameter("id"), StatusCode::BAD_REQUEST),
            (FileError::InvalidParameter("id"), StatusCode::BAD_REQUEST),
            (FileError::Multipart("eof".into()), StatusCode::BAD_REQUEST),
            (
                FileError::PayloadTooLarge("length limit exceeded".into()),
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (FileError::DisallowedExtension(".exe".into()), StatusCode::BAD_REQUEST),
            (FileError::NoFiles, StatusCode::BAD_REQUEST),
            (FileError::NotFound("photos/1/".into()), StatusCode::NOT_FOUND),
            (
                FileError::Store(StoreError::backend("connection refused")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(AppError::from(err).status, status);
        }
    }

    #[test]
    fn store_message_is_passed_through() {
        let err = AppError::from(FileError::Store(StoreError::backend("bucket gone")));
        assert_eq!(err.message, "bucket gone");
    }

    #[test]
    fn missing_parameter_carries_field_detail() {
        let err = AppError::from(FileError::MissingParameter("id"));
        assert_eq!(err.details, vec![ErrorItem::new("id", "missing")]);
    }

    #[test]
    fn token_errors_are_unauthorized() {
        assert_eq!(
            AppError::from(TokenError::Expired).status,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::from(TokenError::InvalidClaims).status,
            StatusCode::UNAUTHORIZED
        );
    }
}
