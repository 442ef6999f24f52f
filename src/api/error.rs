//! HTTP mapping of [`StorefrontError`].

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::StorefrontError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl StorefrontError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            StorefrontError::Validation(_) | StorefrontError::InsufficientPoints | StorefrontError::InvalidWebhook(_) => StatusCode::BAD_REQUEST,
            StorefrontError::Unauthorized => StatusCode::UNAUTHORIZED,
            StorefrontError::Forbidden => StatusCode::FORBIDDEN,
            StorefrontError::NotFound(_) => StatusCode::NOT_FOUND,
            StorefrontError::InsufficientStock(_) | StorefrontError::Conflict(_) => StatusCode::CONFLICT,
            StorefrontError::Store(_) | StorefrontError::Payment(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for StorefrontError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error = if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            "Something went wrong while processing your request".to_string()
        } else {
            self.to_string()
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}

impl From<JsonRejection> for StorefrontError {
    fn from(rejection: JsonRejection) -> Self { StorefrontError::Validation(rejection.body_text()) }
}

impl From<QueryRejection> for StorefrontError {
    fn from(rejection: QueryRejection) -> Self { StorefrontError::Validation(rejection.body_text()) }
}
