use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use db::{
    DbErr,
    models::{comment::CommentError, item::ItemError, order::OrderError, tag::TagError},
};
use services::services::config::ConfigError;
use thiserror::Error;
use utils::response::ApiResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Order(#[from] OrderError),
    #[error(transparent)]
    Tag(#[from] TagError),
    #[error(transparent)]
    Comment(#[from] CommentError),
    #[error(transparent)]
    Item(#[from] ItemError),
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl ApiError {
    fn status_and_type(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Order(err) => match err {
                OrderError::NotFound => (StatusCode::NOT_FOUND, "OrderNotFound"),
                OrderError::ValidationFailed(_) => (StatusCode::BAD_REQUEST, "ValidationFailed"),
                OrderError::IllegalTransition { .. } => {
                    (StatusCode::CONFLICT, "IllegalTransition")
                }
                OrderError::TransactionFailed(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "TransactionFailed")
                }
            },
            ApiError::Tag(err) => match err {
                TagError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "TagError"),
                TagError::NotFound => (StatusCode::NOT_FOUND, "TagNotFound"),
                TagError::AlreadyExists { .. } => (StatusCode::CONFLICT, "TagAlreadyExists"),
                TagError::ValidationError(_) => (StatusCode::BAD_REQUEST, "ValidationFailed"),
            },
            ApiError::Comment(err) => match err {
                CommentError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CommentError"),
                CommentError::NotFound => (StatusCode::NOT_FOUND, "CommentNotFound"),
                CommentError::OrderNotFound => (StatusCode::NOT_FOUND, "OrderNotFound"),
                CommentError::CommentsDisabled => (StatusCode::FORBIDDEN, "CommentsDisabled"),
                CommentError::ValidationError(_) => (StatusCode::BAD_REQUEST, "ValidationFailed"),
            },
            ApiError::Item(err) => match err {
                ItemError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ItemError"),
                ItemError::NotFound => (StatusCode::NOT_FOUND, "ItemNotFound"),
                ItemError::OrderNotFound => (StatusCode::NOT_FOUND, "OrderNotFound"),
                ItemError::OrderNotAssigned(_) => (StatusCode::CONFLICT, "OrderNotAssigned"),
                ItemError::InsufficientStock { .. } => (StatusCode::CONFLICT, "InsufficientStock"),
                ItemError::AlreadyExists(_) => (StatusCode::CONFLICT, "ItemAlreadyExists"),
                ItemError::ValidationError(_) => (StatusCode::BAD_REQUEST, "ValidationFailed"),
            },
            ApiError::Database(DbErr::RecordNotFound(_)) => (StatusCode::NOT_FOUND, "NotFound"),
            ApiError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DatabaseError"),
            ApiError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ConfigError"),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized"),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "ForbiddenError"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BadRequest"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status_code, error_type) = self.status_and_type();

        let error_message = match &self {
            ApiError::Unauthorized => "Unauthorized".to_string(),
            ApiError::Forbidden(msg) | ApiError::NotFound(msg) | ApiError::BadRequest(msg) => {
                msg.clone()
            }
            // Storage details stay in the log.
            _ if status_code.is_server_error() => {
                "Internal error, the operation was rolled back".to_string()
            }
            _ => self.to_string(),
        };

        if status_code.is_server_error() {
            tracing::error!(
                status = %status_code,
                error_type,
                error = %self,
                "API request failed"
            );
        }
        let response = ApiResponse::<()>::error(&error_message).with_code(status_code.as_u16());
        (status_code, Json(response)).into_response()
    }
}
