use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::{database::DatabaseError, store::StoreError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    DomainMismatch(String),

    #[error("Malformed payload")]
    MalformedPayload,

    #[error("Payload too large")]
    PayloadTooLarge,

    #[error("{context}")]
    Store {
        context: String,
        #[source]
        source: StoreError,
    },

    #[error("{context}")]
    Database {
        context: String,
        #[source]
        source: DatabaseError,
    },
}

impl AppError {
    /// Maps a store failure, turning [`StoreError::NotFound`] into `not_found`.
    pub fn from_store(source: StoreError, context: &str, not_found: &str) -> Self {
        match source {
            StoreError::NotFound => AppError::NotFound(not_found.to_string()),
            source => AppError::store(context, source),
        }
    }

    pub fn store(context: &str, source: StoreError) -> Self {
        AppError::Store {
            context: context.to_string(),
            source,
        }
    }

    pub fn database(context: &str, source: DatabaseError) -> Self {
        AppError::Database {
            context: context.to_string(),
            source,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) | AppError::DomainMismatch(_) | AppError::MalformedPayload => {
                StatusCode::BAD_REQUEST
            }
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Store { .. } | AppError::Database { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        match &self {
            AppError::Store { context, source } => error!("{context}: {source}"),
            AppError::Database { context, source } => error!("{context}: {source}"),
            _ => {}
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
