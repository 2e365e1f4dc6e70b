//! # Document Upload
//!
//! Accepts one file per request and answers as if it had been stored. Nothing is
//! written anywhere; the URL is synthetic so the frontend flow can be exercised
//! before an object store is wired in.
use std::sync::Arc;

use axum::{
    Json,
    extract::{
        Multipart, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::{error::AppError, extract::AppPath, state::AppState};

const DEFAULT_MIME: &str = "application/octet-stream";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    pub success: bool,
    pub url: String,
    pub file_name: String,
    pub size: usize,
    pub mime_type: String,
    pub doc_type: String,
    pub uploaded_at: DateTime<Utc>,
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge
    } else {
        AppError::MalformedPayload
    }
}

fn storage_key(file_name: &str) -> String {
    file_name
        .chars()
        .map(|c| if c.is_whitespace() || c == '/' { '_' } else { c })
        .collect()
}

pub async fn upload_handler(
    State(state): State<Arc<AppState>>,
    AppPath(doc_type): AppPath<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadReceipt>, AppError> {
    let mut multipart = multipart.map_err(|e| AppError::Validation(e.body_text()))?;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let mime_type = field.content_type().unwrap_or(DEFAULT_MIME).to_string();
        let size = field.bytes().await.map_err(multipart_error)?.len();

        let uploaded_at = Utc::now();
        let url = format!(
            "{}/{doc_type}/{}-{}",
            state.config.upload_base_url.trim_end_matches('/'),
            uploaded_at.timestamp_millis(),
            storage_key(&file_name),
        );
        info!("Accepted {doc_type} upload {file_name} ({size} bytes)");

        return Ok(Json(UploadReceipt {
            success: true,
            url,
            file_name,
            size,
            mime_type,
            doc_type,
            uploaded_at,
        }));
    }

    Err(AppError::Validation("No file uploaded".to_string()))
}

#[cfg(test)]
mod tests {
    use super::storage_key;

    #[test]
    fn test_storage_key() {
        assert_eq!(storage_key("land record.pdf"), "land_record.pdf");
        assert_eq!(storage_key("../etc/passwd"), ".._etc_passwd");
        assert_eq!(storage_key("आधार.jpg"), "आधार.jpg");
    }
}
