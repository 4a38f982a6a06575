//! Pipeline error taxonomy and its HTTP mapping

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid media URL: {0}")]
    InvalidUrl(String),

    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    #[error("Failed to resolve media: {message}")]
    ResolutionFailed {
        message: String,
        /// Raw error text from the provider or resolution service
        upstream: Option<String>,
    },

    /// `status` is `None` when no HTTP response was received
    #[error("Failed to download media: {message}")]
    FetchFailed { status: Option<u16>, message: String },

    #[error("No downloadable media found for this URL")]
    NoVariantsFound,

    #[error("Storage error ({context}): {source}")]
    StorageFailed {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::InvalidUrl(_) => "invalid_url",
            PipelineError::UnsupportedProvider(_) => "unsupported_provider",
            PipelineError::ResolutionFailed { .. } => "resolution_failed",
            PipelineError::FetchFailed { .. } => "fetch_failed",
            PipelineError::NoVariantsFound => "no_variants_found",
            PipelineError::StorageFailed { .. } => "storage_failed",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            PipelineError::InvalidUrl(_) | PipelineError::UnsupportedProvider(_) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn details(&self) -> serde_json::Value {
        let mut details = json!({ "kind": self.kind() });
        match self {
            PipelineError::ResolutionFailed {
                upstream: Some(upstream),
                ..
            } => {
                details["upstream"] = json!(upstream);
            }
            PipelineError::FetchFailed {
                status: Some(status),
                ..
            } => {
                details["status"] = json!(status);
            }
            PipelineError::StorageFailed { source, .. } => {
                details["cause"] = json!(source.to_string());
            }
            _ => {}
        }
        details
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.to_string(),
            "details": self.details(),
        });
        (self.status_code(), Json(body)).into_response()
    }
}

/// Attach a storage context to filesystem errors
pub trait StorageContext<T> {
    fn storage_context(self, context: &'static str) -> Result<T, PipelineError>;
}

impl<T> StorageContext<T> for std::io::Result<T> {
    fn storage_context(self, context: &'static str) -> Result<T, PipelineError> {
        self.map_err(|source| PipelineError::StorageFailed { context, source })
    }
}

/// Extension trait for errors that are logged and then dropped
pub trait LogErr<T> {
    /// Log error with context at warn level and discard it
    fn log_warn(self, context: &str) -> Option<T>;
}

impl<T, E: std::fmt::Display> LogErr<T> for Result<T, E> {
    fn log_warn(self, context: &str) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("{}: {}", context, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(err: PipelineError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn validation_errors_are_bad_request() {
        let (status, body) = body_json(PipelineError::InvalidUrl("missing status id".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["details"]["kind"], "invalid_url");
        assert!(body["error"].as_str().unwrap().contains("missing status id"));

        let (status, _) = body_json(PipelineError::UnsupportedProvider("vimeo".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn upstream_failures_are_server_errors_with_context() {
        let (status, body) = body_json(PipelineError::ResolutionFailed {
            message: "service returned 502".into(),
            upstream: Some("bad gateway".into()),
        })
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["details"]["upstream"], "bad gateway");

        let (status, body) = body_json(PipelineError::FetchFailed {
            status: Some(404),
            message: "HTTP 404".into(),
        })
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["details"]["status"], 404);

        let (status, body) = body_json(PipelineError::NoVariantsFound).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["details"]["kind"], "no_variants_found");
    }

    #[test]
    fn log_warn_discards_errors() {
        let ok: Result<u8, String> = Ok(3);
        let err: Result<u8, String> = Err("gone".into());
        assert_eq!(ok.log_warn("ctx"), Some(3));
        assert_eq!(err.log_warn("ctx"), None);
    }
}
