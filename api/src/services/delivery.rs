//! Turns a stored artifact into a download response

use axum::{
    body::Body,
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use chrono::Utc;
use tracing::debug;

use crate::models::StoredArtifact;
use crate::services::error::{LogErr, PipelineError};
use crate::services::store::TransientStore;

/// Read the artifact, build an attachment response, then delete the file in
/// the background. The client already has the bytes, so a failed delete is
/// only logged; the sweep picks it up later.
pub async fn deliver(
    store: &TransientStore,
    artifact: StoredArtifact,
    content_type: &str,
    filename: &str,
) -> Result<Response, PipelineError> {
    let bytes = store.read(&artifact).await?;
    let len = bytes.len();

    let content_type = HeaderValue::from_str(content_type)
        .unwrap_or_else(|_| HeaderValue::from_static(crate::constants::DEFAULT_CONTENT_TYPE));
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_DISPOSITION, disposition)
        .header(header::CONTENT_LENGTH, len)
        .body(Body::from(bytes))
        .map_err(|e| PipelineError::StorageFailed {
            context: "build download response",
            source: std::io::Error::other(e),
        })?;

    let store = store.clone();
    tokio::spawn(async move {
        if store
            .remove(&artifact)
            .await
            .log_warn("Failed to delete delivered artifact")
            .is_some()
        {
            let age_ms = (Utc::now() - artifact.created_at).num_milliseconds();
            debug!(artifact = %artifact.id, age_ms, "Deleted delivered artifact");
        }
    });

    Ok(response)
}
