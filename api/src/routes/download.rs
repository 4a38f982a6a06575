//! Media download endpoints (/api/download/*, /api/resolve/*)

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    response::Response,
    routing::post,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::AppState;
use crate::models::{MediaRequest, MediaVariant, Provider};
use crate::services::error::PipelineError;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/download/{provider}", post(download))
        .route("/api/resolve/{provider}", post(resolve))
        // Legacy path kept for the Twitter download page
        .route("/api/download-twitter", post(download_twitter))
}

#[derive(Debug, Deserialize)]
struct DownloadRequest {
    url: String,
}

#[derive(Debug, Serialize)]
struct ResolveResponse {
    provider: Provider,
    canonical_url: String,
    download_url: String,
    content_type: String,
    bitrate: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    variants: Vec<MediaVariant>,
}

/// A bad body is a bad URL from the client's point of view, so it gets the
/// same 400 JSON error rather than the framework's rejection.
fn media_request(
    provider: Provider,
    payload: Result<Json<DownloadRequest>, JsonRejection>,
) -> Result<MediaRequest, PipelineError> {
    let Json(body) = payload.map_err(|e| {
        PipelineError::InvalidUrl(format!(
            "expected a JSON body with a `url` string ({})",
            e.body_text()
        ))
    })?;
    Ok(MediaRequest::new(body.url, provider))
}

/// POST /api/download/{provider} - Resolve and return the media file
async fn download(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    payload: Result<Json<DownloadRequest>, JsonRejection>,
) -> Result<Response, PipelineError> {
    let request = media_request(provider.parse()?, payload)?;
    state.pipeline.download(&request).await
}

/// POST /api/download-twitter - Same as /api/download/twitter
async fn download_twitter(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<DownloadRequest>, JsonRejection>,
) -> Result<Response, PipelineError> {
    let request = media_request(Provider::Twitter, payload)?;
    state.pipeline.download(&request).await
}

/// POST /api/resolve/{provider} - Resolve only, return the best download URL
async fn resolve(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    payload: Result<Json<DownloadRequest>, JsonRejection>,
) -> Result<Json<ResolveResponse>, PipelineError> {
    let request = media_request(provider.parse()?, payload)?;
    let (normalized, ranked) = state.pipeline.resolve(&request).await?;
    let best = ranked.best().clone();
    let (title, variants) = ranked.into_parts();

    Ok(Json(ResolveResponse {
        provider: normalized.provider,
        canonical_url: normalized.canonical_url,
        download_url: best.url,
        content_type: best.content_type,
        bitrate: best.bitrate,
        title,
        variants,
    }))
}
