//! Provider resolution: canonical URL in, ranked media variants out.
//!
//! Backends implement [`MediaResolver`] and return whatever descriptors the
//! provider exposes. [`rank_variants`] turns those into a clean list sorted
//! by bitrate, and [`resolve_ranked`] applies the timeout and the
//! empty-vs-failed distinction the pipeline relies on.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::constants::DEFAULT_CONTENT_TYPE;
use crate::models::{MediaVariant, NormalizedUrl, RawVariant, ResolvedMedia, lenient_string};
use crate::services::error::PipelineError;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("{0}")]
    Unavailable(String),
}

impl ResolveError {
    fn upstream(&self) -> Option<String> {
        match self {
            ResolveError::Api { message, .. } => Some(message.clone()),
            ResolveError::Malformed(body) => Some(body.clone()),
            ResolveError::Unavailable(reason) => Some(reason.clone()),
            ResolveError::Http(_) => None,
        }
    }
}

impl From<ResolveError> for PipelineError {
    fn from(e: ResolveError) -> Self {
        PipelineError::ResolutionFailed {
            upstream: e.upstream(),
            message: e.to_string(),
        }
    }
}

/// A backend able to list the downloadable renditions behind a canonical URL
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    async fn resolve(&self, url: &NormalizedUrl) -> Result<ResolvedMedia, ResolveError>;
}

/// Resolved media with variants ranked best-first.
///
/// Only [`resolve_ranked`] builds one, and it never builds one without
/// variants.
#[derive(Debug, Clone)]
pub struct RankedMedia {
    title: Option<String>,
    variants: Vec<MediaVariant>,
}

impl RankedMedia {
    /// Highest bitrate variant
    pub fn best(&self) -> &MediaVariant {
        &self.variants[0]
    }

    pub fn variants(&self) -> &[MediaVariant] {
        &self.variants
    }

    pub fn into_parts(self) -> (Option<String>, Vec<MediaVariant>) {
        (self.title, self.variants)
    }
}

/// Bitrates arrive as numbers, numeric strings, null or garbage; anything
/// that is not a finite non-negative number counts as 0.
fn parse_bitrate(value: Option<&serde_json::Value>) -> u64 {
    let raw = match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match raw {
        Some(b) if b.is_finite() && b > 0.0 => b as u64,
        _ => 0,
    }
}

/// Drop unusable descriptors and sort descending by bitrate.
///
/// The sort is stable: equal bitrates keep the order the backend reported.
pub fn rank_variants(raw: Vec<RawVariant>) -> Vec<MediaVariant> {
    let mut variants: Vec<MediaVariant> = raw
        .into_iter()
        .filter_map(|v| {
            let url = v.url.as_deref().map(str::trim).filter(|u| !u.is_empty())?;
            let content_type = v
                .content_type
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .unwrap_or(DEFAULT_CONTENT_TYPE);
            Some(MediaVariant {
                url: url.to_string(),
                bitrate: parse_bitrate(v.bitrate.as_ref()),
                content_type: content_type.to_string(),
            })
        })
        .collect();
    variants.sort_by(|a, b| b.bitrate.cmp(&a.bitrate));
    variants
}

/// Run `resolver` under `timeout` and rank its output.
pub async fn resolve_ranked(
    resolver: &dyn MediaResolver,
    url: &NormalizedUrl,
    timeout: Duration,
) -> Result<RankedMedia, PipelineError> {
    let resolved = tokio::time::timeout(timeout, resolver.resolve(url))
        .await
        .map_err(|_| PipelineError::ResolutionFailed {
            message: format!(
                "{} did not answer within {}s",
                resolver.name(),
                timeout.as_secs()
            ),
            upstream: None,
        })??;

    let variants = rank_variants(resolved.variants);
    if variants.is_empty() {
        return Err(PipelineError::NoVariantsFound);
    }
    Ok(RankedMedia {
        title: resolved.title,
        variants,
    })
}

/// Error body of the resolution service; `detail` may be a string or a
/// validation error list.
#[derive(Debug, Deserialize)]
struct ServiceErrorBody {
    detail: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ServiceVideoResponse {
    #[serde(default)]
    variants: Vec<RawVariant>,
    #[serde(default, deserialize_with = "lenient_string")]
    download_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    content_type: Option<String>,
    bitrate: Option<serde_json::Value>,
    title: Option<String>,
}

impl From<ServiceVideoResponse> for ResolvedMedia {
    fn from(resp: ServiceVideoResponse) -> Self {
        let variants = if !resp.variants.is_empty() {
            resp.variants
        } else if resp.download_url.is_some() {
            vec![RawVariant {
                url: resp.download_url,
                bitrate: resp.bitrate,
                content_type: resp.content_type,
            }]
        } else {
            Vec::new()
        };
        ResolvedMedia {
            title: resp.title,
            variants,
        }
    }
}

/// Resolver backed by the external resolution microservice
/// (`GET {base}/{provider}/video?url=...`).
#[derive(Clone)]
pub struct ServiceResolver {
    base_url: String,
    http: Client,
}

impl ServiceResolver {
    pub fn new(base_url: &str, http: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        }
    }

    fn endpoint(&self, url: &NormalizedUrl) -> String {
        format!(
            "{}/{}/video?url={}",
            self.base_url,
            url.provider,
            percent_encode(&url.canonical_url)
        )
    }
}

fn percent_encode(s: &str) -> String {
    percent_encoding::utf8_percent_encode(s, percent_encoding::NON_ALPHANUMERIC).to_string()
}

#[async_trait]
impl MediaResolver for ServiceResolver {
    fn name(&self) -> &'static str {
        "resolution service"
    }

    async fn resolve(&self, url: &NormalizedUrl) -> Result<ResolvedMedia, ResolveError> {
        let resp = self.http.get(self.endpoint(url)).send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            let message = match serde_json::from_str::<ServiceErrorBody>(&text) {
                Ok(ServiceErrorBody {
                    detail: serde_json::Value::String(detail),
                }) => detail,
                Ok(ServiceErrorBody { detail }) => detail.to_string(),
                Err(_) => text,
            };
            return Err(ResolveError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: ServiceVideoResponse =
            serde_json::from_str(&text).map_err(|e| ResolveError::Malformed(e.to_string()))?;
        Ok(body.into())
    }
}
