//! Shared data models used across the download pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

use crate::services::error::PipelineError;

/// Video hosting platforms the pipeline knows how to resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Twitter,
    Bilibili,
    YouTube,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Twitter => "twitter",
            Provider::Bilibili => "bilibili",
            Provider::YouTube => "youtube",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "twitter" | "x" => Ok(Provider::Twitter),
            "bilibili" => Ok(Provider::Bilibili),
            "youtube" => Ok(Provider::YouTube),
            _ => Err(PipelineError::UnsupportedProvider(s.to_string())),
        }
    }
}

/// Input to the pipeline, one per inbound request
#[derive(Debug, Clone)]
pub struct MediaRequest {
    pub raw_url: String,
    pub provider: Provider,
}

impl MediaRequest {
    pub fn new(raw_url: impl Into<String>, provider: Provider) -> Self {
        Self {
            raw_url: raw_url.into(),
            provider,
        }
    }
}

/// A validated URL in the provider's single canonical form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedUrl {
    pub provider: Provider,
    pub canonical_url: String,
    /// Identifier extracted from the path (status id, BV id, video id, short code)
    pub media_id: String,
}

impl fmt::Display for NormalizedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_url)
    }
}

/// Variant descriptor as reported by a resolver backend, before cleanup
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawVariant {
    #[serde(default, deserialize_with = "lenient_string")]
    pub url: Option<String>,
    /// Backends disagree on number vs string here, so keep it loose
    #[serde(default)]
    pub bitrate: Option<serde_json::Value>,
    #[serde(default, alias = "contentType", deserialize_with = "lenient_string")]
    pub content_type: Option<String>,
}

/// Strings pass through; any other JSON type reads as absent so one bad
/// descriptor does not reject the whole backend answer.
pub(crate) fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Some(s),
        _ => None,
    })
}

/// Backend output for one canonical URL
#[derive(Debug, Clone, Default)]
pub struct ResolvedMedia {
    pub title: Option<String>,
    pub variants: Vec<RawVariant>,
}

/// One downloadable rendition, ranked by bitrate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaVariant {
    pub url: String,
    pub bitrate: u64,
    pub content_type: String,
}

/// A binary persisted in the transient store
#[derive(Debug, Clone)]
pub struct StoredArtifact {
    pub id: Uuid,
    pub file_path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
}

/// Where a request is in the pipeline; used for logging failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Received,
    Normalized,
    Resolved,
    Fetched,
    Stored,
    Delivered,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Received => "received",
            PipelineStage::Normalized => "normalized",
            PipelineStage::Resolved => "resolved",
            PipelineStage::Fetched => "fetched",
            PipelineStage::Stored => "stored",
            PipelineStage::Delivered => "delivered",
        };
        f.write_str(name)
    }
}
