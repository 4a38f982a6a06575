//! Download of the selected media variant

use bytes::{Bytes, BytesMut};
use reqwest::{Client, StatusCode};
use std::time::Duration;

use crate::models::MediaVariant;
use crate::services::error::PipelineError;

#[derive(Clone)]
pub struct MediaFetcher {
    http: Client,
    max_bytes: u64,
}

impl MediaFetcher {
    /// Build a fetcher with its own client so the browser User-Agent and
    /// the overall timeout apply to every media request.
    pub fn new(user_agent: &str, timeout: Duration, max_bytes: u64) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { http, max_bytes })
    }

    pub async fn fetch(&self, variant: &MediaVariant) -> Result<Bytes, PipelineError> {
        let mut resp = self
            .http
            .get(&variant.url)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(PipelineError::FetchFailed {
                status: Some(status.as_u16()),
                message: format!("media host answered HTTP {}", status.as_u16()),
            });
        }

        if resp.content_length().is_some_and(|len| len > self.max_bytes) {
            return Err(self.too_large());
        }

        let mut body = BytesMut::new();
        while let Some(chunk) = resp.chunk().await.map_err(transport_error)? {
            if (body.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(self.too_large());
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body.freeze())
    }

    fn too_large(&self) -> PipelineError {
        PipelineError::FetchFailed {
            status: Some(StatusCode::PAYLOAD_TOO_LARGE.as_u16()),
            message: format!("media is larger than {} bytes", self.max_bytes),
        }
    }
}

fn transport_error(e: reqwest::Error) -> PipelineError {
    let message = if e.is_timeout() {
        "timed out downloading media".to_string()
    } else {
        format!("HTTP error: {}", e)
    };
    PipelineError::FetchFailed {
        status: e.status().map(|s| s.as_u16()),
        message,
    }
}
