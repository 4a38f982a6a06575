//! The download pipeline: normalize, resolve, fetch, store, deliver.
//!
//! Each request runs the stages once, in order. There is no retry loop; a
//! caller that wants a retry starts a fresh run. Whatever the outcome, the
//! run ends with a sweep of the transient store.

use axum::response::Response;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{Config, TwitterBackend};
use crate::models::{MediaRequest, NormalizedUrl, PipelineStage, Provider};
use crate::services::delivery::deliver;
use crate::services::error::PipelineError;
use crate::services::fetch::MediaFetcher;
use crate::services::normalize::normalize;
use crate::services::resolver::{MediaResolver, RankedMedia, ServiceResolver, resolve_ranked};
use crate::services::store::{TransientStore, get_extension};
use crate::services::twitter::TwitterSyndicationResolver;

#[derive(Clone)]
pub struct Pipeline {
    resolvers: HashMap<Provider, Arc<dyn MediaResolver>>,
    fetcher: MediaFetcher,
    store: TransientStore,
    resolve_timeout: Duration,
    retention: Duration,
}

impl Pipeline {
    pub fn new(
        fetcher: MediaFetcher,
        store: TransientStore,
        resolve_timeout: Duration,
        retention: Duration,
    ) -> Self {
        Self {
            resolvers: HashMap::new(),
            fetcher,
            store,
            resolve_timeout,
            retention,
        }
    }

    pub fn with_resolver(mut self, provider: Provider, resolver: Arc<dyn MediaResolver>) -> Self {
        self.resolvers.insert(provider, resolver);
        self
    }

    /// Wire up the production backends described by `config`.
    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        let resolver_http = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.resolve_timeout)
            .build()?;
        let fetcher = MediaFetcher::new(
            &config.user_agent,
            config.fetch_timeout,
            config.max_media_bytes,
        )?;
        let store = TransientStore::new(&config.temp_dir);

        let service: Arc<dyn MediaResolver> = Arc::new(ServiceResolver::new(
            &config.resolver_base_url,
            resolver_http.clone(),
        ));
        let twitter: Arc<dyn MediaResolver> = match config.twitter_backend {
            TwitterBackend::Syndication => Arc::new(TwitterSyndicationResolver::new(
                &config.twitter_syndication_url,
                resolver_http,
            )),
            TwitterBackend::Service => service.clone(),
        };

        Ok(
            Self::new(fetcher, store, config.resolve_timeout, config.retention)
                .with_resolver(Provider::Twitter, twitter)
                .with_resolver(Provider::Bilibili, service.clone())
                .with_resolver(Provider::YouTube, service),
        )
    }

    pub fn store(&self) -> &TransientStore {
        &self.store
    }

    /// Normalize and resolve only; nothing is fetched or stored.
    pub async fn resolve(
        &self,
        request: &MediaRequest,
    ) -> Result<(NormalizedUrl, RankedMedia), PipelineError> {
        let result = self.run_resolve(request).await;
        self.sweep().await;
        result
    }

    /// Full run ending in an attachment response.
    pub async fn download(&self, request: &MediaRequest) -> Result<Response, PipelineError> {
        let result = self.run_download(request).await;
        self.sweep().await;
        result
    }

    async fn run_resolve(
        &self,
        request: &MediaRequest,
    ) -> Result<(NormalizedUrl, RankedMedia), PipelineError> {
        let normalized = normalize(&request.raw_url, request.provider)
            .map_err(|e| failed(request, PipelineStage::Received, e))?;

        let resolver = self
            .resolvers
            .get(&request.provider)
            .ok_or_else(|| PipelineError::UnsupportedProvider(request.provider.to_string()))
            .map_err(|e| failed(request, PipelineStage::Normalized, e))?;

        let ranked = resolve_ranked(resolver.as_ref(), &normalized, self.resolve_timeout)
            .await
            .map_err(|e| failed(request, PipelineStage::Normalized, e))?;

        info!(
            provider = %request.provider,
            canonical_url = %normalized,
            backend = resolver.name(),
            variants = ranked.variants().len(),
            bitrate = ranked.best().bitrate,
            "Resolved media"
        );
        Ok((normalized, ranked))
    }

    async fn run_download(&self, request: &MediaRequest) -> Result<Response, PipelineError> {
        let (normalized, ranked) = self.run_resolve(request).await?;
        let best = ranked.best();

        let bytes = self
            .fetcher
            .fetch(best)
            .await
            .map_err(|e| failed(request, PipelineStage::Resolved, e))?;

        let ext = get_extension(&best.content_type);
        let artifact = self
            .store
            .save(&bytes, ext)
            .await
            .map_err(|e| failed(request, PipelineStage::Fetched, e))?;
        drop(bytes);

        let filename = format!("{}-video.{}", request.provider, ext);
        let size = artifact.size_bytes;
        let response = deliver(&self.store, artifact, &best.content_type, &filename)
            .await
            .map_err(|e| failed(request, PipelineStage::Stored, e))?;

        info!(
            provider = %request.provider,
            canonical_url = %normalized,
            bytes = size,
            stage = %PipelineStage::Delivered,
            "Delivered media"
        );
        Ok(response)
    }

    async fn sweep(&self) {
        let deleted = self.store.sweep(self.retention).await;
        if deleted > 0 {
            info!(deleted, "Removed stale media files");
        }
    }
}

/// Log a failure with the last stage reached and pass the error through
fn failed(request: &MediaRequest, stage: PipelineStage, error: PipelineError) -> PipelineError {
    warn!(
        provider = %request.provider,
        raw_url = %request.raw_url,
        stage = %stage,
        kind = error.kind(),
        "Pipeline failed: {}",
        error
    );
    error
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::RawVariant;
    use crate::services::resolver::tests::{StubResolver, raw};
    use axum::http::{StatusCode, header};
    use axum::{Router, routing::get};
    use serde_json::json;
    use std::time::SystemTime;
    use tempfile::TempDir;

    /// Serves `/clip.mp4` on a random local port; every other path is a 404
    pub async fn spawn_media_host() -> String {
        let router = Router::new().route(
            "/clip.mp4",
            get(|| async { ([(header::CONTENT_TYPE, "video/mp4")], b"mp4-bytes".to_vec()) }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    pub fn test_pipeline(dir: &TempDir, variants: Vec<RawVariant>) -> Pipeline {
        let fetcher = MediaFetcher::new("test-agent", Duration::from_secs(5), 1024 * 1024).unwrap();
        Pipeline::new(
            fetcher,
            TransientStore::new(dir.path().join("media")),
            Duration::from_secs(5),
            Duration::from_secs(30 * 60),
        )
        .with_resolver(
            Provider::Twitter,
            Arc::new(StubResolver::with_variants(variants)),
        )
    }

    fn file_count(dir: &std::path::Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn end_to_end_twitter_download() {
        let host = spawn_media_host().await;
        let tmp = TempDir::new().unwrap();
        let pipeline = test_pipeline(&tmp, vec![raw(&format!("{host}/clip.mp4"), json!(832000))]);
        let request = MediaRequest::new("@x.com/alice/status/123", Provider::Twitter);

        let (normalized, _) = pipeline.resolve(&request).await.unwrap();
        assert_eq!(normalized.canonical_url, "https://twitter.com/i/status/123");

        let response = pipeline.download(&request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"twitter-video.mp4\""
        );
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"mp4-bytes");

        let media_dir = pipeline.store().dir().to_path_buf();
        for _ in 0..50 {
            if file_count(&media_dir) == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(file_count(&media_dir), 0);
    }

    #[tokio::test]
    async fn picks_first_of_tied_highest_bitrates() {
        let host = spawn_media_host().await;
        let tmp = TempDir::new().unwrap();
        let pipeline = test_pipeline(
            &tmp,
            vec![
                raw(&format!("{host}/low.mp4"), json!(500)),
                raw(&format!("{host}/clip.mp4"), json!(1000)),
                raw(&format!("{host}/other.mp4"), json!(1000)),
            ],
        );
        let request = MediaRequest::new("https://twitter.com/a/status/1", Provider::Twitter);

        let (_, ranked) = pipeline.resolve(&request).await.unwrap();
        assert_eq!(ranked.best().url, format!("{host}/clip.mp4"));
        // Fetching the selected variant succeeds; the others would 404
        assert!(pipeline.download(&request).await.is_ok());
    }

    #[tokio::test]
    async fn invalid_url_fails_before_resolution() {
        let tmp = TempDir::new().unwrap();
        let pipeline = Pipeline::new(
            MediaFetcher::new("test-agent", Duration::from_secs(5), 1024).unwrap(),
            TransientStore::new(tmp.path()),
            Duration::from_secs(5),
            Duration::from_secs(60),
        )
        .with_resolver(
            Provider::Twitter,
            Arc::new(StubResolver {
                result: Err("must not be called".into()),
                delay: None,
            }),
        );
        let request = MediaRequest::new("https://x.com/alice", Provider::Twitter);
        let err = pipeline.download(&request).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn provider_without_backend_is_unsupported() {
        let tmp = TempDir::new().unwrap();
        let pipeline = test_pipeline(&tmp, vec![]);
        let request = MediaRequest::new("youtu.be/dQw4w9WgXcQ", Provider::YouTube);
        let err = pipeline.download(&request).await.unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedProvider(_)));
    }

    #[tokio::test]
    async fn empty_variants_and_fetch_errors_are_distinct() {
        let host = spawn_media_host().await;
        let tmp = TempDir::new().unwrap();
        let request = MediaRequest::new("x.com/a/status/9", Provider::Twitter);

        let empty = test_pipeline(&tmp, vec![]);
        assert!(matches!(
            empty.download(&request).await.unwrap_err(),
            PipelineError::NoVariantsFound
        ));

        let broken = test_pipeline(&tmp, vec![raw(&format!("{host}/gone.mp4"), json!(1))]);
        assert!(matches!(
            broken.download(&request).await.unwrap_err(),
            PipelineError::FetchFailed { status: Some(404), .. }
        ));
    }

    #[tokio::test]
    async fn every_run_sweeps_stale_files() {
        let tmp = TempDir::new().unwrap();
        let pipeline = test_pipeline(&tmp, vec![]);
        let stale = pipeline.store().save(b"old", "mp4").await.unwrap();
        std::fs::File::options()
            .write(true)
            .open(&stale.file_path)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(31 * 60))
            .unwrap();

        // Even a failed run sweeps
        let request = MediaRequest::new("not a url", Provider::Twitter);
        assert!(pipeline.download(&request).await.is_err());
        assert!(!stale.file_path.exists());
    }
}
