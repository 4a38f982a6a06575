pub mod download;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{Method, header},
    routing::get,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::AppState;
use crate::constants::MAX_REQUEST_BODY_SIZE;

async fn health() -> &'static str {
    "ok"
}

/// Build the full application router
pub fn build_router(state: Arc<AppState>) -> Router {
    // Browser front ends on other origins call these endpoints directly
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .expose_headers([header::CONTENT_DISPOSITION]);

    Router::new()
        .route("/health", get(health))
        .merge(download::routes())
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_SIZE))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::pipeline::tests::test_pipeline;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tower::ServiceExt;
    use tracing_subscriber::{EnvFilter, Layer, layer::Context, layer::SubscriberExt};

    /// Records the target of every event that reaches it
    #[derive(Clone, Default)]
    struct EventTargets(Arc<Mutex<Vec<String>>>);

    impl<S: tracing::Subscriber> Layer<S> for EventTargets {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            self.0
                .lock()
                .unwrap()
                .push(event.metadata().target().to_string());
        }
    }

    #[tokio::test]
    async fn requests_are_logged_under_default_filter() {
        let targets = EventTargets::default();
        let subscriber = tracing_subscriber::registry()
            .with(EnvFilter::new(crate::logging::DEFAULT_FILTER))
            .with(targets.clone());
        let _guard = tracing::subscriber::set_default(subscriber);

        let tmp = TempDir::new().unwrap();
        let app = build_router(Arc::new(AppState {
            pipeline: test_pipeline(&tmp, vec![]),
        }));
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let seen = targets.0.lock().unwrap();
        assert!(
            seen.iter().any(|t| t.starts_with("tower_http")),
            "no request log in {seen:?}"
        );
    }
}
