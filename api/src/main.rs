mod config;
mod constants;
mod logging;
mod models;
mod routes;
mod services;

use std::sync::Arc;
use tracing::info;

use config::Config;
use services::pipeline::Pipeline;

pub struct AppState {
    pub pipeline: Pipeline,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();

    let config = Config::from_env()?;
    let pipeline = Pipeline::from_config(&config)?;

    info!(
        resolver = %config.resolver_base_url,
        twitter_backend = ?config.twitter_backend,
        temp_dir = %pipeline.store().dir().display(),
        retention_secs = config.retention.as_secs(),
        "Pipeline configured"
    );

    let app = routes::build_router(Arc::new(AppState { pipeline }));

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
