//! Game-stats API proxy: /api/*, /map-image/:name, /health.

use stats_api::config::ProxyConfig;
use stats_api::server::{self, AppState};
use stats_client::{ApiClient, LookupCache, MapImages};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ProxyConfig::from_env()?;
    let client = Arc::new(ApiClient::from_config(&config.client)?);
    let map_images = MapImages::new(Arc::clone(&client), Arc::new(LookupCache::new()));
    let state = Arc::new(
        AppState::new(&client, config.client.token.clone(), map_images)
            .with_body_limit(config.max_body_bytes),
    );

    let app = server::router(state);
    tracing::info!(
        upstream = %config.client.base_url,
        "stats API proxy listening on {}",
        config.listen
    );
    axum::serve(
        tokio::net::TcpListener::bind(config.listen).await?,
        app.into_make_service(),
    )
    .await?;
    Ok(())
}
