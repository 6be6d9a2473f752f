use anyhow::Context;
use guildhall_api::{app, AppState, Repositories};
use guildhall_store::{Config, DbClient, HttpFulfillmentClient, RedisClient, StripeClient};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "guildhall_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Guildhall API on port {}", config.server.port);

    let repos = if config.database.url.is_empty() {
        tracing::warn!("No database configured, using in-memory storage");
        Repositories::in_memory()
    } else {
        let db = DbClient::new(&config.database.url, config.database.max_connections)
            .await
            .context("Failed to connect to Postgres")?;
        db.migrate().await.context("Failed to run migrations")?;
        Repositories::postgres(&db)
    };

    // Rate limiting is optional
    let rate_limiter = match config.redis.url.as_deref() {
        Some(url) if !url.is_empty() => Some(Arc::new(RedisClient::new(url).context("Invalid Redis URL")?)),
        _ => None,
    };

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http.timeout_seconds))
        .build()
        .context("Failed to build HTTP client")?;
    let payments = Arc::new(StripeClient::new(
        http.clone(),
        &config.payments.api_base,
        &config.payments.secret_key,
    ));
    let fulfillment = Arc::new(HttpFulfillmentClient::new(
        http,
        &config.fulfillment.api_base,
        &config.fulfillment.api_key,
    ));

    let app_state = AppState::new(&config, repos, payments, fulfillment, rate_limiter)?;
    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
