use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tower_governor::governor::GovernorConfigBuilder;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use access_gate::{build_router, AppState, Config};

/// How often idle sequencing marks are dropped, and after how long.
const SWEEP_EVERY: Duration = Duration::from_secs(300);
const SEQUENCE_MAX_IDLE: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    tracing::info!("✅ Configuration loaded successfully");

    let state = AppState::new(&config)
        .await
        .context("Failed to initialize application state")?;
    tracing::info!(
        admin_guard = ?config.admin_guard,
        courses = state.catalog.courses().len(),
        "✅ AppState initialized"
    );

    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(50)
            .burst_size(200)
            .use_headers()
            .finish()
            .context("Invalid rate limiter configuration")?,
    );

    let app = build_router(state.clone()).layer(tower_governor::GovernorLayer::new(governor_conf));

    let sweep_state = state.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(SWEEP_EVERY).await;
            let dropped = sweep_state.sequencer.sweep(SEQUENCE_MAX_IDLE);
            if dropped > 0 {
                tracing::debug!("🧹 Dropped {} idle evaluation sequences", dropped);
            }
        }
    });

    let addr = config.bind_addr;
    tracing::info!("🚀 Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
