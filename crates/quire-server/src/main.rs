use std::sync::Arc;

use quire_server::{app_router, AppConfig, AppState, MergeEngine};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only load .env in development; production uses platform-native env injection.
    #[cfg(debug_assertions)]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("quire_server=info".parse()?),
        )
        .init();

    let config = Arc::new(AppConfig::from_env()?);
    tracing::info!("Starting quire-server with config: {:?}", config);

    let engine = MergeEngine::open(&config.database_path)?;
    for client in &config.clients {
        engine.ensure_client(&client.username, &client.token).await?;
    }

    let state = AppState::new(config, engine);
    let bind_addr = state.config.bind_addr.clone();
    let router = app_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("quire-server listening on {}", bind_addr);
    axum::serve(listener, router).await?;
    Ok(())
}
