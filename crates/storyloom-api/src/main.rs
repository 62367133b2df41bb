//! Storyloom gateway server entry point.

use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use storyloom_core::clock::SystemClock;
use storyloom_rounds::coordinator::Coordinator;
use storyloom_store::{PgLobbyRepository, schema};

use storyloom_api::config::GatewayConfig;
use storyloom_api::connections::{ConnectionRegistry, WsNotifier};
use storyloom_api::routes;
use storyloom_api::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting Storyloom gateway");

    let config = GatewayConfig::from_env()?;

    // Create database connection pool and make sure the schema exists.
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    schema::ensure_schema(&pool).await?;

    // Wire the coordinator to the live store and the socket fan-out.
    let registry = Arc::new(ConnectionRegistry::new());
    let notifier = Arc::new(WsNotifier::new(Arc::clone(&registry)));
    let repository = Arc::new(PgLobbyRepository::new(pool));
    let coordinator = Coordinator::new(
        repository,
        Arc::new(SystemClock),
        notifier,
        config.coordinator_config(),
    );

    // Rehydrate in-flight rounds and sweep idle users before serving.
    coordinator.recover().await?;

    let app_state = AppState::new(coordinator, registry);

    // Build router.
    let app = Router::new()
        .merge(routes::health::router())
        .merge(routes::ws::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Start server.
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| format!("invalid HOST:PORT combination: {e}"))?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app).await?;

    Ok(())
}
