use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use rabbit_relay::env::OrderServiceConfig;
use rabbit_relay::http::order::{self, OrderState};
use rabbit_relay::rabbitmq::{spawn_publisher, ConnectionManager};
use rabbit_relay::store::InMemoryOrderStore;
use rabbit_relay::{shutdown, telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();

    let config = OrderServiceConfig::load().context("Failed to load service-order configuration")?;

    let connection = Arc::new(ConnectionManager::new(config.broker.clone()));
    // Best-effort: the service starts without a broker and retries on publish.
    connection.ensure_connected().await;

    let (events, publisher) = spawn_publisher(connection, config.outbox_capacity);
    let app = order::router(OrderState {
        store: Arc::new(InMemoryOrderStore::new()),
        events,
    });

    let listener = TcpListener::bind(&config.http_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.http_addr))?;
    info!(addr = %config.http_addr, "service-order listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown::signal())
        .await
        .context("service-order HTTP server failed")?;

    publisher.shutdown(config.drain_timeout()).await;
    info!("service-order stopped");
    Ok(())
}
