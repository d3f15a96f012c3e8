use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

use rabbit_relay::env::PaymentServiceConfig;
use rabbit_relay::http::payment::{self, PaymentState};
use rabbit_relay::rabbitmq::PaymentConsumer;
use rabbit_relay::store::{InMemoryPaymentStore, PaymentStore};
use rabbit_relay::{shutdown, telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();

    let config =
        PaymentServiceConfig::load().context("Failed to load service-payment configuration")?;
    let store: Arc<dyn PaymentStore> = Arc::new(InMemoryPaymentStore::new());

    let (stop_consumer, stop_rx) = watch::channel(false);
    let consumer = PaymentConsumer::new(config.clone(), store.clone());
    let consumer_task = tokio::spawn(async move {
        if let Err(e) = consumer.run(stop_rx).await {
            error!(error = %e, "Payment consumer exited");
        }
    });

    let listener = TcpListener::bind(&config.http_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.http_addr))?;
    info!(addr = %config.http_addr, queue = %config.queue, "service-payment listening");

    axum::serve(listener, payment::router(PaymentState { store }))
        .with_graceful_shutdown(shutdown::signal())
        .await
        .context("service-payment HTTP server failed")?;

    // The consumer may already have exited; a closed channel is fine.
    let _ = stop_consumer.send(true);
    if let Err(e) = consumer_task.await {
        error!(error = %e, "Payment consumer task panicked");
    }

    info!("service-payment stopped");
    Ok(())
}
