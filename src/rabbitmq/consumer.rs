// src/rabbitmq/consumer.rs
use futures_lite::StreamExt;
use lapin::{options::*, types::FieldTable, Channel, Connection, ConnectionProperties, ExchangeKind};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::connection::redact_url;
use super::errors::{RabbitMQError, Result};
use crate::env::PaymentServiceConfig;
use crate::models::PaymentRecord;
use crate::store::PaymentStore;

const MAX_RECONNECT_DELAY_MS: u64 = 30_000;

enum ConsumeExit {
    Shutdown,
    StreamEnded,
}

/// How one connect-declare-consume session ended.
enum SessionEnd {
    Shutdown,
    Failed {
        error: RabbitMQError,
        /// The session got as far as consuming, so the broker was healthy.
        was_consuming: bool,
    },
}

/// Exponential backoff with jitter, shared by every failed session.
struct Backoff {
    max_attempts: u32,
    initial_delay_ms: u64,
    attempts: u32,
    delay_ms: u64,
}

impl Backoff {
    /// `max_attempts == 0` retries forever.
    fn new(max_attempts: u32, initial_delay_ms: u64) -> Self {
        Backoff {
            max_attempts,
            initial_delay_ms,
            attempts: 0,
            delay_ms: initial_delay_ms,
        }
    }

    /// Counts a failure. Returns the wait before the next try, or `None` once exhausted.
    fn next_delay(&mut self) -> Option<Duration> {
        self.attempts += 1;
        if self.max_attempts != 0 && self.attempts >= self.max_attempts {
            return None;
        }

        let wait = Duration::from_millis(jittered(self.delay_ms));
        self.delay_ms = std::cmp::min(self.delay_ms.saturating_mul(2), MAX_RECONNECT_DELAY_MS);
        Some(wait)
    }

    fn reset(&mut self) {
        self.attempts = 0;
        self.delay_ms = self.initial_delay_ms;
    }

    fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Consumes order events and records a payment for each one.
///
/// Runs as its own task next to the HTTP server. Deliveries are
/// auto-acknowledged, so a message is consumed as soon as the broker hands
/// it over.
pub struct PaymentConsumer {
    config: PaymentServiceConfig,
    store: Arc<dyn PaymentStore>,
}

/// Records one delivery body as a paid payment.
pub async fn record_delivery(store: &dyn PaymentStore, body: &[u8]) -> PaymentRecord {
    let record = PaymentRecord::paid_from_body(body);
    store.append(record.clone()).await;
    info!(order = %record.order, "Processed payment for order");
    record
}

/// Runs sessions until shutdown, backing off after every failure.
///
/// A session that reached the consuming state resets the backoff first, so
/// only consecutive failures count toward the attempt limit.
async fn supervise<F, Fut>(
    mut backoff: Backoff,
    mut shutdown: watch::Receiver<bool>,
    mut session: F,
) -> Result<()>
where
    F: FnMut(watch::Receiver<bool>) -> Fut,
    Fut: Future<Output = SessionEnd>,
{
    loop {
        if *shutdown.borrow() {
            return Ok(());
        }

        let (error, was_consuming) = match session(shutdown.clone()).await {
            SessionEnd::Shutdown => return Ok(()),
            SessionEnd::Failed {
                error,
                was_consuming,
            } => (error, was_consuming),
        };

        if was_consuming {
            backoff.reset();
        }

        let Some(wait) = backoff.next_delay() else {
            error!(attempts = backoff.attempts(), error = %error, "Max reconnection attempts reached. Giving up.");
            return Err(RabbitMQError::ReconnectExhausted(backoff.attempts()));
        };

        error!(
            attempt = backoff.attempts(),
            max_attempts = backoff.max_attempts,
            error = %error,
            "RabbitMQ session failed"
        );
        info!("Waiting {}ms before next reconnect attempt", wait.as_millis());

        tokio::select! {
            _ = sleep(wait) => {}
            _ = shutdown.changed() => return Ok(()),
        }
    }
}

impl PaymentConsumer {
    pub fn new(config: PaymentServiceConfig, store: Arc<dyn PaymentStore>) -> Self {
        PaymentConsumer { config, store }
    }

    /// Consumes until `shutdown` flips or retries run out.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let backoff = Backoff::new(self.config.reconnect_attempts, self.config.reconnect_delay_ms);
        supervise(backoff, shutdown, move |stop| self.session(stop)).await
    }

    async fn session(&self, mut shutdown: watch::Receiver<bool>) -> SessionEnd {
        let connection = tokio::select! {
            result = self.connect() => match result {
                Ok(connection) => connection,
                Err(error) => return SessionEnd::Failed { error, was_consuming: false },
            },
            _ = shutdown.changed() => return SessionEnd::Shutdown,
        };

        let mut was_consuming = false;
        let outcome = self.consume(&connection, &mut shutdown, &mut was_consuming).await;

        if let Err(e) = connection.close(0, "Closing payment consumer").await {
            debug!(error = %e, "Error closing RabbitMQ connection");
        }

        match outcome {
            Ok(ConsumeExit::Shutdown) => {
                info!(queue = %self.config.queue, "Payment consumer stopped");
                SessionEnd::Shutdown
            }
            Ok(ConsumeExit::StreamEnded) => {
                warn!(queue = %self.config.queue, "Consumer stream ended");
                SessionEnd::Failed {
                    error: RabbitMQError::ConsumeError("consumer stream ended".to_string()),
                    was_consuming,
                }
            }
            Err(error) => SessionEnd::Failed {
                error,
                was_consuming,
            },
        }
    }

    /// One connection attempt, bounded by the connect timeout.
    async fn connect(&self) -> Result<Connection> {
        info!(url = %redact_url(&self.config.broker.url), "Attempting to connect to RabbitMQ");

        let connection = timeout(
            self.config.broker.connect_timeout(),
            Connection::connect(&self.config.broker.url, ConnectionProperties::default()),
        )
        .await??;

        info!("Successfully connected to RabbitMQ");
        Ok(connection)
    }

    async fn declare_topology(&self, channel: &Channel) -> Result<()> {
        let queue = &self.config.queue;

        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: self.config.queue_durable,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;
        info!(queue = %queue, durable = self.config.queue_durable, "Queue declared");

        if let Some((exchange, routing_key)) = self.config.binding() {
            channel
                .exchange_declare(
                    exchange,
                    ExchangeKind::Topic,
                    ExchangeDeclareOptions {
                        durable: true,
                        ..ExchangeDeclareOptions::default()
                    },
                    FieldTable::default(),
                )
                .await?;

            channel
                .queue_bind(
                    queue,
                    exchange,
                    routing_key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await?;
            info!(queue = %queue, exchange, routing_key, "Queue bound to exchange");
        }

        Ok(())
    }

    async fn consume(
        &self,
        connection: &Connection,
        shutdown: &mut watch::Receiver<bool>,
        was_consuming: &mut bool,
    ) -> Result<ConsumeExit> {
        let channel = connection.create_channel().await?;
        self.declare_topology(&channel).await?;

        let consumer_tag = format!("service-payment-{}", &Uuid::new_v4().to_string()[..8]);
        let mut consumer = channel
            .basic_consume(
                &self.config.queue,
                &consumer_tag,
                BasicConsumeOptions {
                    no_ack: true,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await?;

        *was_consuming = true;
        info!(queue = %self.config.queue, consumer_tag = %consumer_tag, "Consuming queue");

        loop {
            tokio::select! {
                delivery = consumer.next() => match delivery {
                    Some(Ok(delivery)) => {
                        record_delivery(self.store.as_ref(), &delivery.data).await;
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "Error receiving message");
                        if !channel.status().connected() {
                            return Ok(ConsumeExit::StreamEnded);
                        }
                    }
                    None => return Ok(ConsumeExit::StreamEnded),
                },
                _ = shutdown.changed() => return Ok(ConsumeExit::Shutdown),
            }
        }
    }
}

/// Adds +/-15% jitter to a backoff delay.
fn jittered(delay_ms: u64) -> u64 {
    let jitter = (rand::random::<f64>() * 0.3 - 0.15) * delay_ms as f64;
    (delay_ms as f64 + jitter).max(0.0) as u64
}
