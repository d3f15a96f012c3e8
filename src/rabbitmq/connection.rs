// src/rabbitmq/connection.rs
use async_trait::async_trait;
use lapin::{
    options::*, types::FieldTable, BasicProperties, Channel, Connection, ConnectionProperties,
    ExchangeKind,
};
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::errors::Result;
use super::publisher::OrderEventSink;
use crate::env::BrokerConfig;
use crate::models::Order;

struct BrokerHandles {
    connection: Connection,
    channel: Channel,
}

impl BrokerHandles {
    fn is_live(&self) -> bool {
        self.connection.status().connected() && self.channel.status().connected()
    }
}

/// Owns the order service's single connection, channel and exchange.
///
/// Every method is best-effort: failures are logged and the cache is
/// cleared so the next call starts over. Nothing is returned to callers.
pub struct ConnectionManager {
    config: BrokerConfig,
    handles: RwLock<Option<BrokerHandles>>,
}

impl ConnectionManager {
    pub fn new(config: BrokerConfig) -> Self {
        ConnectionManager {
            config,
            handles: RwLock::new(None),
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.handles
            .read()
            .await
            .as_ref()
            .map_or(false, BrokerHandles::is_live)
    }

    pub async fn ensure_connected(&self) {
        if self.is_connected().await {
            return;
        }

        let mut guard = self.handles.write().await;
        // Another caller may have connected while we waited for the lock.
        if guard.as_ref().map_or(false, BrokerHandles::is_live) {
            return;
        }

        info!(url = %redact_url(&self.config.url), "Connecting to RabbitMQ");
        let attempt = match timeout(self.config.connect_timeout(), self.open()).await {
            Ok(result) => result,
            Err(elapsed) => Err(elapsed.into()),
        };

        match attempt {
            Ok(handles) => {
                info!(exchange = %self.config.exchange, "Connected to RabbitMQ");
                *guard = Some(handles);
            }
            Err(e) => {
                error!(error = %e, "Failed to connect to RabbitMQ");
                *guard = None;
            }
        }
    }

    async fn open(&self) -> Result<BrokerHandles> {
        let connection = Connection::connect(&self.config.url, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;

        // The default exchange ("") is predeclared and cannot be redeclared.
        if !self.config.exchange.is_empty() {
            channel
                .exchange_declare(
                    &self.config.exchange,
                    ExchangeKind::Topic,
                    ExchangeDeclareOptions {
                        durable: true,
                        ..ExchangeDeclareOptions::default()
                    },
                    FieldTable::default(),
                )
                .await?;
        }

        Ok(BrokerHandles { connection, channel })
    }

    pub async fn publish(&self, order: &Order) {
        self.ensure_connected().await;

        let channel = match self.handles.read().await.as_ref() {
            Some(handles) => handles.channel.clone(),
            None => {
                warn!(order_id = %order.id, "RabbitMQ unavailable, order event not published");
                return;
            }
        };

        match self.send(&channel, order).await {
            Ok(()) => info!(
                order_id = %order.id,
                exchange = %self.config.exchange,
                routing_key = %self.config.routing_key,
                "Published order event"
            ),
            Err(e) => {
                error!(order_id = %order.id, error = %e, "Failed to publish order event");
                self.invalidate_if_dead().await;
            }
        }
    }

    async fn send(&self, channel: &Channel, order: &Order) -> Result<()> {
        let payload = encode_event(order)?;
        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_message_id(order.id.clone().into())
            .with_timestamp(order.created_at.timestamp() as u64);

        channel
            .basic_publish(
                &self.config.exchange,
                &self.config.routing_key,
                BasicPublishOptions::default(),
                &payload,
                properties,
            )
            .await?
            .await?;

        Ok(())
    }

    async fn invalidate_if_dead(&self) {
        let mut guard = self.handles.write().await;
        if guard.as_ref().map_or(false, |handles| !handles.is_live()) {
            debug!("Dropping dead RabbitMQ handles");
            *guard = None;
        }
    }

    pub async fn close(&self) {
        let handles = self.handles.write().await.take();
        match handles {
            Some(handles) => match handles.connection.close(0, "Closing order publisher").await {
                Ok(()) => info!("RabbitMQ connection closed"),
                Err(e) => error!(error = %e, "Error closing RabbitMQ connection"),
            },
            None => debug!("No RabbitMQ connection to close"),
        }
    }
}

#[async_trait]
impl OrderEventSink for ConnectionManager {
    async fn publish(&self, order: &Order) {
        ConnectionManager::publish(self, order).await
    }

    async fn close(&self) {
        ConnectionManager::close(self).await
    }
}

/// JSON body of an order-created event.
pub fn encode_event(order: &Order) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(order)?)
}

/// Hides the userinfo part of an AMQP URL for logging.
pub fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}***{}", &url[..scheme_end + 3], &url[at..])
        }
        _ => url.to_string(),
    }
}
