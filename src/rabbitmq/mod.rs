// src/rabbitmq/mod.rs
// RabbitMQ plumbing for both services

pub mod connection;
pub mod consumer;
pub mod errors;
pub mod publisher;

pub use connection::ConnectionManager;
pub use consumer::{record_delivery, PaymentConsumer};
pub use errors::{RabbitMQError, Result};
pub use publisher::{spawn_publisher, OrderEventPublisher, OrderEventSink, PublisherWorker};

#[cfg(test)]
pub(crate) mod testing {
    use tokio::net::TcpListener;

    /// A TCP endpoint that accepts connections and never answers the AMQP handshake.
    pub(crate) async fn silent_broker() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        format!("amqp://guest:guest@{}/%2f", addr)
    }
}
