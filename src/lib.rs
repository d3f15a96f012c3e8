//! Order and payment services relaying order-created events over RabbitMQ.
//!
//! `service-order` takes orders over HTTP and publishes each one to a topic
//! exchange. `service-payment` consumes those events and records a payment
//! per message.

pub mod env;
pub mod http;
pub mod models;
pub mod rabbitmq;
pub mod shutdown;
pub mod store;
pub mod telemetry;
