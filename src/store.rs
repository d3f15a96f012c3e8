// src/store.rs
//! Append-only, process-local stores. Nothing here survives a restart.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::models::{Order, PaymentRecord};

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn append(&self, order: Order);

    /// All orders in insertion order.
    async fn list(&self) -> Vec<Order>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn append(&self, record: PaymentRecord);

    async fn list(&self) -> Vec<PaymentRecord>;
}

#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    orders: RwLock<Vec<Order>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn append(&self, order: Order) {
        self.orders.write().await.push(order);
    }

    async fn list(&self) -> Vec<Order> {
        self.orders.read().await.clone()
    }
}

#[derive(Debug, Default)]
pub struct InMemoryPaymentStore {
    payments: RwLock<Vec<PaymentRecord>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn append(&self, record: PaymentRecord) {
        self.payments.write().await.push(record);
    }

    async fn list(&self) -> Vec<PaymentRecord> {
        self.payments.read().await.clone()
    }
}
