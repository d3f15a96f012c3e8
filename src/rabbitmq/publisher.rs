// src/rabbitmq/publisher.rs
//! Outbox between the HTTP handlers and the broker.
//!
//! Handlers enqueue without waiting; one worker task publishes events in
//! order. Delivery is at-most-once and best-effort: a full outbox drops the
//! event, and so does a broker failure inside the sink. On shutdown the
//! worker stops accepting events and drains whatever is already queued.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::models::Order;

/// Destination for order-created events.
#[async_trait]
pub trait OrderEventSink: Send + Sync {
    /// Must absorb its own failures.
    async fn publish(&self, order: &Order);

    async fn close(&self);
}

#[derive(Clone)]
pub struct OrderEventPublisher {
    tx: mpsc::Sender<Order>,
}

impl OrderEventPublisher {
    /// Queues an event for the worker. Returns `false` if it was dropped.
    pub fn enqueue(&self, order: Order) -> bool {
        match self.tx.try_send(order) {
            Ok(()) => true,
            Err(TrySendError::Full(order)) => {
                warn!(order_id = %order.id, "Outbox full, order event dropped");
                false
            }
            Err(TrySendError::Closed(order)) => {
                warn!(order_id = %order.id, "Publisher stopped, order event dropped");
                false
            }
        }
    }
}

pub struct PublisherWorker {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
    sink: Arc<dyn OrderEventSink>,
}

pub fn spawn_publisher(
    sink: Arc<dyn OrderEventSink>,
    capacity: usize,
) -> (OrderEventPublisher, PublisherWorker) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let handle = tokio::spawn(run(sink.clone(), rx, shutdown_rx));

    (
        OrderEventPublisher { tx },
        PublisherWorker {
            shutdown: shutdown_tx,
            handle,
            sink,
        },
    )
}

async fn run(
    sink: Arc<dyn OrderEventSink>,
    mut rx: mpsc::Receiver<Order>,
    mut shutdown: oneshot::Receiver<()>,
) {
    debug!("Publisher worker started");

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some(order) => sink.publish(&order).await,
                None => break,
            },
            _ = &mut shutdown => {
                rx.close();
                let mut drained = 0usize;
                while let Some(order) = rx.recv().await {
                    sink.publish(&order).await;
                    drained += 1;
                }
                debug!(drained, "Outbox drained");
                break;
            }
        }
    }

    sink.close().await;
}

impl PublisherWorker {
    /// Stops the worker after it publishes everything already queued.
    ///
    /// Returns `false` if the drain did not finish within `drain_timeout`,
    /// in which case the remaining events are abandoned and the sink is
    /// closed here instead of by the worker.
    pub async fn shutdown(self, drain_timeout: Duration) -> bool {
        let PublisherWorker {
            shutdown,
            mut handle,
            sink,
        } = self;

        // The worker may already be gone; that is not an error here.
        let _ = shutdown.send(());

        match timeout(drain_timeout, &mut handle).await {
            Ok(Ok(())) => {
                info!("Publisher drained and stopped");
                true
            }
            Ok(Err(e)) => {
                error!(error = %e, "Publisher worker failed");
                false
            }
            Err(_) => {
                warn!(?drain_timeout, "Publisher did not drain in time, aborting");
                handle.abort();
                // Wait for the cancelled task so it releases anything it holds.
                let _ = handle.await;
                if timeout(drain_timeout, sink.close()).await.is_err() {
                    warn!("Timed out closing the event sink");
                }
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewOrder;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::{Mutex, Notify, Semaphore};

    #[derive(Default)]
    struct RecordingSink {
        published: Mutex<Vec<String>>,
        closed: AtomicBool,
    }

    #[async_trait]
    impl OrderEventSink for RecordingSink {
        async fn publish(&self, order: &Order) {
            self.published.lock().await.push(order.customer_id.clone());
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    /// Blocks every publish until the test hands out permits.
    struct GatedSink {
        started: Notify,
        gate: Semaphore,
        published: Mutex<usize>,
        closed: AtomicBool,
    }

    impl GatedSink {
        fn new() -> Self {
            GatedSink {
                started: Notify::new(),
                gate: Semaphore::new(0),
                published: Mutex::new(0),
                closed: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl OrderEventSink for GatedSink {
        async fn publish(&self, _order: &Order) {
            self.started.notify_one();
            self.gate.acquire().await.unwrap().forget();
            *self.published.lock().await += 1;
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn order_for(customer: &str) -> Order {
        Order::accept(NewOrder {
            customer_id: customer.to_string(),
            items: Vec::new(),
            total: 1.0,
        })
    }

    #[tokio::test]
    async fn shutdown_drains_queued_events_in_order() {
        let sink = Arc::new(RecordingSink::default());
        let (publisher, worker) = spawn_publisher(sink.clone(), 16);

        for customer in ["a", "b", "c", "d", "e"] {
            assert!(publisher.enqueue(order_for(customer)));
        }

        assert!(worker.shutdown(Duration::from_secs(5)).await);
        assert_eq!(*sink.published.lock().await, vec!["a", "b", "c", "d", "e"]);
        assert!(sink.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn enqueue_after_shutdown_is_dropped() {
        let sink = Arc::new(RecordingSink::default());
        let (publisher, worker) = spawn_publisher(sink.clone(), 4);

        assert!(worker.shutdown(Duration::from_secs(5)).await);
        assert!(!publisher.enqueue(order_for("late")));
        assert!(sink.published.lock().await.is_empty());
    }

    #[tokio::test]
    async fn full_outbox_drops_instead_of_blocking() {
        let sink = Arc::new(GatedSink::new());
        let (publisher, worker) = spawn_publisher(sink.clone(), 1);

        assert!(publisher.enqueue(order_for("in-flight")));
        sink.started.notified().await;

        assert!(publisher.enqueue(order_for("buffered")));
        assert!(!publisher.enqueue(order_for("overflow")));

        sink.gate.add_permits(10);
        assert!(worker.shutdown(Duration::from_secs(5)).await);
        assert_eq!(*sink.published.lock().await, 2);
    }

    #[tokio::test]
    async fn stuck_drain_is_aborted_and_sink_still_closed() {
        let sink = Arc::new(GatedSink::new());
        let (publisher, worker) = spawn_publisher(sink.clone(), 4);

        assert!(publisher.enqueue(order_for("stuck")));
        sink.started.notified().await;

        assert!(!worker.shutdown(Duration::from_millis(50)).await);
        assert_eq!(*sink.published.lock().await, 0);
        assert!(sink.closed.load(Ordering::SeqCst));
    }
}
