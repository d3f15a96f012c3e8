//! Order service routes.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use tower_http::trace::TraceLayer;
use tracing::info;

use super::{handle_health, handle_not_found, ApiError};
use crate::models::{NewOrder, Order};
use crate::rabbitmq::OrderEventPublisher;
use crate::store::OrderStore;

#[derive(Clone)]
pub struct OrderState {
    pub store: Arc<dyn OrderStore>,
    pub events: OrderEventPublisher,
}

pub fn router(state: OrderState) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/orders", get(handle_list_orders).post(handle_create_order))
        .fallback(handle_not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /orders
async fn handle_list_orders(State(state): State<OrderState>) -> Json<Vec<Order>> {
    Json(state.store.list().await)
}

/// POST /orders
///
/// The order is stored before the response is sent. The broker event is
/// only queued; its outcome never reaches the client.
async fn handle_create_order(
    State(state): State<OrderState>,
    payload: Result<Json<NewOrder>, JsonRejection>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let Json(new_order) = payload?;
    new_order.validate().map_err(ApiError::Validation)?;

    let order = Order::accept(new_order);
    state.store.append(order.clone()).await;
    info!(order_id = %order.id, customer_id = %order.customer_id, "Order created");

    state.events.enqueue(order.clone());

    Ok((StatusCode::CREATED, Json(order)))
}
