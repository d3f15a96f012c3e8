//! Payment service routes.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use super::{handle_health, handle_not_found};
use crate::models::PaymentRecord;
use crate::store::PaymentStore;

#[derive(Clone)]
pub struct PaymentState {
    pub store: Arc<dyn PaymentStore>,
}

#[derive(Debug, Serialize)]
pub struct PaymentList {
    pub payments: Vec<PaymentRecord>,
}

pub fn router(state: PaymentState) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/payments", get(handle_list_payments))
        .fallback(handle_not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /payments
async fn handle_list_payments(State(state): State<PaymentState>) -> Json<PaymentList> {
    Json(PaymentList {
        payments: state.store.list().await,
    })
}
