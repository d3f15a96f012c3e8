//! HTTP surfaces of both services, built on `axum`.
//!
//! Endpoints:
//! - order service: GET /health, GET /orders, POST /orders
//! - payment service: GET /health, GET /payments
//!
//! All responses use Content-Type: application/json. Errors are
//! `{"error": "<message>"}`.

mod error;
pub mod order;
pub mod payment;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

pub use self::error::ApiError;

/// GET /health
pub(crate) async fn handle_health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> ApiError {
    ApiError::NotFound
}
