use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use rabbit_relay::http::payment::{router, PaymentState};
use rabbit_relay::rabbitmq::record_delivery;
use rabbit_relay::store::{InMemoryPaymentStore, PaymentStore};

async fn get_json(app: &axum::Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_empty_payment_list() {
    let store: Arc<dyn PaymentStore> = Arc::new(InMemoryPaymentStore::new());
    let app = router(PaymentState { store });

    let (status, body) = get_json(&app, "/payments").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"payments": []}));
}

#[tokio::test]
async fn test_delivered_message_is_listed_as_paid() {
    let store: Arc<dyn PaymentStore> = Arc::new(InMemoryPaymentStore::new());
    let app = router(PaymentState {
        store: store.clone(),
    });

    record_delivery(store.as_ref(), b"order-42").await;

    let (status, body) = get_json(&app, "/payments").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"payments": [{"order": "order-42", "status": "paid"}]})
    );
}

#[tokio::test]
async fn test_json_bodies_and_duplicates_are_kept_verbatim() {
    let store: Arc<dyn PaymentStore> = Arc::new(InMemoryPaymentStore::new());
    let app = router(PaymentState {
        store: store.clone(),
    });

    let body = br#"{"id":"abc","customer_id":"cust_1"}"#;
    record_delivery(store.as_ref(), body).await;
    record_delivery(store.as_ref(), body).await;

    let (_, listed) = get_json(&app, "/payments").await;
    let payments = listed["payments"].as_array().unwrap();
    assert_eq!(payments.len(), 2);
    assert_eq!(payments[0]["order"], r#"{"id":"abc","customer_id":"cust_1"}"#);
    assert_eq!(payments[1], payments[0]);
}

#[tokio::test]
async fn test_health() {
    let store: Arc<dyn PaymentStore> = Arc::new(InMemoryPaymentStore::new());
    let app = router(PaymentState { store });

    let (status, body) = get_json(&app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
}
