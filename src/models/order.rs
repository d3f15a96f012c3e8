// src/models/order.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Body accepted by `POST /orders`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NewOrder {
    pub customer_id: String,
    pub items: Vec<Map<String, Value>>,
    pub total: f64,
}

/// An accepted order, as stored and as published to the broker.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Order {
    pub id: String,
    pub customer_id: String,
    pub items: Vec<Map<String, Value>>,
    pub total: f64,
    pub created_at: DateTime<Utc>,
}

impl NewOrder {
    /// Returns a description of the first rule the order breaks, if any.
    pub fn validate(&self) -> Result<(), String> {
        if self.customer_id.trim().is_empty() {
            return Err("customer_id must not be empty".to_string());
        }
        Ok(())
    }
}

impl Order {
    /// Stamps a fresh id and the current UTC time onto a submission.
    pub fn accept(new_order: NewOrder) -> Self {
        Order {
            id: Uuid::new_v4().to_string(),
            customer_id: new_order.customer_id,
            items: new_order.items,
            total: new_order.total,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> NewOrder {
        serde_json::from_value(json!({
            "customer_id": "cust_1",
            "items": [{"sku": "X", "qty": 1}],
            "total": 10.0
        }))
        .unwrap()
    }

    #[test]
    fn accept_generates_distinct_ids() {
        let first = Order::accept(sample());
        let second = Order::accept(sample());

        assert!(!first.id.is_empty());
        assert_ne!(first.id, second.id);
        assert_eq!(first.customer_id, "cust_1");
        assert_eq!(first.items[0]["sku"], "X");
    }

    #[test]
    fn created_at_serializes_with_utc_designator() {
        let order = Order::accept(sample());
        let value = serde_json::to_value(&order).unwrap();

        let created_at = value["created_at"].as_str().unwrap();
        assert!(created_at.ends_with('Z'), "got {}", created_at);
        assert!(created_at.contains('T'));
    }

    #[test]
    fn blank_customer_id_is_invalid() {
        let mut order = sample();
        order.customer_id = "   ".to_string();

        assert!(order.validate().is_err());
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn items_must_be_objects() {
        let result = serde_json::from_value::<NewOrder>(json!({
            "customer_id": "cust_1",
            "items": ["X"],
            "total": 1.0
        }));

        assert!(result.is_err());
    }
}
