// src/models/payment.rs
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Paid,
}

/// One consumed message. `order` is the raw body, not parsed.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct PaymentRecord {
    pub order: String,
    pub status: PaymentStatus,
}

impl PaymentRecord {
    /// Decodes a delivery body as text; invalid UTF-8 is replaced, never rejected.
    pub fn paid_from_body(body: &[u8]) -> Self {
        PaymentRecord {
            order: String::from_utf8_lossy(body).into_owned(),
            status: PaymentStatus::Paid,
        }
    }
}
