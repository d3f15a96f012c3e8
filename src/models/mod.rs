// src/models/mod.rs
mod order;
mod payment;

pub use order::{NewOrder, Order};
pub use payment::{PaymentRecord, PaymentStatus};
