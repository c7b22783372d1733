use super::checkout::Receiver;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Payment methods in the vocabulary accepted by the order endpoint.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    CreditCard,
    Momo,
    /// A method this client does not know, or none reported. Never sent.
    #[default]
    #[serde(other)]
    Unknown,
}

impl PaymentMethod {
    /// Settled through a gateway redirect rather than at order creation.
    pub fn requires_gateway(&self) -> bool {
        matches!(self, PaymentMethod::Momo)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: String,
    pub name: String,
    pub variant: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Body of `POST /orders`.
///
/// `discount` is the client's estimate; the server recomputes it from
/// `coupon_code` and is the source of truth for `total_amount`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub customer: Receiver,
    pub items: Vec<OrderItem>,
    pub shipping_fee: Decimal,
    pub payment_method: PaymentMethod,
    pub notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<String>,
    pub discount: Decimal,
    pub total_amount: Decimal,
}

/// Order as read back from the server after creation.
///
/// Only `id` is required. The order already exists once this is decoded,
/// so anything else the server leaves out must not fail the submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    #[serde(default)]
    pub total_amount: Option<Decimal>,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub payment_status: String,
}
