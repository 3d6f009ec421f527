use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::Debug;

/// Monetary amount in minor units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    pub currency: String,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub psp_reference: String,
    pub order_data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub psp_reference: String,
    pub order_data: String,
    pub amount: Option<Amount>,
    pub remaining_amount: Option<Amount>,
}

impl OrderResponse {
    /// An order is not fully paid while part of its amount remains.
    pub fn is_non_fully_paid(&self) -> bool {
        self.remaining_amount.as_ref().is_some_and(|a| a.value > 0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResult {
    pub balance: Option<Amount>,
    pub transaction_limit: Option<Amount>,
}

/// Payment method details as collected by the input component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentMethodDetails {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl PaymentMethodDetails {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentComponentData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<PaymentMethodDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Amount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<OrderRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_payment_method: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shopper_reference: Option<String>,
}

/// State shared by every payment component.
pub trait PaymentComponentState: Debug + Clone + Send + Sync + 'static {
    fn data(&self) -> &PaymentComponentData;
    fn is_input_valid(&self) -> bool;
    fn is_ready(&self) -> bool;

    fn is_valid(&self) -> bool {
        self.is_input_valid() && self.is_ready()
    }

    fn payment_method_type(&self) -> Option<&str> {
        self.data().payment_method.as_ref().map(|pm| pm.kind.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentState {
    pub data: PaymentComponentData,
    pub is_input_valid: bool,
    pub is_ready: bool,
}

impl PaymentComponentState for ComponentState {
    fn data(&self) -> &PaymentComponentData {
        &self.data
    }

    fn is_input_valid(&self) -> bool {
        self.is_input_valid
    }

    fn is_ready(&self) -> bool {
        self.is_ready
    }
}

/// Result of resolving an action: the body of the `/payments/details` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionComponentData {
    pub details: Value,
    pub payment_data: Option<String>,
}

impl ActionComponentData {
    pub fn new(details: Value, payment_data: Option<String>) -> Self {
        Self {
            details,
            payment_data,
        }
    }
}
