use super::action::Action;
use super::payment::{Amount, OrderResponse};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A server-side checkout session. `session_data` rotates with every response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionModel {
    pub id: String,
    pub session_data: Option<String>,
}

impl SessionModel {
    pub fn new(id: impl Into<String>, session_data: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            session_data: Some(session_data.into()),
        }
    }
}

/// Terminal outcome of a session payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPaymentResult {
    pub session_id: String,
    pub session_result: Option<String>,
    pub session_data: Option<String>,
    pub result_code: Option<String>,
    pub order: Option<OrderResponse>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPaymentsResponse {
    pub session_data: String,
    pub session_result: Option<String>,
    pub status: Option<String>,
    pub result_code: Option<String>,
    pub action: Option<Action>,
    pub order: Option<OrderResponse>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDetailsResponse {
    pub session_data: String,
    pub session_result: Option<String>,
    pub status: Option<String>,
    pub result_code: Option<String>,
    pub action: Option<Action>,
    pub order: Option<OrderResponse>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionBalanceResponse {
    pub session_data: String,
    pub balance: Option<Amount>,
    pub transaction_limit: Option<Amount>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOrderResponse {
    pub session_data: String,
    pub psp_reference: String,
    pub order_data: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCancelOrderResponse {
    pub session_data: String,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSetupResponse {
    pub id: String,
    pub session_data: String,
    pub payment_methods: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDisableTokenResponse {
    pub session_data: String,
}
