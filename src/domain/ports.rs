//! Boundaries to the outside world: remote APIs and saved state.

use super::analytics::{AnalyticsSetupRequest, AnalyticsTrackRequest};
use super::payment::{ActionComponentData, OrderRequest, PaymentComponentData};
use super::session::{
    SessionBalanceResponse, SessionCancelOrderResponse, SessionDetailsResponse,
    SessionDisableTokenResponse, SessionModel, SessionOrderResponse, SessionPaymentsResponse,
    SessionSetupResponse,
};
use super::status::{StatusRequest, StatusResponse};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

#[async_trait]
pub trait StatusService: Send + Sync {
    async fn check_status(&self, request: StatusRequest) -> Result<StatusResponse>;
}

#[async_trait]
pub trait SessionService: Send + Sync {
    async fn payments(
        &self,
        session: &SessionModel,
        data: &PaymentComponentData,
    ) -> Result<SessionPaymentsResponse>;

    async fn details(
        &self,
        session: &SessionModel,
        data: &ActionComponentData,
    ) -> Result<SessionDetailsResponse>;

    async fn check_balance(
        &self,
        session: &SessionModel,
        data: &PaymentComponentData,
    ) -> Result<SessionBalanceResponse>;

    async fn create_order(&self, session: &SessionModel) -> Result<SessionOrderResponse>;

    async fn cancel_order(
        &self,
        session: &SessionModel,
        order: &OrderRequest,
    ) -> Result<SessionCancelOrderResponse>;

    async fn setup(
        &self,
        session: &SessionModel,
        order: Option<&OrderRequest>,
    ) -> Result<SessionSetupResponse>;

    async fn disable_token(
        &self,
        session: &SessionModel,
        stored_payment_method_id: &str,
    ) -> Result<SessionDisableTokenResponse>;
}

#[async_trait]
pub trait AnalyticsRemote: Send + Sync {
    /// Returns `None` when the backend declines to issue an attempt id.
    async fn fetch_checkout_attempt_id(
        &self,
        request: AnalyticsSetupRequest,
    ) -> Result<Option<String>>;

    async fn send_events(&self, checkout_attempt_id: &str, request: AnalyticsTrackRequest)
    -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeRedirectRequest {
    pub redirect_data: String,
    pub return_query_string: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeRedirectResponse {
    pub redirect_result: String,
}

#[async_trait]
pub trait NativeRedirectService: Send + Sync {
    async fn make_native_redirect(
        &self,
        request: NativeRedirectRequest,
    ) -> Result<NativeRedirectResponse>;
}

/// Key-value store that survives process recreation.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn put(&self, key: &str, value: Value) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

pub type StatusServiceRef = Arc<dyn StatusService>;
pub type SessionServiceRef = Arc<dyn SessionService>;
pub type AnalyticsRemoteRef = Arc<dyn AnalyticsRemote>;
pub type NativeRedirectServiceRef = Arc<dyn NativeRedirectService>;
pub type StateStoreRef = Arc<dyn StateStore>;

impl dyn StateStore {
    pub async fn get_as<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await? {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
        }
    }

    pub async fn put_as<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<()> {
        self.put(key, serde_json::to_value(value)?).await
    }
}
