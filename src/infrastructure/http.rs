//! JSON-over-HTTP adapter for the checkout backend.
//!
//! [`HttpCheckoutApi`] implements every remote port of the engine: status
//! polling, the session endpoints, analytics and native redirect. Every
//! request is authenticated with the client key as a query parameter.

use crate::domain::analytics::{AnalyticsSetupRequest, AnalyticsTrackRequest};
use crate::domain::payment::{ActionComponentData, OrderRequest, PaymentComponentData};
use crate::domain::ports::{
    AnalyticsRemote, NativeRedirectRequest, NativeRedirectResponse, NativeRedirectService,
    SessionService, StatusService,
};
use crate::domain::session::{
    SessionBalanceResponse, SessionCancelOrderResponse, SessionDetailsResponse,
    SessionDisableTokenResponse, SessionModel, SessionOrderResponse, SessionPaymentsResponse,
    SessionSetupResponse,
};
use crate::domain::status::{StatusRequest, StatusResponse};
use crate::error::{CheckoutError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

#[derive(Clone, Debug)]
pub struct HttpCheckoutApi {
    base_url: Url,
    client_key: String,
    client: Client,
    timeout: Option<Duration>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyticsSetupResponse {
    checkout_attempt_id: Option<String>,
}

impl HttpCheckoutApi {
    pub fn try_new(base_url: Url, client_key: impl Into<String>) -> Result<Self> {
        if base_url.cannot_be_a_base() {
            return Err(CheckoutError::checkout(format!(
                "Checkout base URL cannot be a base: {base_url}"
            )));
        }
        Ok(Self {
            base_url,
            client_key: client_key.into(),
            client: Client::new(),
            timeout: None,
        })
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let mut this = self.clone();
        this.timeout = Some(timeout);
        this
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolves `path` against the base URL and appends the client key.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        let mut url = self.base_url.join(path)?;
        url.query_pairs_mut().append_pair("clientKey", &self.client_key);
        Ok(url)
    }

    fn session_endpoint(&self, session: &SessionModel, suffix: &str) -> Result<Url> {
        self.endpoint(&format!("v1/sessions/{}{}", session.id, suffix))
    }

    async fn post_json<T, R>(&self, url: Url, context: &'static str, payload: &T) -> Result<R>
    where
        T: serde::Serialize + ?Sized,
        R: DeserializeOwned,
    {
        debug!(context, url = %url, "Sending request");
        let mut req = self.client.post(url).json(payload);
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let response = req.send().await?;

        let status = response.status();
        if status.is_success() {
            Ok(response.json::<R>().await?)
        } else {
            let body = response.text().await?;
            Err(CheckoutError::component(format!(
                "Unexpected HTTP status {status}: {context}: {body}"
            )))
        }
    }
}

/// Merges the current `sessionData` into a request body.
fn session_body<T: serde::Serialize>(session: &SessionModel, payload: &T) -> Result<Value> {
    let mut body = serde_json::to_value(payload)?;
    match &mut body {
        Value::Object(map) => {
            map.insert("sessionData".to_owned(), json!(session.session_data));
            Ok(body)
        }
        _ => Ok(json!({ "sessionData": session.session_data })),
    }
}

#[async_trait]
impl StatusService for HttpCheckoutApi {
    #[instrument(skip_all, err)]
    async fn check_status(&self, request: StatusRequest) -> Result<StatusResponse> {
        let url = self.endpoint("services/PaymentInitiation/v1/status")?;
        self.post_json(url, "POST /status", &request).await
    }
}

#[async_trait]
impl SessionService for HttpCheckoutApi {
    #[instrument(skip_all, fields(session_id = %session.id), err)]
    async fn payments(
        &self,
        session: &SessionModel,
        data: &PaymentComponentData,
    ) -> Result<SessionPaymentsResponse> {
        let url = self.session_endpoint(session, "/payments")?;
        self.post_json(url, "POST /sessions/payments", &session_body(session, data)?)
            .await
    }

    #[instrument(skip_all, fields(session_id = %session.id), err)]
    async fn details(
        &self,
        session: &SessionModel,
        data: &ActionComponentData,
    ) -> Result<SessionDetailsResponse> {
        let url = self.session_endpoint(session, "/paymentDetails")?;
        self.post_json(url, "POST /sessions/paymentDetails", &session_body(session, data)?)
            .await
    }

    #[instrument(skip_all, fields(session_id = %session.id), err)]
    async fn check_balance(
        &self,
        session: &SessionModel,
        data: &PaymentComponentData,
    ) -> Result<SessionBalanceResponse> {
        let url = self.session_endpoint(session, "/paymentMethodBalance")?;
        self.post_json(
            url,
            "POST /sessions/paymentMethodBalance",
            &session_body(session, data)?,
        )
        .await
    }

    #[instrument(skip_all, fields(session_id = %session.id), err)]
    async fn create_order(&self, session: &SessionModel) -> Result<SessionOrderResponse> {
        let url = self.session_endpoint(session, "/orders")?;
        self.post_json(url, "POST /sessions/orders", &session_body(session, &json!({}))?)
            .await
    }

    #[instrument(skip_all, fields(session_id = %session.id), err)]
    async fn cancel_order(
        &self,
        session: &SessionModel,
        order: &OrderRequest,
    ) -> Result<SessionCancelOrderResponse> {
        let url = self.session_endpoint(session, "/orders/cancel")?;
        let body = session_body(session, &json!({ "order": order }))?;
        self.post_json(url, "POST /sessions/orders/cancel", &body)
            .await
    }

    #[instrument(skip_all, fields(session_id = %session.id), err)]
    async fn setup(
        &self,
        session: &SessionModel,
        order: Option<&OrderRequest>,
    ) -> Result<SessionSetupResponse> {
        let url = self.session_endpoint(session, "/setup")?;
        let body = session_body(session, &json!({ "order": order }))?;
        self.post_json(url, "POST /sessions/setup", &body).await
    }

    #[instrument(skip_all, fields(session_id = %session.id), err)]
    async fn disable_token(
        &self,
        session: &SessionModel,
        stored_payment_method_id: &str,
    ) -> Result<SessionDisableTokenResponse> {
        let url = self.session_endpoint(session, "/disableToken")?;
        let body = session_body(
            session,
            &json!({ "storedPaymentMethodId": stored_payment_method_id }),
        )?;
        self.post_json(url, "POST /sessions/disableToken", &body)
            .await
    }
}

#[async_trait]
impl AnalyticsRemote for HttpCheckoutApi {
    #[instrument(skip_all, err)]
    async fn fetch_checkout_attempt_id(
        &self,
        request: AnalyticsSetupRequest,
    ) -> Result<Option<String>> {
        let url = self.endpoint("v3/analytics")?;
        let response: AnalyticsSetupResponse =
            self.post_json(url, "POST /analytics", &request).await?;
        Ok(response.checkout_attempt_id)
    }

    #[instrument(skip_all, fields(events = request.len()), err)]
    async fn send_events(
        &self,
        checkout_attempt_id: &str,
        request: AnalyticsTrackRequest,
    ) -> Result<()> {
        let url = self.endpoint(&format!("v3/analytics/{checkout_attempt_id}"))?;
        let _: Value = self
            .post_json(url, "POST /analytics/{attemptId}", &request)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl NativeRedirectService for HttpCheckoutApi {
    #[instrument(skip_all, err)]
    async fn make_native_redirect(
        &self,
        request: NativeRedirectRequest,
    ) -> Result<NativeRedirectResponse> {
        let url = self.endpoint("v1/nativeRedirect/redirectResult")?;
        self.post_json(url, "POST /nativeRedirect/redirectResult", &request)
            .await
    }
}
