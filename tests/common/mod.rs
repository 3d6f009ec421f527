#![allow(dead_code)]

use async_trait::async_trait;
use checkout_engine::application::actions::DelegateContext;
use checkout_engine::application::status_repository::StatusRepository;
use checkout_engine::domain::analytics::{AnalyticsSetupRequest, AnalyticsTrackRequest};
use checkout_engine::domain::payment::{ActionComponentData, OrderRequest, PaymentComponentData};
use checkout_engine::domain::ports::{AnalyticsRemote, SessionService, StatusService};
use checkout_engine::domain::session::{
    SessionBalanceResponse, SessionCancelOrderResponse, SessionDetailsResponse,
    SessionDisableTokenResponse, SessionModel, SessionOrderResponse, SessionPaymentsResponse,
    SessionSetupResponse,
};
use checkout_engine::domain::status::{StatusRequest, StatusResponse};
use checkout_engine::error::{CheckoutError, Result};
use checkout_engine::infrastructure::in_memory::InMemoryStateStore;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Status backend answering with a fixed script, then `pending` forever.
#[derive(Default)]
pub struct ScriptedStatus {
    responses: Mutex<VecDeque<StatusResponse>>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedStatus {
    pub fn new(codes: &[(&str, Option<&str>)]) -> Arc<Self> {
        let status = Self::default();
        status.responses.lock().unwrap().extend(
            codes
                .iter()
                .map(|(code, payload)| StatusResponse::new(*code, *payload)),
        );
        Arc::new(status)
    }

    pub fn calls_for(&self, payment_data: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|pd| *pd == payment_data)
            .count()
    }
}

#[async_trait]
impl StatusService for ScriptedStatus {
    async fn check_status(&self, request: StatusRequest) -> Result<StatusResponse> {
        self.requests.lock().unwrap().push(request.payment_data);
        Ok(self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| StatusResponse::new("pending", None)))
    }
}

pub fn delegate_context(status: Arc<ScriptedStatus>) -> DelegateContext {
    DelegateContext::new(
        Arc::new(InMemoryStateStore::new()),
        StatusRepository::new(status),
    )
}

/// Session backend returning queued `/payments` responses.
#[derive(Default)]
pub struct FakeSessions {
    calls: AtomicUsize,
    offline: bool,
    payments: Mutex<VecDeque<SessionPaymentsResponse>>,
}

impl FakeSessions {
    pub fn with_payments(responses: Vec<SessionPaymentsResponse>) -> Arc<Self> {
        let sessions = Self::default();
        sessions.payments.lock().unwrap().extend(responses);
        Arc::new(sessions)
    }

    /// Fails every payments and details call.
    pub fn offline() -> Arc<Self> {
        Arc::new(Self {
            offline: true,
            ..Default::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn count(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn payments_response(session_data: &str, result_code: &str) -> SessionPaymentsResponse {
    SessionPaymentsResponse {
        session_data: session_data.into(),
        session_result: Some("result".into()),
        status: None,
        result_code: Some(result_code.into()),
        action: None,
        order: None,
    }
}

#[async_trait]
impl SessionService for FakeSessions {
    async fn payments(
        &self,
        _session: &SessionModel,
        _data: &PaymentComponentData,
    ) -> Result<SessionPaymentsResponse> {
        self.count();
        if self.offline {
            return Err(CheckoutError::component("payments unavailable"));
        }
        self.payments
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| CheckoutError::component("no scripted payments response"))
    }

    async fn details(
        &self,
        _session: &SessionModel,
        _data: &ActionComponentData,
    ) -> Result<SessionDetailsResponse> {
        self.count();
        if self.offline {
            return Err(CheckoutError::component("details unavailable"));
        }
        Ok(SessionDetailsResponse {
            session_data: "sd-details".into(),
            session_result: Some("details-result".into()),
            status: None,
            result_code: Some("Authorised".into()),
            action: None,
            order: None,
        })
    }

    async fn check_balance(
        &self,
        _session: &SessionModel,
        _data: &PaymentComponentData,
    ) -> Result<SessionBalanceResponse> {
        self.count();
        Err(CheckoutError::component("balance unavailable"))
    }

    async fn create_order(&self, _session: &SessionModel) -> Result<SessionOrderResponse> {
        self.count();
        Err(CheckoutError::component("orders unavailable"))
    }

    async fn cancel_order(
        &self,
        _session: &SessionModel,
        _order: &OrderRequest,
    ) -> Result<SessionCancelOrderResponse> {
        self.count();
        Err(CheckoutError::component("orders unavailable"))
    }

    async fn setup(
        &self,
        _session: &SessionModel,
        _order: Option<&OrderRequest>,
    ) -> Result<SessionSetupResponse> {
        self.count();
        Err(CheckoutError::component("setup unavailable"))
    }

    async fn disable_token(
        &self,
        _session: &SessionModel,
        _stored_payment_method_id: &str,
    ) -> Result<SessionDisableTokenResponse> {
        self.count();
        Err(CheckoutError::component("tokens unavailable"))
    }
}

/// Analytics backend that can refuse to issue an attempt id.
#[derive(Default)]
pub struct FakeAnalyticsRemote {
    pub attempt_id: Option<String>,
    pub fail_fetch: bool,
    pub sent: Mutex<Vec<AnalyticsTrackRequest>>,
}

#[async_trait]
impl AnalyticsRemote for FakeAnalyticsRemote {
    async fn fetch_checkout_attempt_id(
        &self,
        _request: AnalyticsSetupRequest,
    ) -> Result<Option<String>> {
        if self.fail_fetch {
            return Err(CheckoutError::component("analytics setup failed"));
        }
        Ok(self.attempt_id.clone())
    }

    async fn send_events(&self, _id: &str, request: AnalyticsTrackRequest) -> Result<()> {
        self.sent.lock().unwrap().push(request);
        Ok(())
    }
}
