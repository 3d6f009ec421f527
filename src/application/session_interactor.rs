//! Session flow coordination.
//!
//! Every interceptable call is first offered to the merchant. When the
//! merchant reports it handled the call, the flow is taken over: from then on
//! the interactor never calls the session API for interceptable calls again,
//! and the flag survives process recreation.

use crate::application::analytics::AnalyticsManager;
use crate::application::saved_state::{IS_FLOW_TAKEN_OVER_KEY, SESSION_DATA_KEY};
use crate::domain::action::Action;
use crate::domain::analytics::{ErrorEvent, GenericEvents};
use crate::domain::payment::{
    ActionComponentData, BalanceResult, OrderRequest, OrderResponse, PaymentComponentState,
};
use crate::domain::ports::{SessionServiceRef, StateStoreRef};
use crate::domain::session::{SessionModel, SessionPaymentResult};
use crate::domain::status::RESULT_REFUSED;
use crate::error::CheckoutError;
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

const SESSION_COMPONENT: &str = "session";

#[derive(Debug)]
pub enum PaymentsResult {
    Action(Action),
    Error(CheckoutError),
    Finished(SessionPaymentResult),
    /// An order was paid in part; `result.order` holds the remaining amount.
    NotFullyPaidOrder(SessionPaymentResult),
    /// The payment was refused while paying an order in parts.
    RefusedPartialPayment(SessionPaymentResult),
    TakenOver,
}

#[derive(Debug)]
pub enum DetailsResult {
    Action(Action),
    Error(CheckoutError),
    Finished(SessionPaymentResult),
    TakenOver,
}

#[derive(Debug)]
pub enum BalanceCallResult {
    Successful(BalanceResult),
    Error(CheckoutError),
    TakenOver,
}

#[derive(Debug)]
pub enum CreateOrderResult {
    Successful(OrderResponse),
    Error(CheckoutError),
    TakenOver,
}

#[derive(Debug)]
pub enum CancelOrderResult {
    Successful,
    Error(CheckoutError),
    TakenOver,
}

#[derive(Debug)]
pub enum UpdatePaymentMethodsResult {
    Successful {
        payment_methods: Value,
        order: Option<OrderResponse>,
    },
    Error(CheckoutError),
}

#[derive(Debug)]
pub enum RemoveStoredPaymentMethodResult {
    Successful { stored_payment_method_id: String },
    Error(CheckoutError),
}

pub struct SessionInteractor {
    service: SessionServiceRef,
    store: StateStoreRef,
    session: watch::Sender<SessionModel>,
    is_flow_taken_over: AtomicBool,
    analytics: Option<AnalyticsManager>,
}

impl SessionInteractor {
    /// Creates an interactor, preferring the saved `sessionData` and taken-over
    /// flag over the given ones.
    pub async fn restore(
        service: SessionServiceRef,
        store: StateStoreRef,
        mut session: SessionModel,
        is_flow_taken_over: bool,
    ) -> Self {
        match store.get_as::<String>(SESSION_DATA_KEY).await {
            Ok(Some(session_data)) => session.session_data = Some(session_data),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Failed to restore session data"),
        }
        let saved_taken_over = store
            .get_as::<bool>(IS_FLOW_TAKEN_OVER_KEY)
            .await
            .inspect_err(|e| warn!(error = %e, "Failed to restore taken over flag"))
            .ok()
            .flatten()
            .unwrap_or(false);

        let (session, _) = watch::channel(session);
        Self {
            service,
            store,
            session,
            is_flow_taken_over: AtomicBool::new(is_flow_taken_over || saved_taken_over),
            analytics: None,
        }
    }

    pub fn with_analytics(mut self, analytics: AnalyticsManager) -> Self {
        self.analytics = Some(analytics);
        self
    }

    pub fn session(&self) -> SessionModel {
        self.session.borrow().clone()
    }

    /// Follows every `sessionData` update.
    pub fn subscribe(&self) -> watch::Receiver<SessionModel> {
        self.session.subscribe()
    }

    pub fn is_flow_taken_over(&self) -> bool {
        self.is_flow_taken_over.load(Ordering::SeqCst)
    }

    /// # Arguments
    ///
    /// * `state` - The state of the component submitting the payment.
    /// * `merchant_call` - Returns `true` when the merchant made the call themselves.
    #[instrument(skip_all)]
    pub async fn on_payments_call_requested<S: PaymentComponentState>(
        &self,
        state: &S,
        merchant_call: impl FnOnce(&S) -> bool + Send,
    ) -> PaymentsResult {
        let handled = merchant_call(state);
        self.intercept("on_submit", handled, PaymentsResult::TakenOver, || {
            self.make_payments_call(state)
        })
        .await
    }

    async fn make_payments_call<S: PaymentComponentState>(&self, state: &S) -> PaymentsResult {
        let session = self.session();
        let response = match self.service.payments(&session, state.data()).await {
            Ok(response) => response,
            Err(e) => {
                let component = state.payment_method_type().unwrap_or(SESSION_COMPONENT);
                self.track_error(component, ErrorEvent::ApiPayments);
                return PaymentsResult::Error(e);
            }
        };
        self.update_session_data(&response.session_data).await;

        let is_refused = response
            .result_code
            .as_deref()
            .is_some_and(|code| code.eq_ignore_ascii_case(RESULT_REFUSED));
        let is_non_fully_paid = response
            .order
            .as_ref()
            .is_some_and(OrderResponse::is_non_fully_paid);
        let result = SessionPaymentResult {
            session_id: session.id,
            session_result: response.session_result,
            session_data: Some(response.session_data),
            result_code: response.result_code,
            order: response.order.clone(),
        };

        match (response.action, response.order) {
            _ if is_refused && is_non_fully_paid => PaymentsResult::RefusedPartialPayment(result),
            (Some(action), _) => PaymentsResult::Action(action),
            (None, Some(_)) if is_non_fully_paid => PaymentsResult::NotFullyPaidOrder(result),
            _ => PaymentsResult::Finished(result),
        }
    }

    #[instrument(skip_all)]
    pub async fn on_details_call_requested(
        &self,
        data: &ActionComponentData,
        merchant_call: impl FnOnce(&ActionComponentData) -> bool + Send,
    ) -> DetailsResult {
        let handled = merchant_call(data);
        self.intercept("on_additional_details", handled, DetailsResult::TakenOver, || {
            self.make_details_call(data)
        })
        .await
    }

    async fn make_details_call(&self, data: &ActionComponentData) -> DetailsResult {
        let session = self.session();
        let response = match self.service.details(&session, data).await {
            Ok(response) => response,
            Err(e) => {
                self.track_error(SESSION_COMPONENT, ErrorEvent::ApiDetails);
                return DetailsResult::Error(e);
            }
        };
        self.update_session_data(&response.session_data).await;

        match response.action {
            Some(action) => DetailsResult::Action(action),
            None => DetailsResult::Finished(SessionPaymentResult {
                session_id: session.id,
                session_result: response.session_result,
                session_data: Some(response.session_data),
                result_code: response.result_code,
                order: response.order,
            }),
        }
    }

    #[instrument(skip_all)]
    pub async fn check_balance<S: PaymentComponentState>(
        &self,
        state: &S,
        merchant_call: impl FnOnce(&S) -> bool + Send,
    ) -> BalanceCallResult {
        let handled = merchant_call(state);
        self.intercept("on_balance_check", handled, BalanceCallResult::TakenOver, move || async move {
            let response = match self.service.check_balance(&self.session(), state.data()).await {
                Ok(response) => response,
                Err(e) => return BalanceCallResult::Error(e),
            };
            self.update_session_data(&response.session_data).await;
            if response.balance.as_ref().is_none_or(|b| b.value <= 0) {
                return BalanceCallResult::Error(CheckoutError::component("Not enough balance"));
            }
            BalanceCallResult::Successful(BalanceResult {
                balance: response.balance,
                transaction_limit: response.transaction_limit,
            })
        })
        .await
    }

    #[instrument(skip_all)]
    pub async fn create_order(&self, merchant_call: impl FnOnce() -> bool + Send) -> CreateOrderResult {
        let handled = merchant_call();
        self.intercept("on_order_request", handled, CreateOrderResult::TakenOver, move || async move {
            let response = match self.service.create_order(&self.session()).await {
                Ok(response) => response,
                Err(e) => return CreateOrderResult::Error(e),
            };
            self.update_session_data(&response.session_data).await;
            CreateOrderResult::Successful(OrderResponse {
                psp_reference: response.psp_reference,
                order_data: response.order_data,
                amount: None,
                remaining_amount: None,
            })
        })
        .await
    }

    #[instrument(skip_all)]
    pub async fn cancel_order(
        &self,
        order: &OrderRequest,
        merchant_call: impl FnOnce(&OrderRequest) -> bool + Send,
    ) -> CancelOrderResult {
        let handled = merchant_call(order);
        self.intercept("on_order_cancel", handled, CancelOrderResult::TakenOver, move || async move {
            let response = match self.service.cancel_order(&self.session(), order).await {
                Ok(response) => response,
                Err(e) => return CancelOrderResult::Error(e),
            };
            self.update_session_data(&response.session_data).await;
            CancelOrderResult::Successful
        })
        .await
    }

    /// Refreshes the payment methods, e.g. after an order was partially paid.
    /// Never intercepted.
    #[instrument(skip_all)]
    pub async fn update_payment_methods(
        &self,
        order: Option<OrderResponse>,
    ) -> UpdatePaymentMethodsResult {
        let order_request = order.as_ref().map(|o| OrderRequest {
            psp_reference: o.psp_reference.clone(),
            order_data: o.order_data.clone(),
        });
        let response = match self
            .service
            .setup(&self.session(), order_request.as_ref())
            .await
        {
            Ok(response) => response,
            Err(e) => return UpdatePaymentMethodsResult::Error(e),
        };
        self.update_session_data(&response.session_data).await;
        match response.payment_methods {
            Some(payment_methods) => UpdatePaymentMethodsResult::Successful {
                payment_methods,
                order,
            },
            None => UpdatePaymentMethodsResult::Error(CheckoutError::component(
                "Payment methods should not be null",
            )),
        }
    }

    /// Disables a stored payment method. Never intercepted.
    #[instrument(skip_all)]
    pub async fn remove_stored_payment_method(
        &self,
        stored_payment_method_id: &str,
    ) -> RemoveStoredPaymentMethodResult {
        match self
            .service
            .disable_token(&self.session(), stored_payment_method_id)
            .await
        {
            Ok(response) => {
                self.update_session_data(&response.session_data).await;
                RemoveStoredPaymentMethodResult::Successful {
                    stored_payment_method_id: stored_payment_method_id.to_owned(),
                }
            }
            Err(e) => RemoveStoredPaymentMethodResult::Error(e),
        }
    }

    /// Runs `internal_call` unless the merchant handled the call or took the
    /// flow over earlier.
    async fn intercept<T, F, Fut>(
        &self,
        merchant_method: &str,
        handled: bool,
        taken_over: T,
        internal_call: F,
    ) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if handled {
            if !self.is_flow_taken_over.swap(true, Ordering::SeqCst) {
                info!(merchant_method, "Session flow taken over by the merchant");
                if let Err(e) = self.store.put(IS_FLOW_TAKEN_OVER_KEY, Value::Bool(true)).await {
                    warn!(error = %e, "Failed to save taken over flag");
                }
            }
            return taken_over;
        }
        if self.is_flow_taken_over() {
            warn!(
                merchant_method,
                "Session flow was already taken over in a previous call, {merchant_method} should be implemented"
            );
            return taken_over;
        }
        internal_call().await
    }

    async fn update_session_data(&self, session_data: &str) {
        debug!("Updating session data");
        self.session
            .send_modify(|session| session.session_data = Some(session_data.to_owned()));
        if let Err(e) = self.store.put(SESSION_DATA_KEY, Value::from(session_data)).await {
            warn!(error = %e, "Failed to save session data");
        }
    }

    fn track_error(&self, component: &str, event: ErrorEvent) {
        if let Some(analytics) = &self.analytics {
            analytics.track_event(GenericEvents::error(component, event));
        }
    }
}
