//! Routing of payment component events to the merchant.
//!
//! [`AdvancedComponentEventHandler`] forwards every event as is: the merchant
//! makes the API calls. [`SessionComponentEventHandler`] makes the submit and
//! details calls through the [`SessionInteractor`] unless the merchant takes
//! the flow over.

use crate::application::session_interactor::{DetailsResult, PaymentsResult, SessionInteractor};
use crate::domain::action::Action;
use crate::domain::payment::{ActionComponentData, PaymentComponentState};
use crate::domain::session::SessionPaymentResult;
use crate::error::CheckoutError;
use async_trait::async_trait;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::oneshot;
use tracing::{debug, info, trace};

/// A runtime permission the component needs, e.g. the camera.
#[derive(Debug)]
pub struct PermissionRequest {
    pub required_permission: String,
    /// Receives whether the permission was granted.
    pub response: oneshot::Sender<bool>,
}

impl PermissionRequest {
    pub fn new(required_permission: impl Into<String>) -> (Self, oneshot::Receiver<bool>) {
        let (response, rx) = oneshot::channel();
        let request = Self {
            required_permission: required_permission.into(),
            response,
        };
        (request, rx)
    }

    pub fn deny(self) {
        let _ = self.response.send(false);
    }
}

#[derive(Debug)]
pub enum PaymentComponentEvent<S> {
    StateChanged(S),
    Submit(S),
    ActionDetails(ActionComponentData),
    Error(CheckoutError),
    PermissionRequest(PermissionRequest),
}

impl<S> PaymentComponentEvent<S> {
    fn name(&self) -> &'static str {
        match self {
            PaymentComponentEvent::StateChanged(_) => "state_changed",
            PaymentComponentEvent::Submit(_) => "submit",
            PaymentComponentEvent::ActionDetails(_) => "action_details",
            PaymentComponentEvent::Error(_) => "error",
            PaymentComponentEvent::PermissionRequest(_) => "permission_request",
        }
    }
}

#[async_trait]
pub trait ComponentEventHandler<S: PaymentComponentState>: Send + Sync {
    async fn on_payment_component_event(&self, event: PaymentComponentEvent<S>);

    fn on_cleared(&self) {}
}

/// Merchant callbacks of the advanced flow.
pub trait ComponentCallback<S>: Send + Sync {
    fn on_state_changed(&self, _state: &S) {}

    fn on_submit(&self, state: S);

    fn on_additional_details(&self, data: ActionComponentData);

    fn on_error(&self, error: CheckoutError);

    /// Denies by default.
    fn on_permission_request(&self, request: PermissionRequest) {
        request.deny();
    }
}

pub struct AdvancedComponentEventHandler<S> {
    callback: Arc<dyn ComponentCallback<S>>,
    _state: PhantomData<fn(S)>,
}

impl<S> AdvancedComponentEventHandler<S> {
    pub fn new(callback: Arc<dyn ComponentCallback<S>>) -> Self {
        Self {
            callback,
            _state: PhantomData,
        }
    }
}

#[async_trait]
impl<S: PaymentComponentState> ComponentEventHandler<S> for AdvancedComponentEventHandler<S> {
    async fn on_payment_component_event(&self, event: PaymentComponentEvent<S>) {
        trace!(event = event.name(), "Event received");
        match event {
            PaymentComponentEvent::StateChanged(state) => self.callback.on_state_changed(&state),
            PaymentComponentEvent::Submit(state) => self.callback.on_submit(state),
            PaymentComponentEvent::ActionDetails(data) => self.callback.on_additional_details(data),
            PaymentComponentEvent::Error(error) => self.callback.on_error(error),
            PaymentComponentEvent::PermissionRequest(request) => {
                self.callback.on_permission_request(request)
            }
        }
    }
}

/// Merchant callbacks of the session flow.
///
/// `on_submit` and `on_additional_details` return `true` when the merchant
/// makes the call, which takes the session flow over.
pub trait SessionComponentCallback<S>: Send + Sync {
    fn on_state_changed(&self, _state: &S) {}

    fn on_submit(&self, _state: &S) -> bool {
        false
    }

    fn on_additional_details(&self, _data: &ActionComponentData) -> bool {
        false
    }

    fn on_loading(&self, _is_loading: bool) {}

    fn on_action(&self, action: Action);

    fn on_finished(&self, result: SessionPaymentResult);

    fn on_error(&self, error: CheckoutError);

    fn on_permission_request(&self, request: PermissionRequest) {
        request.deny();
    }
}

pub struct SessionComponentEventHandler<S> {
    interactor: Arc<SessionInteractor>,
    callback: Arc<dyn SessionComponentCallback<S>>,
    intercepting: AtomicBool,
}

impl<S: PaymentComponentState> SessionComponentEventHandler<S> {
    pub fn new(
        interactor: Arc<SessionInteractor>,
        callback: Arc<dyn SessionComponentCallback<S>>,
    ) -> Self {
        let intercepting = AtomicBool::new(!interactor.is_flow_taken_over());
        Self {
            interactor,
            callback,
            intercepting,
        }
    }

    /// Whether submit and details calls still go through the session.
    pub fn is_intercepting(&self) -> bool {
        self.intercepting.load(Ordering::SeqCst)
    }

    fn set_flow_taken_over(&self) {
        if self.intercepting.swap(false, Ordering::SeqCst) {
            info!("Flow was taken over.");
        }
    }

    async fn on_submit(&self, state: S) {
        if !self.is_intercepting() {
            self.callback.on_submit(&state);
            return;
        }
        self.callback.on_loading(true);
        let callback = &self.callback;
        let result = self
            .interactor
            .on_payments_call_requested(&state, |s| callback.on_submit(s))
            .await;
        match result {
            PaymentsResult::Action(action) => self.callback.on_action(action),
            PaymentsResult::Error(error) => self.callback.on_error(error),
            PaymentsResult::Finished(result)
            | PaymentsResult::NotFullyPaidOrder(result)
            | PaymentsResult::RefusedPartialPayment(result) => self.on_finished(result),
            PaymentsResult::TakenOver => self.set_flow_taken_over(),
        }
        self.callback.on_loading(false);
    }

    async fn on_details(&self, data: ActionComponentData) {
        if !self.is_intercepting() {
            self.callback.on_additional_details(&data);
            return;
        }
        self.callback.on_loading(true);
        let callback = &self.callback;
        let result = self
            .interactor
            .on_details_call_requested(&data, |d| callback.on_additional_details(d))
            .await;
        match result {
            DetailsResult::Action(action) => self.callback.on_action(action),
            DetailsResult::Error(error) => self.callback.on_error(error),
            DetailsResult::Finished(result) => self.on_finished(result),
            DetailsResult::TakenOver => self.set_flow_taken_over(),
        }
        self.callback.on_loading(false);
    }

    fn on_finished(&self, result: SessionPaymentResult) {
        debug!(result_code = ?result.result_code, "Finished");
        self.callback.on_finished(result);
    }
}

#[async_trait]
impl<S: PaymentComponentState> ComponentEventHandler<S> for SessionComponentEventHandler<S> {
    async fn on_payment_component_event(&self, event: PaymentComponentEvent<S>) {
        trace!(event = event.name(), "Event received");
        match event {
            PaymentComponentEvent::StateChanged(state) => self.callback.on_state_changed(&state),
            PaymentComponentEvent::Submit(state) => self.on_submit(state).await,
            PaymentComponentEvent::ActionDetails(data) => self.on_details(data).await,
            PaymentComponentEvent::Error(error) => self.callback.on_error(error),
            PaymentComponentEvent::PermissionRequest(request) => {
                self.callback.on_permission_request(request)
            }
        }
    }
}
