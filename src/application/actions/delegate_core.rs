use super::{ActionEffect, ActionOutputData, ActionOutputs, ActionViewType, DelegateContext, PAYLOAD_DETAILS_KEY};
use crate::application::analytics::AnalyticsManager;
use crate::application::saved_state::{ActionStateRepository, PaymentDataRepository};
use crate::application::status_repository::PollingStream;
use crate::domain::action::Action;
use crate::domain::analytics::{AnalyticsEvent, GenericEvents};
use crate::domain::payment::ActionComponentData;
use crate::domain::ports::StateStoreRef;
use crate::domain::status::StatusResponse;
use crate::error::{CheckoutError, Result};
use crate::infrastructure::in_memory::ScopedStateStore;
use futures_util::StreamExt;
use serde_json::json;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, trace, warn};

/// What a polling delegate reports when a terminal status has no payload.
#[derive(Clone, Copy)]
pub(crate) enum MissingPayload {
    /// "Payment was not completed. - {code}"
    NotCompleted,
    /// "Payload is missing from StatusResponse."
    PayloadMissing,
}

/// State and plumbing shared by the concrete delegates.
pub(crate) struct DelegateCore {
    pub outputs: ActionOutputs,
    pub actions: ActionStateRepository,
    pub payment_data: PaymentDataRepository,
    pub store: StateStoreRef,
    pub analytics: Option<AnalyticsManager>,
    scope: CancellationToken,
    tasks: TaskTracker,
    job: Mutex<Option<CancellationToken>>,
}

impl DelegateCore {
    pub fn new(ctx: &DelegateContext, outputs: ActionOutputs, store_scope: &str) -> Arc<Self> {
        let store: StateStoreRef = Arc::new(ScopedStateStore::new(ctx.store.clone(), store_scope));
        Arc::new(Self {
            outputs,
            actions: ActionStateRepository::new(store.clone()),
            payment_data: PaymentDataRepository::new(store.clone()),
            store,
            analytics: ctx.analytics.clone(),
            scope: ctx.scope.child_token(),
            tasks: TaskTracker::new(),
            job: Mutex::new(None),
        })
    }

    pub fn is_cleared(&self) -> bool {
        self.scope.is_cancelled()
    }

    pub fn set_view(&self, view: ActionViewType) {
        if !self.is_cleared() {
            self.outputs.set_view(Some(view));
        }
    }

    pub fn emit_details(&self, data: ActionComponentData) {
        if !self.is_cleared() {
            self.outputs.details().send(data);
        }
    }

    pub fn emit_error(&self, error: CheckoutError) {
        if !self.is_cleared() {
            debug!(error = %error, "Action failed");
            self.outputs.exceptions().send(error);
        }
    }

    pub fn emit_output(&self, output: ActionOutputData) {
        if !self.is_cleared() {
            self.outputs.output_data().send(output);
        }
    }

    pub fn emit_effect(&self, effect: ActionEffect) {
        if !self.is_cleared() {
            self.outputs.effects().send(effect);
        }
    }

    pub fn track(&self, event: AnalyticsEvent) {
        if let Some(analytics) = &self.analytics {
            analytics.track_event(event);
        }
    }

    pub fn track_action(&self, action: &Action) {
        self.track(GenericEvents::action(
            action.payment_method_type().unwrap_or_default(),
            action.type_name(),
        ));
    }

    /// Forgets the saved action. Failures are only logged.
    pub async fn clear_state(&self) {
        if let Err(e) = self.actions.clear().await {
            warn!(error = %e, "Failed to clear saved action");
        }
    }

    /// Emits `error` and ends the current attempt.
    pub async fn fail(&self, error: CheckoutError) {
        self.emit_error(error);
        self.clear_state().await;
    }

    /// Emits `data` and ends the current attempt.
    pub async fn finish(&self, data: ActionComponentData) {
        self.emit_details(data);
        self.clear_state().await;
    }

    /// Cancels the running job, if any, and opens a new one.
    pub fn restart_job(&self) -> CancellationToken {
        let token = self.scope.child_token();
        let previous = self
            .job
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(token.clone());
        if let Some(previous) = previous {
            trace!("Cancelling previous job");
            previous.cancel();
        }
        token
    }

    pub fn cancel_job(&self) {
        if let Some(job) = self.job.lock().unwrap_or_else(PoisonError::into_inner).take() {
            job.cancel();
        }
    }

    pub fn has_active_job(&self) -> bool {
        self.job
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|j| !j.is_cancelled())
    }

    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(task);
    }

    pub fn clear(&self) {
        self.scope.cancel();
        self.cancel_job();
        self.tasks.close();
    }

    /// Drives `stream` on `job` until a terminal status, an error or cancellation.
    ///
    /// `on_status` sees every status, terminal ones included, before the
    /// terminal outcome is emitted.
    pub fn spawn_polling<F>(
        self: &Arc<Self>,
        mut stream: PollingStream,
        job: CancellationToken,
        missing_payload: MissingPayload,
        on_status: F,
    ) where
        F: Fn(&DelegateCore, &StatusResponse) + Send + 'static,
    {
        let core = Arc::clone(self);
        self.spawn(async move {
            loop {
                let item = tokio::select! {
                    biased;
                    _ = job.cancelled() => break,
                    item = stream.next() => item,
                };
                let Some(item) = item else { break };
                if job.is_cancelled() {
                    break;
                }
                match item {
                    Ok(response) => {
                        trace!(result_code = %response.result_code, "Status changed");
                        on_status(&core, &response);
                        if response.is_final() {
                            core.on_polling_finished(&response, missing_payload, &job)
                                .await;
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Error while polling status");
                        if !job.is_cancelled() {
                            core.fail(CheckoutError::component_with(
                                "Error while polling status",
                                e,
                            ))
                            .await;
                        }
                        break;
                    }
                }
            }
            job.cancel();
        });
    }

    /// Ends the attempt on a terminal status. A cancelled job leaves the saved
    /// state to the action that replaced it.
    async fn on_polling_finished(
        &self,
        response: &StatusResponse,
        missing_payload: MissingPayload,
        job: &CancellationToken,
    ) {
        if job.is_cancelled() {
            trace!("Polling job cancelled before its terminal status was handled");
            return;
        }
        match response.non_empty_payload() {
            Some(payload) => {
                // A terminal result ends the payment data's life.
                if let Err(e) = self.payment_data.set_payment_data(None).await {
                    warn!(error = %e, "Failed to clear payment data");
                }
                if job.is_cancelled() {
                    return;
                }
                self.finish(ActionComponentData::new(
                    json!({ PAYLOAD_DETAILS_KEY: payload }),
                    None,
                ))
                .await;
            }
            None => {
                let error = match missing_payload {
                    MissingPayload::NotCompleted => CheckoutError::component(format!(
                        "Payment was not completed. - {}",
                        response.result_code
                    )),
                    MissingPayload::PayloadMissing => {
                        CheckoutError::component("Payload is missing from StatusResponse.")
                    }
                };
                self.fail(error).await;
            }
        }
    }

    /// Payment data of the current action, or an error when missing.
    pub async fn require_payment_data(&self) -> Result<String> {
        self.payment_data
            .payment_data()
            .await?
            .ok_or_else(|| CheckoutError::component("Payment data is null"))
    }
}
