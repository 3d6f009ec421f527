//! `await` actions: the shopper confirms the payment elsewhere (another app,
//! another device) while the status endpoint is polled.

use super::delegate_core::{DelegateCore, MissingPayload};
use super::{
    ActionDelegate, ActionEffect, ActionOutputData, ActionOutputs, ActionViewType,
    AwaitOutputData, DelegateContext, StatusPolling,
};
use crate::application::status_repository::StatusRepository;
use crate::config::DEFAULT_MAX_POLLING_DURATION;
use crate::domain::action::{Action, AwaitAction};
use crate::domain::analytics::{ErrorEvent, GenericEvents};
use crate::error::{CheckoutError, Result};
use crate::infrastructure::redirect::validate_redirect_url;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub struct AwaitDelegate {
    core: Arc<DelegateCore>,
    status: StatusRepository,
}

impl AwaitDelegate {
    pub fn new(ctx: &DelegateContext) -> Self {
        Self::with_outputs(ctx, ActionOutputs::new())
    }

    pub fn with_outputs(ctx: &DelegateContext, outputs: ActionOutputs) -> Self {
        let core = DelegateCore::new(ctx, outputs, "await");
        core.set_view(ActionViewType::Await);
        Self {
            core,
            status: ctx.status.clone(),
        }
    }

    pub fn is_polling(&self) -> bool {
        self.core.has_active_job()
    }

    async fn try_handle_action(&self, action: AwaitAction) -> Result<()> {
        let saved = Action::Await(action.clone());
        self.core.actions.set_action(&saved).await?;
        self.core
            .payment_data
            .set_payment_data(action.payment_data.as_deref())
            .await?;
        self.core.track_action(&saved);

        let payment_data = action
            .payment_data
            .clone()
            .ok_or_else(|| CheckoutError::component("Payment data is null"))?;

        if let Some(url) = action.url.as_deref().filter(|u| !u.is_empty()) {
            match validate_redirect_url(Some(url)) {
                Ok(url) => {
                    debug!(%url, "Opening app before polling");
                    self.core.emit_effect(ActionEffect::OpenUrl(url));
                }
                Err(e) => {
                    self.core.track(GenericEvents::error(
                        action.payment_method_type.clone().unwrap_or_default(),
                        ErrorEvent::RedirectFailed,
                    ));
                    return Err(e);
                }
            }
        }

        self.start_polling(payment_data, action.payment_method_type).await
    }

    async fn start_polling(
        &self,
        payment_data: String,
        payment_method_type: Option<String>,
    ) -> Result<()> {
        self.core.actions.set_polling().await?;
        let job = self.core.restart_job();
        let stream = self.status.poll(payment_data, DEFAULT_MAX_POLLING_DURATION);
        self.core.spawn_polling(
            stream,
            job,
            MissingPayload::NotCompleted,
            move |core, response| {
                core.emit_output(ActionOutputData::Await(AwaitOutputData {
                    is_valid: response.is_final(),
                    payment_method_type: payment_method_type.clone(),
                }));
            },
        );
        Ok(())
    }
}

#[async_trait]
impl ActionDelegate for AwaitDelegate {
    fn outputs(&self) -> &ActionOutputs {
        &self.core.outputs
    }

    fn can_handle(&self, action: &Action) -> bool {
        matches!(action, Action::Await(_))
    }

    async fn initialize(&self) {
        let action = match self.core.actions.action().await {
            Ok(Some(Action::Await(action))) => action,
            Ok(_) => return,
            Err(e) => return self.core.fail(e).await,
        };
        debug!("Restoring await action");
        let Some(payment_data) = action.payment_data.clone() else {
            return self
                .core
                .fail(CheckoutError::component("Payment data is null"))
                .await;
        };
        if let Err(e) = self
            .start_polling(payment_data, action.payment_method_type)
            .await
        {
            self.core.fail(e).await;
        }
    }

    async fn handle_action(&self, action: Action) {
        let Action::Await(action) = action else {
            return self.core.fail(CheckoutError::component("Unsupported action")).await;
        };
        if let Err(e) = self.try_handle_action(action).await {
            self.core.fail(e).await;
        }
    }

    fn on_cleared(&self) {
        self.core.clear();
    }

    fn as_status_poller(&self) -> Option<&dyn StatusPolling> {
        Some(self)
    }
}

#[async_trait]
impl StatusPolling for AwaitDelegate {
    async fn refresh_status(&self) {
        if !self.core.has_active_job() {
            return;
        }
        if let Ok(Some(payment_data)) = self.core.payment_data.payment_data().await {
            self.status.refresh_status(&payment_data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::actions::testing::{ScriptedStatus, context};
    use serde_json::json;
    use std::time::Duration;

    fn await_action(payment_data: Option<&str>) -> Action {
        Action::Await(AwaitAction {
            payment_method_type: Some("blik".into()),
            payment_data: payment_data.map(str::to_owned),
            url: None,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_emits_outputs_then_details() {
        let status = ScriptedStatus::new(&[
            ("pending", None),
            ("pending", None),
            ("authorised", Some("abc")),
        ]);
        let delegate = AwaitDelegate::new(&context(status.clone()));
        let mut details = delegate.outputs().details().take_receiver().unwrap();
        let mut outputs = delegate.outputs().output_data().take_receiver().unwrap();

        delegate.handle_action(await_action(Some("pd1"))).await;
        let data = details.recv().await.unwrap();

        assert_eq!(data.details, json!({ "payload": "abc" }));
        assert_eq!(data.payment_data, None);
        let valid: Vec<bool> = outputs.drain().iter().map(|o| o.is_valid()).collect();
        assert_eq!(valid, vec![false, false, true]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_payment_data_is_an_error() {
        let status = ScriptedStatus::new(&[]);
        let delegate = AwaitDelegate::new(&context(status.clone()));
        let mut errors = delegate.outputs().exceptions().take_receiver().unwrap();

        delegate.handle_action(await_action(None)).await;

        assert_eq!(errors.recv().await.unwrap().to_string(), "Payment data is null");
        assert_eq!(status.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_status_without_payload_is_an_error() {
        let status = ScriptedStatus::new(&[("refused", Some(""))]);
        let delegate = AwaitDelegate::new(&context(status));
        let mut errors = delegate.outputs().exceptions().take_receiver().unwrap();
        let mut details = delegate.outputs().details().take_receiver().unwrap();

        delegate.handle_action(await_action(Some("pd1"))).await;

        assert_eq!(
            errors.recv().await.unwrap().to_string(),
            "Payment was not completed. - refused"
        );
        assert!(details.try_recv().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_action() {
        let delegate = AwaitDelegate::new(&context(ScriptedStatus::new(&[])));
        let mut errors = delegate.outputs().exceptions().take_receiver().unwrap();

        delegate
            .handle_action(Action::parse(r#"{"type":"redirect","url":"https://a.test"}"#).unwrap())
            .await;

        assert_eq!(errors.recv().await.unwrap().to_string(), "Unsupported action");
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_action_cancels_first_poll() {
        let status = ScriptedStatus::new(&[]);
        let delegate = AwaitDelegate::new(&context(status.clone()));

        delegate.handle_action(await_action(Some("pd1"))).await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        delegate.handle_action(await_action(Some("pd2"))).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let pd1_calls = status.calls_for("pd1");
        tokio::time::sleep(Duration::from_secs(20)).await;

        assert_eq!(status.calls_for("pd1"), pd1_calls);
        assert!(status.calls_for("pd2") >= 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_emitted_after_cleared() {
        let status = ScriptedStatus::new(&[("pending", None), ("authorised", Some("abc"))]);
        let delegate = AwaitDelegate::new(&context(status));
        let mut details = delegate.outputs().details().take_receiver().unwrap();

        delegate.handle_action(await_action(Some("pd1"))).await;
        delegate.on_cleared();
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert!(details.try_recv().is_none());
        assert!(!delegate.is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_resumes_polling() {
        let status = ScriptedStatus::new(&[("authorised", Some("abc"))]);
        let ctx = context(status.clone());
        {
            let first = AwaitDelegate::new(&ctx);
            first
                .core
                .actions
                .set_action(&await_action(Some("pd1")))
                .await
                .unwrap();
        }

        let delegate = AwaitDelegate::new(&ctx);
        let mut details = delegate.outputs().details().take_receiver().unwrap();
        delegate.initialize().await;

        assert_eq!(details.recv().await.unwrap().details, json!({ "payload": "abc" }));
        assert_eq!(status.calls_for("pd1"), 1);
    }
}
