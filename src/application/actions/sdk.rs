//! `sdk` actions handed to a native payment app (Twint, WeChat Pay).
//!
//! The host launches the SDK from a [`SdkLaunch`] effect and reports back
//! through [`SdkResultHandling::handle_sdk_result`].

use super::delegate_core::{DelegateCore, MissingPayload};
use super::{
    ActionDelegate, ActionEffect, ActionOutputs, ActionViewType, DelegateContext, SdkLaunch,
    SdkResult, SdkResultHandling, StatusPolling, TwintFlowType, TwintResult,
};
use crate::application::status_repository::StatusRepository;
use crate::domain::action::{payment_method_types, Action, SdkAction, SdkData};
use crate::domain::analytics::{ErrorEvent, GenericEvents};
use crate::domain::payment::ActionComponentData;
use crate::error::{CheckoutError, Result};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

const RESULT_CODE: &str = "resultCode";

fn is_sdk_action(action: &Action, payment_method_type: &str) -> bool {
    matches!(action, Action::Sdk(sdk) if sdk.payment_method_type.as_deref() == Some(payment_method_type))
}

pub struct TwintDelegate {
    core: Arc<DelegateCore>,
    status: StatusRepository,
}

impl TwintDelegate {
    pub fn new(ctx: &DelegateContext) -> Self {
        Self::with_outputs(ctx, ActionOutputs::new())
    }

    pub fn with_outputs(ctx: &DelegateContext, outputs: ActionOutputs) -> Self {
        Self {
            core: DelegateCore::new(ctx, outputs, "twint"),
            status: ctx.status.clone(),
        }
    }

    pub fn is_polling(&self) -> bool {
        self.core.has_active_job()
    }

    async fn try_handle_action(&self, action: SdkAction) -> Result<()> {
        // A new action replaces the previous attempt and its poll.
        self.core.cancel_job();
        self.core.actions.clear().await?;

        let saved = Action::Sdk(action.clone());
        self.core.actions.set_action(&saved).await?;
        self.core
            .payment_data
            .set_payment_data(action.payment_data.as_deref())
            .await?;
        self.core.track_action(&saved);

        let Some(SdkData::Twint(sdk_data)) = action.sdk_data else {
            return Err(CheckoutError::component("SDK Data is null or of wrong type"));
        };
        if action.payment_data.is_none() {
            return Err(CheckoutError::component("Payment data is null"));
        }
        let flow = if sdk_data.is_stored {
            TwintFlowType::Recurring(sdk_data.token)
        } else {
            TwintFlowType::OneTime(sdk_data.token)
        };
        self.core.set_view(ActionViewType::Sdk);
        self.core.emit_effect(ActionEffect::LaunchSdk(SdkLaunch::Twint(flow)));
        Ok(())
    }

    async fn start_polling(&self) -> Result<()> {
        let payment_data = self.core.require_payment_data().await?;
        self.core.actions.set_polling().await?;
        let job = self.core.restart_job();
        let stream = self.status.poll_default(payment_data);
        self.core
            .spawn_polling(stream, job, MissingPayload::PayloadMissing, |_, _| {});
        Ok(())
    }

    fn track_third_party_error(&self) {
        self.core.track(GenericEvents::error(
            payment_method_types::TWINT,
            ErrorEvent::ThirdParty,
        ));
    }
}

#[async_trait]
impl ActionDelegate for TwintDelegate {
    fn outputs(&self) -> &ActionOutputs {
        &self.core.outputs
    }

    fn can_handle(&self, action: &Action) -> bool {
        is_sdk_action(action, payment_method_types::TWINT)
    }

    async fn initialize(&self) {
        match self.core.actions.is_polling().await {
            Ok(true) => {
                debug!("Resuming Twint status polling");
                if let Err(e) = self.start_polling().await {
                    self.core.fail(e).await;
                }
            }
            Ok(false) => {}
            Err(e) => self.core.fail(e).await,
        }
    }

    async fn handle_action(&self, action: Action) {
        let Action::Sdk(action) = action else {
            return self.core.fail(CheckoutError::component("Unsupported action")).await;
        };
        if let Err(e) = self.try_handle_action(action).await {
            self.core.fail(e).await;
        }
    }

    fn on_cleared(&self) {
        self.core.clear();
    }

    fn as_sdk_result_handler(&self) -> Option<&dyn SdkResultHandling> {
        Some(self)
    }

    fn as_status_poller(&self) -> Option<&dyn StatusPolling> {
        Some(self)
    }
}

#[async_trait]
impl SdkResultHandling for TwintDelegate {
    async fn handle_sdk_result(&self, result: SdkResult) {
        let outcome = match result {
            SdkResult::Twint(TwintResult::Success) => self.start_polling().await,
            SdkResult::Twint(TwintResult::Error) => {
                self.track_third_party_error();
                Err(CheckoutError::component("Twint encountered an error."))
            }
            SdkResult::Twint(TwintResult::AppNotInstalled) => {
                self.track_third_party_error();
                Err(CheckoutError::component("Twint app not installed."))
            }
            SdkResult::LaunchFailed(reason) => {
                self.track_third_party_error();
                Err(CheckoutError::component(reason))
            }
            other => {
                warn!(?other, "Unexpected SDK result for Twint");
                Err(CheckoutError::checkout("Unexpected SDK result"))
            }
        };
        if let Err(e) = outcome {
            self.core.fail(e).await;
        }
    }
}

#[async_trait]
impl StatusPolling for TwintDelegate {
    async fn refresh_status(&self) {
        if !self.core.has_active_job() {
            return;
        }
        if let Ok(Some(payment_data)) = self.core.payment_data.payment_data().await {
            self.status.refresh_status(&payment_data);
        }
    }
}

pub struct WeChatPayDelegate {
    core: Arc<DelegateCore>,
}

impl WeChatPayDelegate {
    pub fn new(ctx: &DelegateContext) -> Self {
        Self::with_outputs(ctx, ActionOutputs::new())
    }

    pub fn with_outputs(ctx: &DelegateContext, outputs: ActionOutputs) -> Self {
        Self {
            core: DelegateCore::new(ctx, outputs, "wechatpay"),
        }
    }

    async fn try_handle_action(&self, action: SdkAction) -> Result<()> {
        let saved = Action::Sdk(action.clone());
        self.core.actions.set_action(&saved).await?;
        self.core
            .payment_data
            .set_payment_data(action.payment_data.as_deref())
            .await?;
        self.core.track_action(&saved);

        let Some(SdkData::WeChatPay(sdk_data)) = action.sdk_data else {
            return Err(CheckoutError::component("SDK Data is null"));
        };
        self.core.set_view(ActionViewType::Sdk);
        self.core
            .emit_effect(ActionEffect::LaunchSdk(SdkLaunch::WeChatPay(sdk_data)));
        Ok(())
    }
}

#[async_trait]
impl ActionDelegate for WeChatPayDelegate {
    fn outputs(&self) -> &ActionOutputs {
        &self.core.outputs
    }

    fn can_handle(&self, action: &Action) -> bool {
        is_sdk_action(action, payment_method_types::WECHAT_PAY_SDK)
    }

    /// The WeChat app reports back through the host; there is no poll to resume.
    async fn initialize(&self) {}

    async fn handle_action(&self, action: Action) {
        let Action::Sdk(action) = action else {
            return self.core.fail(CheckoutError::component("Unsupported action")).await;
        };
        if let Err(e) = self.try_handle_action(action).await {
            self.core.fail(e).await;
        }
    }

    fn on_cleared(&self) {
        self.core.clear();
    }

    fn as_sdk_result_handler(&self) -> Option<&dyn SdkResultHandling> {
        Some(self)
    }
}

#[async_trait]
impl SdkResultHandling for WeChatPayDelegate {
    async fn handle_sdk_result(&self, result: SdkResult) {
        match result {
            SdkResult::WeChatPay { err_code } => {
                let payment_data = match self.core.payment_data.payment_data().await {
                    Ok(payment_data) => payment_data,
                    Err(e) => return self.core.fail(e).await,
                };
                self.core
                    .finish(ActionComponentData::new(
                        json!({ RESULT_CODE: err_code }),
                        payment_data,
                    ))
                    .await;
            }
            SdkResult::LaunchFailed(reason) => {
                debug!(%reason, "WeChat Pay SDK could not be launched");
                self.core.track(GenericEvents::error(
                    payment_method_types::WECHAT_PAY_SDK,
                    ErrorEvent::ThirdParty,
                ));
                self.core
                    .fail(CheckoutError::component("Failed to initialize WeChat app"))
                    .await;
            }
            other => {
                warn!(?other, "Unexpected SDK result for WeChat Pay");
                self.core
                    .fail(CheckoutError::checkout("Unexpected SDK result"))
                    .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::actions::testing::{ScriptedStatus, context};
    use crate::domain::action::{TwintSdkData, WeChatPaySdkData};
    use std::time::Duration;

    fn twint_action(is_stored: bool) -> Action {
        twint_action_for(Some("pd1"), is_stored)
    }

    fn twint_action_for(payment_data: Option<&str>, is_stored: bool) -> Action {
        Action::Sdk(SdkAction {
            payment_method_type: Some("twint".into()),
            payment_data: payment_data.map(str::to_owned),
            sdk_data: Some(SdkData::Twint(TwintSdkData {
                token: "tok".into(),
                is_stored,
            })),
        })
    }

    fn wechat_action() -> Action {
        Action::Sdk(SdkAction {
            payment_method_type: Some("wechatpaySDK".into()),
            payment_data: Some("pd1".into()),
            sdk_data: Some(SdkData::WeChatPay(WeChatPaySdkData {
                appid: Some("app".into()),
                partnerid: None,
                prepayid: Some("prepay".into()),
                noncestr: None,
                timestamp: None,
                package_value: None,
                sign: None,
            })),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_twint_launch_then_poll() {
        let status = ScriptedStatus::new(&[("pending", None), ("authorised", Some("abc"))]);
        let delegate = TwintDelegate::new(&context(status));
        let mut effects = delegate.outputs().effects().take_receiver().unwrap();
        let mut details = delegate.outputs().details().take_receiver().unwrap();

        delegate.handle_action(twint_action(true)).await;
        assert_eq!(
            effects.recv().await.unwrap(),
            ActionEffect::LaunchSdk(SdkLaunch::Twint(TwintFlowType::Recurring("tok".into())))
        );

        delegate.handle_sdk_result(SdkResult::Twint(TwintResult::Success)).await;
        let data = details.recv().await.unwrap();
        assert_eq!(data.details, serde_json::json!({ "payload": "abc" }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_twint_final_status_without_payload() {
        let status = ScriptedStatus::new(&[("authorised", None)]);
        let delegate = TwintDelegate::new(&context(status));
        let mut errors = delegate.outputs().exceptions().take_receiver().unwrap();

        delegate.handle_action(twint_action(false)).await;
        delegate.handle_sdk_result(SdkResult::Twint(TwintResult::Success)).await;

        assert_eq!(
            errors.recv().await.unwrap().to_string(),
            "Payload is missing from StatusResponse."
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_twint_app_not_installed() {
        let status = ScriptedStatus::new(&[]);
        let delegate = TwintDelegate::new(&context(status.clone()));
        let mut errors = delegate.outputs().exceptions().take_receiver().unwrap();

        delegate.handle_action(twint_action(false)).await;
        delegate
            .handle_sdk_result(SdkResult::Twint(TwintResult::AppNotInstalled))
            .await;

        assert_eq!(errors.recv().await.unwrap().to_string(), "Twint app not installed.");
        assert_eq!(status.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_twint_missing_sdk_data() {
        let delegate = TwintDelegate::new(&context(ScriptedStatus::new(&[])));
        let mut errors = delegate.outputs().exceptions().take_receiver().unwrap();

        delegate
            .handle_action(Action::Sdk(SdkAction {
                payment_method_type: Some("twint".into()),
                ..Default::default()
            }))
            .await;

        assert_eq!(
            errors.recv().await.unwrap().to_string(),
            "SDK Data is null or of wrong type"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_twint_missing_payment_data_launches_nothing() {
        let status = ScriptedStatus::new(&[]);
        let delegate = TwintDelegate::new(&context(status.clone()));
        let mut effects = delegate.outputs().effects().take_receiver().unwrap();
        let mut errors = delegate.outputs().exceptions().take_receiver().unwrap();

        delegate.handle_action(twint_action_for(None, false)).await;

        assert_eq!(errors.recv().await.unwrap().to_string(), "Payment data is null");
        assert!(effects.try_recv().is_none());
        assert_eq!(status.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_twint_new_action_cancels_previous_poll() {
        let status = ScriptedStatus::new(&[]);
        let delegate = TwintDelegate::new(&context(status.clone()));
        let mut details = delegate.outputs().details().take_receiver().unwrap();

        delegate.handle_action(twint_action_for(Some("pd1"), false)).await;
        delegate.handle_sdk_result(SdkResult::Twint(TwintResult::Success)).await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        delegate.handle_action(twint_action_for(Some("pd2"), false)).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let pd1_calls = status.calls_for("pd1");
        assert!(pd1_calls > 0);
        tokio::time::sleep(Duration::from_secs(20)).await;

        assert_eq!(status.calls_for("pd1"), pd1_calls);
        assert_eq!(status.calls_for("pd2"), 0);
        assert!(!delegate.is_polling());
        assert!(!delegate.core.actions.is_polling().await.unwrap());
        assert_eq!(
            delegate.core.payment_data.payment_data().await.unwrap().as_deref(),
            Some("pd2")
        );
        assert!(details.try_recv().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_twint_resumes_polling_after_recreation() {
        let status = ScriptedStatus::new(&[("authorised", Some("abc"))]);
        let ctx = context(status.clone());
        let first = TwintDelegate::new(&ctx);
        first.core.payment_data.set_payment_data(Some("pd1")).await.unwrap();
        first.core.actions.set_polling().await.unwrap();
        first.on_cleared();

        let delegate = TwintDelegate::new(&ctx);
        let mut details = delegate.outputs().details().take_receiver().unwrap();
        delegate.initialize().await;

        assert_eq!(
            details.recv().await.unwrap().details,
            serde_json::json!({ "payload": "abc" })
        );
        assert_eq!(status.calls_for("pd1"), 1);
    }

    #[tokio::test]
    async fn test_wechat_result_code() {
        let delegate = WeChatPayDelegate::new(&context(ScriptedStatus::new(&[])));
        let mut effects = delegate.outputs().effects().take_receiver().unwrap();
        let mut details = delegate.outputs().details().take_receiver().unwrap();

        delegate.handle_action(wechat_action()).await;
        assert!(matches!(
            effects.recv().await.unwrap(),
            ActionEffect::LaunchSdk(SdkLaunch::WeChatPay(_))
        ));

        delegate.handle_sdk_result(SdkResult::WeChatPay { err_code: 0 }).await;
        let data = details.recv().await.unwrap();
        assert_eq!(data.details, serde_json::json!({ "resultCode": 0 }));
        assert_eq!(data.payment_data.as_deref(), Some("pd1"));
    }

    #[tokio::test]
    async fn test_wechat_launch_failure() {
        let delegate = WeChatPayDelegate::new(&context(ScriptedStatus::new(&[])));
        let mut errors = delegate.outputs().exceptions().take_receiver().unwrap();

        delegate.handle_action(wechat_action()).await;
        delegate
            .handle_sdk_result(SdkResult::LaunchFailed("no app".into()))
            .await;

        assert_eq!(
            errors.recv().await.unwrap().to_string(),
            "Failed to initialize WeChat app"
        );
    }

    #[test]
    fn test_can_handle_by_payment_method() {
        let ctx = context(ScriptedStatus::new(&[]));
        assert!(TwintDelegate::new(&ctx).can_handle(&twint_action(false)));
        assert!(!TwintDelegate::new(&ctx).can_handle(&wechat_action()));
        assert!(WeChatPayDelegate::new(&ctx).can_handle(&wechat_action()));
    }
}
