//! `redirect` and `nativeRedirect` actions.
//!
//! The host opens the URL; the shopper comes back through a return URL that
//! is handed to [`RedirectHandling::handle_redirect`]. For native redirects
//! the return query is first exchanged for a `redirectResult`.

use super::delegate_core::DelegateCore;
use super::{
    ActionDelegate, ActionEffect, ActionOutputs, ActionViewType, DelegateContext,
    RedirectHandling,
};
use crate::domain::action::{Action, RedirectAction};
use crate::domain::analytics::{ErrorEvent, GenericEvents};
use crate::domain::payment::ActionComponentData;
use crate::domain::ports::{NativeRedirectRequest, NativeRedirectServiceRef};
use crate::error::{CheckoutError, Result};
use crate::infrastructure::redirect::{
    parse_redirect_result, validate_redirect_url, QUERY_STRING_RESULT,
};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

pub struct RedirectDelegate {
    core: Arc<DelegateCore>,
    native_redirect: Option<NativeRedirectServiceRef>,
}

impl RedirectDelegate {
    pub fn new(ctx: &DelegateContext) -> Self {
        Self::with_outputs(ctx, ActionOutputs::new())
    }

    pub fn with_outputs(ctx: &DelegateContext, outputs: ActionOutputs) -> Self {
        let core = DelegateCore::new(ctx, outputs, "redirect");
        core.set_view(ActionViewType::Redirect);
        Self {
            core,
            native_redirect: ctx.native_redirect.clone(),
        }
    }

    async fn try_handle_action(&self, action: Action) -> Result<()> {
        let redirect = match &action {
            Action::Redirect(redirect) | Action::NativeRedirect(redirect) => redirect,
            _ => return Err(CheckoutError::component("Unsupported action")),
        };
        self.core.actions.set_action(&action).await?;
        if matches!(action, Action::NativeRedirect(_)) {
            self.core
                .payment_data
                .set_native_redirect_data(redirect.native_redirect_data.as_deref())
                .await?;
        } else {
            self.core
                .payment_data
                .set_payment_data(redirect.payment_data.as_deref())
                .await?;
        }
        self.core.track_action(&action);

        match validate_redirect_url(redirect.url.as_deref()) {
            Ok(url) => {
                debug!(%url, "Redirecting");
                self.core.emit_effect(ActionEffect::OpenUrl(url));
                Ok(())
            }
            Err(e) => {
                self.core.track(GenericEvents::error(
                    redirect.payment_method_type.clone().unwrap_or_default(),
                    ErrorEvent::RedirectFailed,
                ));
                Err(e)
            }
        }
    }

    async fn try_handle_redirect(&self, return_url: &str) -> Result<()> {
        let action = self.core.actions.action().await?;
        let payment_method_type = action
            .as_ref()
            .and_then(Action::payment_method_type)
            .unwrap_or_default()
            .to_owned();

        let details = match parse_redirect_result(return_url) {
            Ok(details) => details,
            Err(e) => {
                self.core.track(GenericEvents::error(
                    payment_method_type,
                    ErrorEvent::RedirectParseFailed,
                ));
                return Err(e);
            }
        };

        let data = if matches!(action, Some(Action::NativeRedirect(_))) {
            self.exchange_native_redirect(details, payment_method_type)
                .await?
        } else {
            let payment_data = self.core.payment_data.payment_data().await?;
            ActionComponentData::new(Value::Object(details), payment_data)
        };
        self.core.finish(data).await;
        Ok(())
    }

    async fn exchange_native_redirect(
        &self,
        details: Map<String, Value>,
        payment_method_type: String,
    ) -> Result<ActionComponentData> {
        let service = self
            .native_redirect
            .as_ref()
            .ok_or_else(|| CheckoutError::checkout("Native redirect service is not configured"))?;
        let redirect_data = self
            .core
            .payment_data
            .native_redirect_data()
            .await?
            .unwrap_or_default();
        let return_query_string = details
            .get(QUERY_STRING_RESULT)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();

        let response = service
            .make_native_redirect(NativeRedirectRequest {
                redirect_data,
                return_query_string,
            })
            .await
            .inspect_err(|_| {
                self.core.track(GenericEvents::error(
                    payment_method_type,
                    ErrorEvent::ApiNativeRedirect,
                ));
            })?;
        Ok(ActionComponentData::new(serde_json::to_value(response)?, None))
    }
}

#[async_trait]
impl ActionDelegate for RedirectDelegate {
    fn outputs(&self) -> &ActionOutputs {
        &self.core.outputs
    }

    fn can_handle(&self, action: &Action) -> bool {
        matches!(action, Action::Redirect(_) | Action::NativeRedirect(_))
    }

    /// Nothing to resume: the shopper's return URL drives the flow.
    async fn initialize(&self) {}

    async fn handle_action(&self, action: Action) {
        if let Err(e) = self.try_handle_action(action).await {
            self.core.fail(e).await;
        }
    }

    fn on_cleared(&self) {
        self.core.clear();
    }

    fn as_redirect_handler(&self) -> Option<&dyn RedirectHandling> {
        Some(self)
    }
}

#[async_trait]
impl RedirectHandling for RedirectDelegate {
    async fn handle_redirect(&self, return_url: &str) {
        if let Err(e) = self.try_handle_redirect(return_url).await {
            self.core.fail(e).await;
        }
    }
}
