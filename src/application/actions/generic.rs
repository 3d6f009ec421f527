//! Dispatches any [`Action`] to the delegate that handles it.
//!
//! Every child shares the generic delegate's [`ActionOutputs`], so the host
//! subscribes once. A new action replaces the current child, except that a
//! 3DS2 challenge continues the transaction of the 3DS2 delegate that ran
//! the fingerprint step.

use super::awaiting::AwaitDelegate;
use super::delegate_core::DelegateCore;
use super::qr_code::QrCodeDelegate;
use super::redirect::RedirectDelegate;
use super::sdk::{TwintDelegate, WeChatPayDelegate};
use super::threeds2::Threeds2Delegate;
use super::{
    ActionDelegate, ActionOutputs, DelegateContext, RedirectHandling, SdkResult,
    SdkResultHandling, StatusPolling,
};
use crate::domain::action::{payment_method_types, Action, Threeds2SubType};
use crate::error::CheckoutError;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

/// Builds the child delegate for an action.
pub trait ActionDelegateProvider: Send + Sync {
    fn supports(&self, action: &Action) -> bool;

    fn create(
        &self,
        action: &Action,
        ctx: &DelegateContext,
        outputs: &ActionOutputs,
    ) -> Option<Arc<dyn ActionDelegate>>;
}

/// Provider for every built-in action type.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultDelegateProvider;

impl ActionDelegateProvider for DefaultDelegateProvider {
    fn supports(&self, action: &Action) -> bool {
        match action {
            Action::Sdk(sdk) => matches!(
                sdk.payment_method_type.as_deref(),
                Some(payment_method_types::TWINT | payment_method_types::WECHAT_PAY_SDK)
            ),
            _ => true,
        }
    }

    fn create(
        &self,
        action: &Action,
        ctx: &DelegateContext,
        outputs: &ActionOutputs,
    ) -> Option<Arc<dyn ActionDelegate>> {
        let outputs = outputs.clone();
        let delegate: Arc<dyn ActionDelegate> = match action {
            Action::Redirect(_) | Action::NativeRedirect(_) => {
                Arc::new(RedirectDelegate::with_outputs(ctx, outputs))
            }
            Action::Await(_) => Arc::new(AwaitDelegate::with_outputs(ctx, outputs)),
            Action::QrCode(_) => Arc::new(QrCodeDelegate::with_outputs(ctx, outputs)),
            Action::Sdk(sdk) => match sdk.payment_method_type.as_deref()? {
                payment_method_types::TWINT => Arc::new(TwintDelegate::with_outputs(ctx, outputs)),
                payment_method_types::WECHAT_PAY_SDK => {
                    Arc::new(WeChatPayDelegate::with_outputs(ctx, outputs))
                }
                _ => return None,
            },
            Action::Threeds2Fingerprint(_) | Action::Threeds2Challenge(_) | Action::Threeds2(_) => {
                Arc::new(Threeds2Delegate::with_outputs(ctx, outputs))
            }
        };
        Some(delegate)
    }
}

impl DefaultDelegateProvider {
    /// Name of the delegate [`create`](ActionDelegateProvider::create) would build.
    pub fn delegate_name(&self, action: &Action) -> Option<&'static str> {
        let name = match action {
            Action::Redirect(_) | Action::NativeRedirect(_) => "redirect",
            Action::Await(_) => "await",
            Action::QrCode(_) => "qrCode",
            Action::Sdk(sdk) => match sdk.payment_method_type.as_deref()? {
                payment_method_types::TWINT => "twint",
                payment_method_types::WECHAT_PAY_SDK => "wechatpay",
                _ => return None,
            },
            Action::Threeds2Fingerprint(_) | Action::Threeds2Challenge(_) | Action::Threeds2(_) => {
                "threeds2"
            }
        };
        Some(name)
    }
}

/// Whether `action` continues a 3DS2 transaction instead of starting a new flow.
fn is_threeds2_challenge(action: &Action) -> bool {
    match action {
        Action::Threeds2Challenge(_) => true,
        Action::Threeds2(a) => a
            .subtype
            .as_deref()
            .and_then(|s| Threeds2SubType::parse(s).ok())
            == Some(Threeds2SubType::Challenge),
        _ => false,
    }
}

pub struct GenericActionDelegate {
    ctx: DelegateContext,
    core: Arc<DelegateCore>,
    provider: Arc<dyn ActionDelegateProvider>,
    current: Mutex<Option<Arc<dyn ActionDelegate>>>,
}

impl GenericActionDelegate {
    pub fn new(ctx: &DelegateContext) -> Self {
        Self::with_provider(ctx, Arc::new(DefaultDelegateProvider))
    }

    pub fn with_provider(ctx: &DelegateContext, provider: Arc<dyn ActionDelegateProvider>) -> Self {
        Self {
            ctx: ctx.clone(),
            core: DelegateCore::new(ctx, ActionOutputs::new(), "generic"),
            provider,
            current: Mutex::new(None),
        }
    }

    fn current(&self) -> Option<Arc<dyn ActionDelegate>> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace_current(&self, delegate: Option<Arc<dyn ActionDelegate>>) {
        let previous = std::mem::replace(
            &mut *self.current.lock().unwrap_or_else(PoisonError::into_inner),
            delegate,
        );
        if let Some(previous) = previous {
            previous.on_cleared();
        }
    }

    /// Reuses the current delegate for a 3DS2 challenge, otherwise builds a new one.
    fn delegate_for(&self, action: &Action) -> Option<Arc<dyn ActionDelegate>> {
        if let Some(current) = self.current()
            && is_threeds2_challenge(action)
            && current.can_handle(action)
        {
            debug!("Continuing 3DS2 transaction with the current delegate");
            return Some(current);
        }
        let delegate = self.provider.create(action, &self.ctx, &self.core.outputs)?;
        self.replace_current(Some(delegate.clone()));
        Some(delegate)
    }

    /// Whether a child delegate is active.
    pub fn has_delegate(&self) -> bool {
        self.current().is_some()
    }
}

#[async_trait]
impl ActionDelegate for GenericActionDelegate {
    fn outputs(&self) -> &ActionOutputs {
        &self.core.outputs
    }

    fn can_handle(&self, action: &Action) -> bool {
        self.provider.supports(action)
    }

    async fn initialize(&self) {
        let action = match self.core.actions.action().await {
            Ok(Some(action)) => action,
            Ok(None) => return,
            Err(e) => return self.core.emit_error(e),
        };
        debug!(action_type = action.type_name(), "Restoring action delegate");
        let Some(delegate) = self.provider.create(&action, &self.ctx, &self.core.outputs) else {
            return;
        };
        self.replace_current(Some(delegate.clone()));
        delegate.initialize().await;
    }

    async fn handle_action(&self, action: Action) {
        if let Err(e) = self.core.actions.set_action(&action).await {
            warn!(error = %e, "Failed to save action");
        }
        let Some(delegate) = self.delegate_for(&action) else {
            self.replace_current(None);
            return self.core.fail(CheckoutError::component("Unsupported action")).await;
        };
        delegate.handle_action(action).await;
    }

    fn on_cleared(&self) {
        self.replace_current(None);
        self.core.clear();
    }

    fn as_redirect_handler(&self) -> Option<&dyn RedirectHandling> {
        Some(self)
    }

    fn as_sdk_result_handler(&self) -> Option<&dyn SdkResultHandling> {
        Some(self)
    }

    fn as_status_poller(&self) -> Option<&dyn StatusPolling> {
        Some(self)
    }
}

#[async_trait]
impl RedirectHandling for GenericActionDelegate {
    async fn handle_redirect(&self, return_url: &str) {
        let Some(current) = self.current() else {
            return self.core.emit_error(CheckoutError::checkout(
                "handle_redirect should not be called before handle_action",
            ));
        };
        match current.as_redirect_handler() {
            Some(handler) => handler.handle_redirect(return_url).await,
            None => self.core.emit_error(CheckoutError::checkout(
                "Cannot handle redirect with the current component",
            )),
        }
    }
}

#[async_trait]
impl SdkResultHandling for GenericActionDelegate {
    async fn handle_sdk_result(&self, result: SdkResult) {
        let Some(current) = self.current() else {
            return self.core.emit_error(CheckoutError::checkout(
                "handle_sdk_result should not be called before handle_action",
            ));
        };
        match current.as_sdk_result_handler() {
            Some(handler) => handler.handle_sdk_result(result).await,
            None => self.core.emit_error(CheckoutError::checkout(
                "Cannot handle SDK result with the current component",
            )),
        }
    }
}

#[async_trait]
impl StatusPolling for GenericActionDelegate {
    async fn refresh_status(&self) {
        if let Some(poller) = self.current().as_deref().and_then(|c| c.as_status_poller()) {
            poller.refresh_status().await;
        }
    }
}
