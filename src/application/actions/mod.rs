//! Action delegates.
//!
//! Each delegate turns one kind of [`Action`] into a `details` payload or an
//! error. Delegates report through [`ActionOutputs`]; anything the host must
//! do (open a URL, start a native SDK) is published as an [`ActionEffect`].
//!
//! ```text
//! Idle -> ActionReceived -> Resolving | Polling -> Terminal(details) | Terminal(error)
//! ```

mod delegate_core;
pub mod awaiting;
pub mod generic;
pub mod qr_code;
pub mod redirect;
pub mod sdk;
pub mod threeds2;

#[cfg(test)]
mod testing;

use crate::application::analytics::AnalyticsManager;
use crate::application::channel::EventChannel;
use crate::application::status_repository::StatusRepository;
use crate::domain::action::{Action, WeChatPaySdkData};
use crate::domain::payment::ActionComponentData;
use crate::domain::ports::{NativeRedirectServiceRef, StateStoreRef};
use crate::error::CheckoutError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use url::Url;

pub use self::threeds2::{
    AuthenticationRequestParameters, ChallengeResult, ChallengeToken, FingerprintResult,
    FingerprintToken,
};

pub const PAYLOAD_DETAILS_KEY: &str = "payload";

const EXCEPTIONS_CAPACITY: usize = 16;
const OUTPUT_DATA_CAPACITY: usize = 32;

/// Work the host has to perform on behalf of a delegate.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionEffect {
    OpenUrl(Url),
    LaunchSdk(SdkLaunch),
    IdentifyShopper {
        token: FingerprintToken,
        submit_automatically: bool,
    },
    ChallengeShopper(ChallengeToken),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SdkLaunch {
    Twint(TwintFlowType),
    WeChatPay(WeChatPaySdkData),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TwintFlowType {
    OneTime(String),
    Recurring(String),
}

/// Result reported by a native SDK the host launched.
#[derive(Debug, Clone, PartialEq)]
pub enum SdkResult {
    Twint(TwintResult),
    WeChatPay { err_code: i32 },
    /// The native SDK could not be started.
    LaunchFailed(String),
    Threeds2Fingerprint(FingerprintResult),
    Threeds2Challenge(ChallengeResult),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TwintResult {
    Success,
    Error,
    AppNotInstalled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionViewType {
    Redirect,
    Await,
    SimpleQrCode,
    FullQrCode,
    Sdk,
    Threeds2,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwaitOutputData {
    pub is_valid: bool,
    pub payment_method_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrCodeOutputData {
    pub is_valid: bool,
    pub payment_method_type: Option<String>,
    pub qr_code_data: Option<String>,
    pub qr_image_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerData {
    pub millis_until_finished: u64,
    pub progress_percentage: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutputData {
    Await(AwaitOutputData),
    QrCode(QrCodeOutputData),
    Timer(TimerData),
}

impl ActionOutputData {
    /// Whether the output reflects a terminal status.
    pub fn is_valid(&self) -> bool {
        match self {
            ActionOutputData::Await(o) => o.is_valid,
            ActionOutputData::QrCode(o) => o.is_valid,
            ActionOutputData::Timer(_) => false,
        }
    }
}

/// Everything a delegate publishes. Clones share the same channels, which
/// lets the generic delegate hand one set to every child.
#[derive(Clone)]
pub struct ActionOutputs {
    details: EventChannel<ActionComponentData>,
    exceptions: EventChannel<CheckoutError>,
    output_data: EventChannel<ActionOutputData>,
    effects: EventChannel<ActionEffect>,
    view: Arc<watch::Sender<Option<ActionViewType>>>,
}

impl Default for ActionOutputs {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionOutputs {
    pub fn new() -> Self {
        let (view, _) = watch::channel(None);
        Self {
            details: EventChannel::unbounded(),
            exceptions: EventChannel::drop_oldest(EXCEPTIONS_CAPACITY),
            output_data: EventChannel::drop_oldest(OUTPUT_DATA_CAPACITY),
            effects: EventChannel::unbounded(),
            view: Arc::new(view),
        }
    }

    pub fn details(&self) -> &EventChannel<ActionComponentData> {
        &self.details
    }

    pub fn exceptions(&self) -> &EventChannel<CheckoutError> {
        &self.exceptions
    }

    pub fn output_data(&self) -> &EventChannel<ActionOutputData> {
        &self.output_data
    }

    pub fn effects(&self) -> &EventChannel<ActionEffect> {
        &self.effects
    }

    pub fn view(&self) -> watch::Receiver<Option<ActionViewType>> {
        self.view.subscribe()
    }

    pub(crate) fn set_view(&self, view: Option<ActionViewType>) {
        self.view.send_replace(view);
    }
}

/// Collaborators shared by every delegate.
#[derive(Clone)]
pub struct DelegateContext {
    pub store: StateStoreRef,
    pub status: StatusRepository,
    pub native_redirect: Option<NativeRedirectServiceRef>,
    pub analytics: Option<AnalyticsManager>,
    /// Base of the environment, used for QR image links.
    pub base_url: Option<Url>,
    /// Parent scope. Cancelling it clears every delegate created from this context.
    pub scope: CancellationToken,
}

impl DelegateContext {
    pub fn new(store: StateStoreRef, status: StatusRepository) -> Self {
        Self {
            store,
            status,
            native_redirect: None,
            analytics: None,
            base_url: None,
            scope: CancellationToken::new(),
        }
    }

    pub fn with_native_redirect(mut self, service: NativeRedirectServiceRef) -> Self {
        self.native_redirect = Some(service);
        self
    }

    pub fn with_analytics(mut self, analytics: AnalyticsManager) -> Self {
        self.analytics = Some(analytics);
        self
    }

    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }
}

#[async_trait]
pub trait ActionDelegate: Send + Sync {
    fn outputs(&self) -> &ActionOutputs;

    fn can_handle(&self, action: &Action) -> bool;

    /// Restores a saved action, resuming polling where it was active.
    async fn initialize(&self);

    async fn handle_action(&self, action: Action);

    /// Cancels all work. Nothing is emitted afterwards.
    fn on_cleared(&self);

    fn as_redirect_handler(&self) -> Option<&dyn RedirectHandling> {
        None
    }

    fn as_sdk_result_handler(&self) -> Option<&dyn SdkResultHandling> {
        None
    }

    fn as_status_poller(&self) -> Option<&dyn StatusPolling> {
        None
    }
}

/// Delegates that resolve through a return URL.
#[async_trait]
pub trait RedirectHandling: Send + Sync {
    async fn handle_redirect(&self, return_url: &str);
}

/// Delegates that wait for a native SDK callback.
#[async_trait]
pub trait SdkResultHandling: Send + Sync {
    async fn handle_sdk_result(&self, result: SdkResult);
}

/// Delegates that poll the payment status.
#[async_trait]
pub trait StatusPolling: Send + Sync {
    /// Requests an immediate status check, e.g. when the app resumes.
    async fn refresh_status(&self);
}
