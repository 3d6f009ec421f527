//! `qrCode` actions.
//!
//! For `pix`, `paynow` and `upi_qr` the QR code is rendered by the host while
//! the status is polled and a countdown runs. Any other payment method is a
//! plain redirect to the action's `url`.

use super::delegate_core::{DelegateCore, MissingPayload};
use super::{
    ActionDelegate, ActionEffect, ActionOutputData, ActionOutputs, ActionViewType,
    DelegateContext, QrCodeOutputData, RedirectHandling, StatusPolling, TimerData,
};
use crate::application::status_repository::StatusRepository;
use crate::domain::action::{payment_method_types, Action, QrCodeAction};
use crate::domain::analytics::{ErrorEvent, GenericEvents};
use crate::domain::payment::ActionComponentData;
use crate::error::{CheckoutError, Result};
use crate::infrastructure::redirect::{parse_redirect_result, validate_redirect_url};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use url::Url;

const TIMER_TICK: Duration = Duration::from_secs(1);
const QR_IMAGE_PATH: &str = "barcode.shtml";

/// How a QR payment method is presented, and for how long it is polled.
fn qr_view(payment_method_type: Option<&str>) -> Option<(ActionViewType, Duration)> {
    match payment_method_type? {
        payment_method_types::PIX => Some((ActionViewType::SimpleQrCode, Duration::from_secs(15 * 60))),
        payment_method_types::PAY_NOW => Some((ActionViewType::FullQrCode, Duration::from_secs(3 * 60))),
        payment_method_types::UPI_QR => Some((ActionViewType::FullQrCode, Duration::from_secs(5 * 60))),
        _ => None,
    }
}

fn timer_data(left: Duration, max: Duration) -> TimerData {
    let millis_until_finished = left.as_millis() as u64;
    let max_millis = max.as_millis().max(1) as u64;
    TimerData {
        millis_until_finished,
        progress_percentage: (100 * millis_until_finished / max_millis) as u8,
    }
}

fn qr_image_url(base_url: &Url, qr_code_data: &str) -> Result<String> {
    let mut url = base_url.join(QR_IMAGE_PATH)?;
    url.query_pairs_mut()
        .append_pair("barcodeType", "qrCode")
        .append_pair("fileType", "png")
        .append_pair("data", qr_code_data);
    Ok(url.into())
}

pub struct QrCodeDelegate {
    core: Arc<DelegateCore>,
    status: StatusRepository,
    base_url: Option<Url>,
}

impl QrCodeDelegate {
    pub fn new(ctx: &DelegateContext) -> Self {
        Self::with_outputs(ctx, ActionOutputs::new())
    }

    pub fn with_outputs(ctx: &DelegateContext, outputs: ActionOutputs) -> Self {
        Self {
            core: DelegateCore::new(ctx, outputs, "qrCode"),
            status: ctx.status.clone(),
            base_url: ctx.base_url.clone(),
        }
    }

    pub fn is_polling(&self) -> bool {
        self.core.has_active_job()
    }

    async fn try_handle_action(&self, action: QrCodeAction) -> Result<()> {
        let saved = Action::QrCode(action.clone());
        self.core.actions.set_action(&saved).await?;
        self.core
            .payment_data
            .set_payment_data(action.payment_data.as_deref())
            .await?;
        self.core.track_action(&saved);

        match qr_view(action.payment_method_type.as_deref()) {
            Some((view, max_duration)) => {
                self.core.set_view(view);
                self.start_polling(action, max_duration).await
            }
            None => {
                self.core.set_view(ActionViewType::Redirect);
                match validate_redirect_url(action.url.as_deref()) {
                    Ok(url) => {
                        self.core.emit_effect(ActionEffect::OpenUrl(url));
                        Ok(())
                    }
                    Err(e) => {
                        self.core.track(GenericEvents::error(
                            action.payment_method_type.unwrap_or_default(),
                            ErrorEvent::RedirectFailed,
                        ));
                        Err(e)
                    }
                }
            }
        }
    }

    async fn start_polling(&self, action: QrCodeAction, max_duration: Duration) -> Result<()> {
        let payment_data = action
            .payment_data
            .clone()
            .ok_or_else(|| CheckoutError::component("Payment data is null"))?;
        let qr_image_url = match (&self.base_url, action.qr_code_data.as_deref()) {
            (Some(base), Some(data)) => Some(qr_image_url(base, data)?),
            _ => None,
        };
        self.core.actions.set_polling().await?;

        let job = self.core.restart_job();
        self.start_timer(job.clone(), max_duration);

        let stream = self.status.poll(payment_data, max_duration);
        self.core.spawn_polling(
            stream,
            job,
            MissingPayload::NotCompleted,
            move |core, response| {
                core.emit_output(ActionOutputData::QrCode(QrCodeOutputData {
                    is_valid: response.is_final(),
                    payment_method_type: action.payment_method_type.clone(),
                    qr_code_data: action.qr_code_data.clone(),
                    qr_image_url: qr_image_url.clone(),
                }));
            },
        );
        Ok(())
    }

    fn start_timer(&self, job: CancellationToken, max_duration: Duration) {
        let core = Arc::clone(&self.core);
        self.core.spawn(async move {
            let started = Instant::now();
            let mut ticker = tokio::time::interval(TIMER_TICK);
            loop {
                tokio::select! {
                    biased;
                    _ = job.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let left = max_duration.saturating_sub(started.elapsed());
                trace!(?left, "Countdown tick");
                core.emit_output(ActionOutputData::Timer(timer_data(left, max_duration)));
                if left.is_zero() {
                    break;
                }
            }
        });
    }

    async fn try_handle_redirect(&self, return_url: &str) -> Result<()> {
        let details = match parse_redirect_result(return_url) {
            Ok(details) => details,
            Err(e) => {
                self.core.track(GenericEvents::error(
                    self.payment_method_type().await,
                    ErrorEvent::RedirectParseFailed,
                ));
                return Err(e);
            }
        };
        let payment_data = self.core.payment_data.payment_data().await?;
        self.core
            .finish(ActionComponentData::new(Value::Object(details), payment_data))
            .await;
        Ok(())
    }

    async fn payment_method_type(&self) -> String {
        match self.core.actions.action().await {
            Ok(Some(action)) => action.payment_method_type().unwrap_or_default().to_owned(),
            _ => String::new(),
        }
    }
}

#[async_trait]
impl ActionDelegate for QrCodeDelegate {
    fn outputs(&self) -> &ActionOutputs {
        &self.core.outputs
    }

    fn can_handle(&self, action: &Action) -> bool {
        matches!(action, Action::QrCode(_))
    }

    async fn initialize(&self) {
        let action = match self.core.actions.action().await {
            Ok(Some(Action::QrCode(action))) => action,
            Ok(_) => return,
            Err(e) => return self.core.fail(e).await,
        };
        let Some((view, max_duration)) = qr_view(action.payment_method_type.as_deref()) else {
            self.core.set_view(ActionViewType::Redirect);
            return;
        };
        debug!("Restoring QR code action");
        self.core.set_view(view);
        if let Err(e) = self.start_polling(action, max_duration).await {
            self.core.fail(e).await;
        }
    }

    async fn handle_action(&self, action: Action) {
        let Action::QrCode(action) = action else {
            return self.core.fail(CheckoutError::component("Unsupported action")).await;
        };
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

    fn as_status_poller(&self) -> Option<&dyn StatusPolling> {
        Some(self)
    }
}

#[async_trait]
impl RedirectHandling for QrCodeDelegate {
    async fn handle_redirect(&self, return_url: &str) {
        if let Err(e) = self.try_handle_redirect(return_url).await {
            self.core.fail(e).await;
        }
    }
}

#[async_trait]
impl StatusPolling for QrCodeDelegate {
    async fn refresh_status(&self) {
        if !self.core.has_active_job() {
            return;
        }
        if let Ok(Some(payment_data)) = self.core.payment_data.payment_data().await {
            self.status.refresh_status(&payment_data);
        }
    }
}
