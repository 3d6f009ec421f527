//! 3D Secure 2 actions.
//!
//! Handles the legacy `threeDS2Fingerprint` / `threeDS2Challenge` pair and
//! the combined `threeDS2` action, whose `subtype` says which step it is.
//! The native 3DS2 SDK runs in the host: the delegate decodes the tokens,
//! asks the host to identify or challenge the shopper, and turns the SDK
//! results into details.

use super::delegate_core::DelegateCore;
use super::{
    ActionDelegate, ActionEffect, ActionOutputs, ActionViewType, DelegateContext, SdkResult,
    SdkResultHandling,
};
use crate::application::saved_state::AUTHORIZATION_TOKEN_KEY;
use crate::domain::action::{Action, Threeds2SubType};
use crate::domain::analytics::{ErrorEvent, GenericEvents};
use crate::domain::payment::ActionComponentData;
use crate::error::{CheckoutError, Result};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

pub const FINGERPRINT_DETAILS_KEY: &str = "threeds2.fingerprint";
pub const CHALLENGE_DETAILS_KEY: &str = "threeds2.challengeResult";
pub const THREEDS_RESULT_KEY: &str = "threeDSResult";

const COMPONENT: &str = "threeDS2";

/// Decoded `threeDS2Fingerprint` token.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FingerprintToken {
    pub directory_server_id: Option<String>,
    pub directory_server_public_key: Option<String>,
    pub directory_server_root_certificates: Option<String>,
    #[serde(rename = "threeDSServerTransID")]
    pub three_ds_server_trans_id: Option<String>,
    #[serde(rename = "threeDSMessageVersion")]
    pub three_ds_message_version: Option<String>,
}

/// Decoded `threeDS2Challenge` token.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeToken {
    pub acs_reference_number: Option<String>,
    pub acs_signed_content: Option<String>,
    #[serde(rename = "acsTransID")]
    pub acs_trans_id: Option<String>,
    #[serde(rename = "acsURL")]
    pub acs_url: Option<String>,
    pub message_version: Option<String>,
    #[serde(rename = "threeDSServerTransID")]
    pub three_ds_server_trans_id: Option<String>,
}

/// Device data collected by the 3DS2 SDK.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationRequestParameters {
    #[serde(rename = "sdkAppID")]
    pub sdk_app_id: String,
    #[serde(rename = "sdkEncData")]
    pub sdk_enc_data: String,
    #[serde(rename = "sdkEphemPubKey")]
    pub sdk_ephem_pub_key: Value,
    #[serde(rename = "sdkReferenceNumber")]
    pub sdk_reference_number: String,
    #[serde(rename = "sdkTransID")]
    pub sdk_trans_id: String,
    #[serde(rename = "messageVersion")]
    pub message_version: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FingerprintResult {
    Success(AuthenticationRequestParameters),
    /// The SDK transaction could not be created. The result is still sent
    /// to the backend, which decides how to continue.
    InitializeFailure {
        transaction_status: String,
        additional_details: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeResult {
    Completed {
        transaction_status: String,
    },
    Cancelled,
    Timeout {
        transaction_status: String,
        additional_details: Option<String>,
    },
    Error {
        transaction_status: String,
        additional_details: Option<String>,
    },
}

fn decode_token<T: DeserializeOwned>(token: &str) -> Result<T> {
    let bytes = STANDARD
        .decode(token)
        .map_err(|e| CheckoutError::component_with("Failed to decode token", e))?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn encode_details(value: &Value) -> Result<String> {
    Ok(STANDARD.encode(serde_json::to_vec(value)?))
}

/// Builds the challenge result details. With an authorisation token the
/// combined `threeDSResult` form is used.
fn challenge_details(
    transaction_status: &str,
    error_details: Option<&str>,
    authorisation_token: Option<&str>,
) -> Result<Value> {
    let mut result = Map::new();
    result.insert("transStatus".into(), transaction_status.into());
    let key = match authorisation_token {
        Some(token) => {
            result.insert("authorisationToken".into(), token.into());
            THREEDS_RESULT_KEY
        }
        None => CHALLENGE_DETAILS_KEY,
    };
    if let Some(error_details) = error_details {
        result.insert("errorDetails".into(), error_details.into());
    }
    let encoded = encode_details(&Value::Object(result))?;
    Ok(json!({ key: encoded }))
}

fn fingerprint_details(parameters: &AuthenticationRequestParameters) -> Result<Value> {
    let encoded = encode_details(&serde_json::to_value(parameters)?)?;
    Ok(json!({ FINGERPRINT_DETAILS_KEY: encoded }))
}

pub struct Threeds2Delegate {
    core: Arc<DelegateCore>,
    /// Message version of the SDK transaction opened by the fingerprint step.
    transaction: Mutex<Option<String>>,
}

impl Threeds2Delegate {
    pub fn new(ctx: &DelegateContext) -> Self {
        Self::with_outputs(ctx, ActionOutputs::new())
    }

    pub fn with_outputs(ctx: &DelegateContext, outputs: ActionOutputs) -> Self {
        Self {
            core: DelegateCore::new(ctx, outputs, "threeds2"),
            transaction: Mutex::new(None),
        }
    }

    /// Whether a fingerprint step opened a transaction a challenge can continue.
    pub fn has_transaction(&self) -> bool {
        self.transaction
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn set_transaction(&self, message_version: Option<String>) {
        *self.transaction.lock().unwrap_or_else(PoisonError::into_inner) = message_version;
    }

    async fn try_handle_action(&self, action: Action) -> Result<()> {
        let (token, step, submit_automatically) = match &action {
            Action::Threeds2Fingerprint(a) => (
                a.token
                    .clone()
                    .ok_or_else(|| CheckoutError::component("Fingerprint token not found."))?,
                Threeds2SubType::Fingerprint,
                false,
            ),
            Action::Threeds2Challenge(a) => (
                a.token
                    .clone()
                    .ok_or_else(|| CheckoutError::component("Challenge token not found."))?,
                Threeds2SubType::Challenge,
                false,
            ),
            Action::Threeds2(a) => {
                let token = a
                    .token
                    .clone()
                    .ok_or_else(|| CheckoutError::component("3DS2 token not found."))?;
                let subtype = a
                    .subtype
                    .as_deref()
                    .ok_or_else(|| CheckoutError::component("3DS2 Action subtype not found."))?;
                (token, Threeds2SubType::parse(subtype)?, true)
            }
            _ => return Err(CheckoutError::component("Unsupported action")),
        };

        self.core.actions.set_action(&action).await?;
        self.core
            .payment_data
            .set_payment_data(action.payment_data())
            .await?;
        if let Action::Threeds2(a) = &action {
            match &a.authorisation_token {
                Some(token) => {
                    self.core
                        .store
                        .put(AUTHORIZATION_TOKEN_KEY, Value::from(token.as_str()))
                        .await?
                }
                None => self.core.store.remove(AUTHORIZATION_TOKEN_KEY).await?,
            }
        }
        self.core.track_action(&action);
        self.core.set_view(ActionViewType::Threeds2);

        match step {
            Threeds2SubType::Fingerprint => self.identify_shopper(&token, submit_automatically),
            Threeds2SubType::Challenge => self.challenge_shopper(&token),
        }
    }

    fn identify_shopper(&self, encoded_token: &str, submit_automatically: bool) -> Result<()> {
        let token: FingerprintToken = decode_token(encoded_token).map_err(|e| {
            self.core.track(GenericEvents::error(
                COMPONENT,
                ErrorEvent::Threeds2TokenDecoding,
            ));
            CheckoutError::component_with("Failed to decode fingerprint token", e)
        })?;
        let message_version = token.three_ds_message_version.clone().ok_or_else(|| {
            CheckoutError::component(
                "Failed to create 3DS2 Transaction. Missing threeDSMessageVersion inside fingerprintToken.",
            )
        })?;
        debug!(%message_version, "Identifying shopper");
        self.set_transaction(Some(message_version));
        self.core.emit_effect(ActionEffect::IdentifyShopper {
            token,
            submit_automatically,
        });
        Ok(())
    }

    fn challenge_shopper(&self, encoded_token: &str) -> Result<()> {
        let token: ChallengeToken = decode_token(encoded_token).map_err(|e| {
            self.core.track(GenericEvents::error(
                COMPONENT,
                ErrorEvent::Threeds2TokenDecoding,
            ));
            CheckoutError::component_with("Failed to decode challenge token", e)
        })?;
        if !self.has_transaction() {
            return Err(CheckoutError::component(
                "Failed to make challenge, missing reference to initial transaction.",
            ));
        }
        debug!("Challenging shopper");
        self.core.emit_effect(ActionEffect::ChallengeShopper(token));
        Ok(())
    }

    async fn authorisation_token(&self) -> Result<Option<String>> {
        self.core.store.get_as(AUTHORIZATION_TOKEN_KEY).await
    }

    async fn on_fingerprint(&self, result: FingerprintResult) -> Result<()> {
        let payment_data = self.core.payment_data.payment_data().await?;
        match result {
            FingerprintResult::Success(parameters) => {
                let details = fingerprint_details(&parameters)?;
                // The transaction stays open for a follow-up challenge.
                self.core
                    .emit_details(ActionComponentData::new(details, payment_data));
            }
            FingerprintResult::InitializeFailure {
                transaction_status,
                additional_details,
            } => {
                warn!(%transaction_status, "3DS2 transaction could not be initialized");
                self.core.track(GenericEvents::error(
                    COMPONENT,
                    ErrorEvent::Threeds2FingerprintHandling,
                ));
                let token = self.authorisation_token().await?;
                let details = challenge_details(
                    &transaction_status,
                    additional_details.as_deref(),
                    token.as_deref(),
                )?;
                self.close_transaction().await?;
                self.core
                    .finish(ActionComponentData::new(details, payment_data))
                    .await;
            }
        }
        Ok(())
    }

    async fn on_challenge(&self, result: ChallengeResult) -> Result<()> {
        let (transaction_status, additional_details) = match result {
            ChallengeResult::Completed { transaction_status } => (transaction_status, None),
            ChallengeResult::Cancelled => {
                self.close_transaction().await?;
                return Err(CheckoutError::ChallengeCancelled("Challenge canceled.".into()));
            }
            ChallengeResult::Timeout {
                transaction_status,
                additional_details,
            }
            | ChallengeResult::Error {
                transaction_status,
                additional_details,
            } => {
                self.core.track(GenericEvents::error(
                    COMPONENT,
                    ErrorEvent::Threeds2ChallengeHandling,
                ));
                (transaction_status, additional_details)
            }
        };
        let payment_data = self.core.payment_data.payment_data().await?;
        let token = self.authorisation_token().await?;
        let details = challenge_details(
            &transaction_status,
            additional_details.as_deref(),
            token.as_deref(),
        )?;
        self.close_transaction().await?;
        self.core
            .finish(ActionComponentData::new(details, payment_data))
            .await;
        Ok(())
    }

    async fn close_transaction(&self) -> Result<()> {
        self.set_transaction(None);
        self.core.store.remove(AUTHORIZATION_TOKEN_KEY).await
    }
}

#[async_trait]
impl ActionDelegate for Threeds2Delegate {
    fn outputs(&self) -> &ActionOutputs {
        &self.core.outputs
    }

    fn can_handle(&self, action: &Action) -> bool {
        matches!(
            action,
            Action::Threeds2Fingerprint(_) | Action::Threeds2Challenge(_) | Action::Threeds2(_)
        )
    }

    /// The SDK transaction lives in the host and cannot be restored.
    async fn initialize(&self) {}

    async fn handle_action(&self, action: Action) {
        if let Err(e) = self.try_handle_action(action).await {
            self.core.fail(e).await;
        }
    }

    fn on_cleared(&self) {
        self.set_transaction(None);
        self.core.clear();
    }

    fn as_sdk_result_handler(&self) -> Option<&dyn SdkResultHandling> {
        Some(self)
    }
}

#[async_trait]
impl SdkResultHandling for Threeds2Delegate {
    async fn handle_sdk_result(&self, result: SdkResult) {
        let outcome = match result {
            SdkResult::Threeds2Fingerprint(result) => self.on_fingerprint(result).await,
            SdkResult::Threeds2Challenge(result) => self.on_challenge(result).await,
            SdkResult::LaunchFailed(reason) => {
                self.core.track(GenericEvents::error(
                    COMPONENT,
                    ErrorEvent::Threeds2FingerprintHandling,
                ));
                Err(CheckoutError::component(reason))
            }
            other => {
                warn!(?other, "Unexpected SDK result for 3DS2");
                Err(CheckoutError::checkout("Unexpected SDK result"))
            }
        };
        if let Err(e) = outcome {
            self.core.fail(e).await;
        }
    }
}
