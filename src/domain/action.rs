//! Server-issued additional actions.
//!
//! Actions are decoded through an [`ActionRegistry`] keyed on the `"type"`
//! discriminator. `sdk` actions carry a provider payload whose shape depends
//! on `paymentMethodType`, so the registry keeps a second table for those.

use crate::error::{CheckoutError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;

pub mod action_types {
    pub const REDIRECT: &str = "redirect";
    pub const NATIVE_REDIRECT: &str = "nativeRedirect";
    pub const AWAIT: &str = "await";
    pub const QR_CODE: &str = "qrCode";
    pub const SDK: &str = "sdk";
    pub const THREEDS2_FINGERPRINT: &str = "threeDS2Fingerprint";
    pub const THREEDS2_CHALLENGE: &str = "threeDS2Challenge";
    pub const THREEDS2: &str = "threeDS2";
}

pub mod payment_method_types {
    pub const TWINT: &str = "twint";
    pub const WECHAT_PAY_SDK: &str = "wechatpaySDK";
    pub const PIX: &str = "pix";
    pub const PAY_NOW: &str = "paynow";
    pub const UPI_QR: &str = "upi_qr";
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedirectAction {
    pub payment_method_type: Option<String>,
    pub payment_data: Option<String>,
    pub url: Option<String>,
    pub method: Option<String>,
    pub native_redirect_data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwaitAction {
    pub payment_method_type: Option<String>,
    pub payment_data: Option<String>,
    /// Some await flows open an app or page before polling starts.
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrCodeAction {
    pub payment_method_type: Option<String>,
    pub payment_data: Option<String>,
    pub qr_code_data: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TwintSdkData {
    pub token: String,
    #[serde(default)]
    pub is_stored: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeChatPaySdkData {
    pub appid: Option<String>,
    pub partnerid: Option<String>,
    pub prepayid: Option<String>,
    pub noncestr: Option<String>,
    pub timestamp: Option<String>,
    pub package_value: Option<String>,
    pub sign: Option<String>,
}

/// Provider payload of an `sdk` action.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SdkData {
    Twint(TwintSdkData),
    WeChatPay(WeChatPaySdkData),
    /// Payload of a payment method without a registered decoder.
    Other(Value),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SdkAction {
    pub payment_method_type: Option<String>,
    pub payment_data: Option<String>,
    pub sdk_data: Option<SdkData>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Threeds2FingerprintAction {
    pub payment_method_type: Option<String>,
    pub payment_data: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Threeds2ChallengeAction {
    pub payment_method_type: Option<String>,
    pub payment_data: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Threeds2Action {
    pub payment_method_type: Option<String>,
    pub payment_data: Option<String>,
    pub token: Option<String>,
    pub subtype: Option<String>,
    pub authorisation_token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Threeds2SubType {
    Fingerprint,
    Challenge,
}

impl Threeds2SubType {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "fingerprint" => Ok(Self::Fingerprint),
            "challenge" => Ok(Self::Challenge),
            other => Err(CheckoutError::component(format!(
                "Unknown 3DS2 action subtype: {other}"
            ))),
        }
    }
}

/// An additional action returned by `/payments` or `/payments/details`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Action {
    #[serde(rename = "redirect")]
    Redirect(RedirectAction),
    #[serde(rename = "nativeRedirect")]
    NativeRedirect(RedirectAction),
    #[serde(rename = "await")]
    Await(AwaitAction),
    #[serde(rename = "qrCode")]
    QrCode(QrCodeAction),
    #[serde(rename = "sdk")]
    Sdk(SdkAction),
    #[serde(rename = "threeDS2Fingerprint")]
    Threeds2Fingerprint(Threeds2FingerprintAction),
    #[serde(rename = "threeDS2Challenge")]
    Threeds2Challenge(Threeds2ChallengeAction),
    #[serde(rename = "threeDS2")]
    Threeds2(Threeds2Action),
}

impl Action {
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::Redirect(_) => action_types::REDIRECT,
            Action::NativeRedirect(_) => action_types::NATIVE_REDIRECT,
            Action::Await(_) => action_types::AWAIT,
            Action::QrCode(_) => action_types::QR_CODE,
            Action::Sdk(_) => action_types::SDK,
            Action::Threeds2Fingerprint(_) => action_types::THREEDS2_FINGERPRINT,
            Action::Threeds2Challenge(_) => action_types::THREEDS2_CHALLENGE,
            Action::Threeds2(_) => action_types::THREEDS2,
        }
    }

    pub fn payment_method_type(&self) -> Option<&str> {
        match self {
            Action::Redirect(a) | Action::NativeRedirect(a) => a.payment_method_type.as_deref(),
            Action::Await(a) => a.payment_method_type.as_deref(),
            Action::QrCode(a) => a.payment_method_type.as_deref(),
            Action::Sdk(a) => a.payment_method_type.as_deref(),
            Action::Threeds2Fingerprint(a) => a.payment_method_type.as_deref(),
            Action::Threeds2Challenge(a) => a.payment_method_type.as_deref(),
            Action::Threeds2(a) => a.payment_method_type.as_deref(),
        }
    }

    pub fn payment_data(&self) -> Option<&str> {
        match self {
            Action::Redirect(a) | Action::NativeRedirect(a) => a.payment_data.as_deref(),
            Action::Await(a) => a.payment_data.as_deref(),
            Action::QrCode(a) => a.payment_data.as_deref(),
            Action::Sdk(a) => a.payment_data.as_deref(),
            Action::Threeds2Fingerprint(a) => a.payment_data.as_deref(),
            Action::Threeds2Challenge(a) => a.payment_data.as_deref(),
            Action::Threeds2(a) => a.payment_data.as_deref(),
        }
    }

    /// Decodes an action with the default registry.
    pub fn from_json(value: Value) -> Result<Self> {
        ActionRegistry::global().decode(value)
    }

    pub fn parse(json: &str) -> Result<Self> {
        Self::from_json(serde_json::from_str(json)?)
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Action::from_json(value).map_err(serde::de::Error::custom)
    }
}

pub type ActionDecoder = fn(Value) -> Result<Action>;
pub type SdkDataDecoder = fn(Value) -> Result<SdkData>;

/// Maps the `"type"` discriminator to a decoder, and `paymentMethodType` to
/// an sdk payload decoder for `sdk` actions.
pub struct ActionRegistry {
    actions: HashMap<&'static str, ActionDecoder>,
    sdk_data: HashMap<&'static str, SdkDataDecoder>,
}

impl Default for ActionRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register(action_types::REDIRECT, |v| {
                Ok(Action::Redirect(serde_json::from_value(v)?))
            })
            .register(action_types::NATIVE_REDIRECT, |v| {
                Ok(Action::NativeRedirect(serde_json::from_value(v)?))
            })
            .register(action_types::AWAIT, |v| {
                Ok(Action::Await(serde_json::from_value(v)?))
            })
            .register(action_types::QR_CODE, |v| {
                Ok(Action::QrCode(serde_json::from_value(v)?))
            })
            .register(action_types::THREEDS2_FINGERPRINT, |v| {
                Ok(Action::Threeds2Fingerprint(serde_json::from_value(v)?))
            })
            .register(action_types::THREEDS2_CHALLENGE, |v| {
                Ok(Action::Threeds2Challenge(serde_json::from_value(v)?))
            })
            .register(action_types::THREEDS2, |v| {
                Ok(Action::Threeds2(serde_json::from_value(v)?))
            });
        registry
            .register_sdk_data(payment_method_types::TWINT, |v| {
                Ok(SdkData::Twint(serde_json::from_value(v)?))
            })
            .register_sdk_data(payment_method_types::WECHAT_PAY_SDK, |v| {
                Ok(SdkData::WeChatPay(serde_json::from_value(v)?))
            });
        registry
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSdkAction {
    payment_method_type: Option<String>,
    payment_data: Option<String>,
    sdk_data: Option<Value>,
}

impl ActionRegistry {
    pub fn empty() -> Self {
        Self {
            actions: HashMap::new(),
            sdk_data: HashMap::new(),
        }
    }

    /// Shared registry with every built-in action type.
    pub fn global() -> &'static ActionRegistry {
        static REGISTRY: OnceLock<ActionRegistry> = OnceLock::new();
        REGISTRY.get_or_init(ActionRegistry::default)
    }

    pub fn register(&mut self, action_type: &'static str, decoder: ActionDecoder) -> &mut Self {
        self.actions.insert(action_type, decoder);
        self
    }

    pub fn register_sdk_data(
        &mut self,
        payment_method_type: &'static str,
        decoder: SdkDataDecoder,
    ) -> &mut Self {
        self.sdk_data.insert(payment_method_type, decoder);
        self
    }

    pub fn decode(&self, value: Value) -> Result<Action> {
        let action_type = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| CheckoutError::component("Action type not found"))?
            .to_owned();

        if action_type == action_types::SDK {
            return self.decode_sdk(value);
        }

        let decoder = self.actions.get(action_type.as_str()).ok_or_else(|| {
            CheckoutError::component(format!("Unsupported action type: {action_type}"))
        })?;
        decoder(value)
    }

    fn decode_sdk(&self, value: Value) -> Result<Action> {
        let raw: RawSdkAction = serde_json::from_value(value)?;
        let sdk_data = match raw.sdk_data {
            None | Some(Value::Null) => None,
            Some(data) => {
                let decoder = raw
                    .payment_method_type
                    .as_deref()
                    .and_then(|pm| self.sdk_data.get(pm));
                Some(match decoder {
                    Some(decode) => decode(data)?,
                    None => SdkData::Other(data),
                })
            }
        };
        Ok(Action::Sdk(SdkAction {
            payment_method_type: raw.payment_method_type,
            payment_data: raw.payment_data,
            sdk_data,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_redirect_action() {
        let action = Action::from_json(json!({
            "type": "redirect",
            "paymentMethodType": "ideal",
            "paymentData": "pd",
            "url": "https://example.com/redirect",
            "method": "GET"
        }))
        .unwrap();

        match &action {
            Action::Redirect(redirect) => {
                assert_eq!(redirect.url.as_deref(), Some("https://example.com/redirect"));
            }
            other => panic!("unexpected action {other:?}"),
        }
        assert_eq!(action.payment_data(), Some("pd"));
        assert_eq!(action.payment_method_type(), Some("ideal"));
    }

    #[test]
    fn test_decode_sdk_payload_by_payment_method() {
        let action = Action::from_json(json!({
            "type": "sdk",
            "paymentMethodType": "twint",
            "paymentData": "pd",
            "sdkData": { "token": "abc", "isStored": true }
        }))
        .unwrap();

        let Action::Sdk(sdk) = action else {
            panic!("expected sdk action");
        };
        assert_eq!(
            sdk.sdk_data,
            Some(SdkData::Twint(TwintSdkData {
                token: "abc".into(),
                is_stored: true,
            }))
        );
    }

    #[test]
    fn test_decode_sdk_without_registered_payload() {
        let action = Action::from_json(json!({
            "type": "sdk",
            "paymentMethodType": "unknownpay",
            "sdkData": { "foo": 1 }
        }))
        .unwrap();

        let Action::Sdk(sdk) = action else {
            panic!("expected sdk action");
        };
        assert_eq!(sdk.sdk_data, Some(SdkData::Other(json!({ "foo": 1 }))));
    }

    #[test]
    fn test_unknown_or_missing_type_is_rejected() {
        assert!(Action::from_json(json!({ "type": "voucher" })).is_err());
        assert!(Action::from_json(json!({ "url": "https://example.com" })).is_err());
    }

    #[test]
    fn test_serialized_action_decodes_to_same_action() {
        let action = Action::Sdk(SdkAction {
            payment_method_type: Some("twint".into()),
            payment_data: Some("pd".into()),
            sdk_data: Some(SdkData::Twint(TwintSdkData {
                token: "t".into(),
                is_stored: false,
            })),
        });

        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["type"], "sdk");
        let decoded: Action = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, action);
    }

    #[test]
    fn test_custom_registry_decoder() {
        let mut registry = ActionRegistry::empty();
        registry.register("await", |v| Ok(Action::Await(serde_json::from_value(v)?)));

        assert!(registry.decode(json!({ "type": "await" })).is_ok());
        assert!(registry.decode(json!({ "type": "redirect" })).is_err());
    }
}
